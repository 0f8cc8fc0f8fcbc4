use super::money::Amount;
use super::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Processing,
    Success,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub refund_id: String,
    pub transaction_id: String,
    pub merchant_id: String,
    pub amount: Amount,
    pub currency: String,
    /// The merchant's reason while processing; replaced by the decline
    /// reason when the refund fails.
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: u64,
}

impl Refund {
    pub fn new(
        refund_id: String,
        tx: &Transaction,
        amount: Amount,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            refund_id,
            transaction_id: tx.transaction_id.clone(),
            merchant_id: tx.merchant_id.clone(),
            amount,
            currency: tx.currency.clone(),
            reason,
            status: RefundStatus::Processing,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.status = RefundStatus::Success;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) {
        self.status = RefundStatus::Failed;
        self.reason = Some(reason.to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

/// Caller-facing view of a refund.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundView {
    pub refund_id: String,
    pub transaction_id: String,
    pub amount: Amount,
    pub status: RefundStatus,
    pub message: String,
}

impl RefundView {
    pub fn initiated(refund: &Refund) -> Self {
        Self {
            refund_id: refund.refund_id.clone(),
            transaction_id: refund.transaction_id.clone(),
            amount: refund.amount,
            status: refund.status,
            message: "Refund initiated successfully".to_string(),
        }
    }
}

impl From<&Refund> for RefundView {
    fn from(refund: &Refund) -> Self {
        Self {
            refund_id: refund.refund_id.clone(),
            transaction_id: refund.transaction_id.clone(),
            amount: refund.amount,
            status: refund.status,
            message: refund
                .reason
                .clone()
                .unwrap_or_else(|| "Refund processed".to_string()),
        }
    }
}
