use super::money::Amount;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Processing,
    Success,
    Failed,
    PartialRefunded,
    Refunded,
    /// Flagged by the fraud gate. Nothing promotes a transaction out of review.
    Review,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::PartialRefunded => "PARTIAL_REFUNDED",
            Self::Refunded => "REFUNDED",
            Self::Review => "REVIEW",
        }
    }

    /// Settlement reached an outcome. Refund states descend from `Success`,
    /// so they keep the completion stamp.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::PartialRefunded | Self::Refunded
        )
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self, Self::Success | Self::PartialRefunded)
    }

    pub fn can_transition(&self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, to),
            (Initiated, Processing)
                | (Initiated, Failed)
                | (Processing, Success)
                | (Processing, Failed)
                | (Success, PartialRefunded)
                | (Success, Refunded)
                | (PartialRefunded, PartialRefunded)
                | (PartialRefunded, Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: String,
    pub merchant_id: String,
    pub order_id: String,
    pub amount: Amount,
    pub currency: String,
    pub refunded_amount: Decimal,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    pub redirect_url: String,
    pub failure_reason: Option<String>,
    pub fraud_checked: bool,
    pub fraudulent: bool,
    pub fraud_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    #[serde(skip)]
    pub version: u64,
}

impl Transaction {
    /// What is still refundable: `amount - refunded_amount`.
    pub fn refundable_amount(&self) -> Decimal {
        self.amount.value() - self.refunded_amount
    }

    pub fn transition(
        &mut self,
        to: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if !self.status.can_transition(to) {
            return Err(PaymentError::InvalidState(format!(
                "Transaction {} cannot move from {} to {}",
                self.transaction_id, self.status, to
            )));
        }
        if !self.status.is_settled() && to.is_settled() {
            self.completed_at = Some(now);
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition(PaymentStatus::Failed, now)?;
        self.failure_reason = Some(reason.to_string());
        Ok(())
    }

    /// Adds a successful refund to the running total and derives the new status.
    pub fn apply_refund(
        &mut self,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, PaymentError> {
        if !self.status.is_refundable() {
            return Err(PaymentError::InvalidState(format!(
                "Cannot refund transaction with status: {}",
                self.status
            )));
        }
        let available = self.refundable_amount();
        if amount.value() > available {
            return Err(PaymentError::InvalidArgument(format!(
                "Refund amount exceeds available amount. Available: {available}"
            )));
        }

        let refunded = self
            .refunded_amount
            .checked_add(amount.value())
            .ok_or_else(|| PaymentError::internal("Refunded amount overflow"))?;
        let next = if refunded >= self.amount.value() {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefunded
        };
        self.transition(next, now)?;
        self.refunded_amount = refunded;
        Ok(next)
    }
}
