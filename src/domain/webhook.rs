use super::transaction::{PaymentStatus, Transaction};
use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stored response bodies and error messages are cut to this many characters.
pub const MAX_DETAIL_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Body POSTed to the merchant's callback URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub transaction_id: String,
    pub merchant_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn for_transaction(tx: &Transaction, now: DateTime<Utc>) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            merchant_id: tx.merchant_id.clone(),
            order_id: tx.order_id.clone(),
            amount: tx.amount.value(),
            currency: tx.currency.clone(),
            status: tx.status,
            timestamp: now,
        }
    }
}

/// What the transport observed for one POST.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// 2xx response.
    Delivered { status_code: u16, body: String },
    /// Any other HTTP status.
    Rejected { status_code: u16, body: String },
    /// Connection failure, timeout, invalid URL.
    Transport(String),
}

/// One notification attempt-series and its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    pub delivery_id: String,
    pub transaction_id: String,
    pub merchant_id: String,
    pub callback_url: String,
    pub payload: String,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Only set while `Retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: u64,
}

impl WebhookDelivery {
    pub fn new(
        delivery_id: String,
        payload: &WebhookPayload,
        callback_url: &str,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            delivery_id,
            transaction_id: payload.transaction_id.clone(),
            merchant_id: payload.merchant_id.clone(),
            callback_url: callback_url.to_string(),
            payload: serde_json::to_string(payload)?,
            status: DeliveryStatus::Pending,
            retry_count: 0,
            max_retries,
            response_code: None,
            response_body: None,
            error_message: None,
            last_attempt_at: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// The single eligibility rule used by the sweep.
    ///
    /// A `Pending` record with no retry time is picked up once `pending_grace`
    /// has passed since creation, which recovers records whose first attempt
    /// never ran.
    pub fn is_due(&self, now: DateTime<Utc>, pending_grace: Duration) -> bool {
        if self.status.is_terminal() || self.retry_count >= self.max_retries {
            return false;
        }
        match (self.status, self.next_retry_at) {
            (_, Some(at)) => at <= now,
            (DeliveryStatus::Pending, None) => shift(self.created_at, pending_grace) <= now,
            _ => false,
        }
    }

    /// Folds one attempt's outcome into the record.
    pub fn record_attempt(
        &mut self,
        outcome: DeliveryOutcome,
        now: DateTime<Utc>,
        base_delay: Duration,
    ) {
        self.last_attempt_at = Some(now);
        self.updated_at = now;
        match outcome {
            DeliveryOutcome::Delivered { status_code, body } => {
                self.status = DeliveryStatus::Success;
                self.response_code = Some(status_code);
                self.response_body = Some(truncate(&body));
                self.error_message = None;
                self.next_retry_at = None;
            }
            DeliveryOutcome::Rejected { status_code, body } => {
                self.response_code = Some(status_code);
                self.response_body = Some(truncate(&body));
                self.record_failure(format!("HTTP {status_code}"), now, base_delay);
            }
            DeliveryOutcome::Transport(error) => {
                self.response_code = None;
                self.response_body = None;
                self.record_failure(error, now, base_delay);
            }
        }
    }

    fn record_failure(&mut self, error: String, now: DateTime<Utc>, base_delay: Duration) {
        self.retry_count += 1;
        self.error_message = Some(truncate(&error));
        if self.retry_count >= self.max_retries {
            self.status = DeliveryStatus::Failed;
            self.next_retry_at = None;
        } else {
            self.status = DeliveryStatus::Retrying;
            self.next_retry_at = Some(shift(now, backoff_delay(base_delay, self.retry_count)));
        }
    }
}

/// `base * 2^(retry_count - 1)`; a zero retry count is treated as the first.
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

fn shift(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn truncate(text: &str) -> String {
    text.chars().take(MAX_DETAIL_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::tests::sample;
    use rust_decimal_macros::dec;

    const BASE: Duration = Duration::from_secs(5);
    const GRACE: Duration = Duration::from_secs(30);

    fn delivery(now: DateTime<Utc>) -> WebhookDelivery {
        let tx = sample(dec!(500), PaymentStatus::Success);
        let payload = WebhookPayload::for_transaction(&tx, now);
        WebhookDelivery::new("WHK_1".to_string(), &payload, "http://merchant/cb", 5, now).unwrap()
    }

    fn rejected() -> DeliveryOutcome {
        DeliveryOutcome::Rejected {
            status_code: 503,
            body: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let delays: Vec<u64> = (1..=5).map(|n| backoff_delay(BASE, n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80]);
        assert_eq!(backoff_delay(BASE, 0), BASE);
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let now = Utc::now();
        let d = delivery(now);
        let json: serde_json::Value = serde_json::from_str(&d.payload).unwrap();
        assert_eq!(json["transactionId"], "TXN_1_abcdef01");
        assert_eq!(json["merchantId"], "MER_1");
        assert_eq!(json["orderId"], "ORD_1");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["currency"], "INR");
    }

    #[test]
    fn test_success_is_terminal() {
        let now = Utc::now();
        let mut d = delivery(now);
        d.record_attempt(
            DeliveryOutcome::Delivered {
                status_code: 200,
                body: "ok".to_string(),
            },
            now,
            BASE,
        );
        assert_eq!(d.status, DeliveryStatus::Success);
        assert_eq!(d.response_code, Some(200));
        assert_eq!(d.retry_count, 0);
        assert!(!d.is_due(now + TimeDelta::days(1), GRACE));
    }

    #[test]
    fn test_failures_schedule_backoff_then_fail() {
        let start = Utc::now();
        let mut d = delivery(start);
        let mut now = start;

        for attempt in 1..=4u32 {
            d.record_attempt(rejected(), now, BASE);
            assert_eq!(d.status, DeliveryStatus::Retrying);
            assert_eq!(d.retry_count, attempt);
            let next = d.next_retry_at.unwrap();
            assert_eq!(next - now, TimeDelta::seconds(5 * 2i64.pow(attempt - 1)));
            assert!(!d.is_due(next - TimeDelta::milliseconds(1), GRACE));
            assert!(d.is_due(next, GRACE));
            now = next;
        }

        d.record_attempt(DeliveryOutcome::Transport("connection refused".to_string()), now, BASE);
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert_eq!(d.retry_count, 5);
        assert!(d.next_retry_at.is_none());
        assert_eq!(d.error_message.as_deref(), Some("connection refused"));
        assert!(!d.is_due(now + TimeDelta::days(1), GRACE));
    }

    #[test]
    fn test_pending_record_due_after_grace() {
        let now = Utc::now();
        let d = delivery(now);
        assert!(!d.is_due(now, GRACE));
        assert!(d.is_due(now + TimeDelta::seconds(30), GRACE));
    }

    #[test]
    fn test_detail_truncated() {
        let now = Utc::now();
        let mut d = delivery(now);
        d.record_attempt(
            DeliveryOutcome::Rejected {
                status_code: 500,
                body: "x".repeat(5000),
            },
            now,
            BASE,
        );
        assert_eq!(d.response_body.as_ref().unwrap().len(), MAX_DETAIL_LEN);
        assert_eq!(d.error_message.as_deref(), Some("HTTP 500"));
    }
}
