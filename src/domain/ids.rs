use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TRANSACTION_PREFIX: &str = "TXN";
pub const REFUND_PREFIX: &str = "RFD";
pub const WEBHOOK_PREFIX: &str = "WHK";

/// `<prefix>_<epoch-millis>_<8 hex>`.
pub fn generate(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", now.timestamp_millis(), &suffix[..8])
}

pub fn transaction_id(now: DateTime<Utc>) -> String {
    generate(TRANSACTION_PREFIX, now)
}

pub fn refund_id(now: DateTime<Utc>) -> String {
    generate(REFUND_PREFIX, now)
}

pub fn webhook_id(now: DateTime<Utc>) -> String {
    generate(WEBHOOK_PREFIX, now)
}
