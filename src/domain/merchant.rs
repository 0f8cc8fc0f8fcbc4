use super::money::Balance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A merchant as seen by the engine.
///
/// Merchant onboarding lives outside this crate; the engine only reads
/// merchants. `balance` is owned by the ledger and changes exclusively through
/// [`LedgerStore::post`](super::ports::LedgerStore::post).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Merchant {
    pub merchant_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub callback_url: String,
    pub balance: Balance,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(
        merchant_id: impl Into<String>,
        name: impl Into<String>,
        secret_key: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            merchant_id: merchant_id.into(),
            name: name.into(),
            secret_key: secret_key.into(),
            callback_url: callback_url.into(),
            balance: Balance::ZERO,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
