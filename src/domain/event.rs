use super::transaction::{PaymentStatus, Transaction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "payment.initiated")]
    Initiated,
    #[serde(rename = "payment.succeeded")]
    Succeeded,
    #[serde(rename = "payment.failed")]
    Failed,
    #[serde(rename = "payment.refunded")]
    Refunded,
}

/// Best-effort sideband notification about a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub event_type: EventType,
    pub transaction_id: String,
    pub merchant_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn new(event_type: EventType, tx: &Transaction, now: DateTime<Utc>) -> Self {
        Self {
            event_type,
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
