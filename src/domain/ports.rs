use super::event::PaymentEvent;
use super::ledger::{LedgerEntry, Posting, RecordWrites};
use super::merchant::Merchant;
use super::refund::Refund;
use super::transaction::Transaction;
use super::webhook::{DeliveryOutcome, WebhookDelivery};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Read access to merchant records. Balances are only ever written through
/// [`LedgerStore::post`].
#[async_trait]
pub trait MerchantDirectory: Send + Sync {
    async fn get_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>>;
    async fn list_merchants(&self) -> Result<Vec<Merchant>>;
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted {
    Created(Transaction),
    /// A transaction with the same idempotency key was already stored.
    Existing(Transaction),
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Stores a new transaction unless its idempotency key is already taken.
    /// The check and the write are one atomic step.
    async fn insert(&self, tx: Transaction) -> Result<Inserted>;
    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>>;
    async fn list_by_merchant(&self, merchant_id: &str) -> Result<Vec<Transaction>>;
    /// Compare-and-set on `version`. Returns the stored copy with the bumped
    /// version, or `Conflict` if another writer got there first.
    async fn update(&self, tx: Transaction) -> Result<Transaction>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn insert(&self, refund: Refund) -> Result<Refund>;
    async fn get(&self, refund_id: &str) -> Result<Option<Refund>>;
    async fn list_by_transaction(&self, transaction_id: &str) -> Result<Vec<Refund>>;
    /// Compare-and-set on `version`.
    async fn update(&self, refund: Refund) -> Result<Refund>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Applies `writes`, moves the merchant balance and appends the entry as
    /// one unit. Nothing is changed if any part fails.
    async fn post(
        &self,
        posting: Posting,
        writes: RecordWrites,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry>;
    async fn entries_for_reference(&self, reference_id: &str) -> Result<Vec<LedgerEntry>>;
    /// The payment's credit and the debits of its refunds, in append order.
    async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>>;
    /// In append order.
    async fn entries_for_merchant(&self, merchant_id: &str) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery>;
    async fn get(&self, delivery_id: &str) -> Result<Option<WebhookDelivery>>;
    /// Compare-and-set on `version`.
    async fn update(&self, delivery: WebhookDelivery) -> Result<WebhookDelivery>;
    /// Records eligible for a retry at `now`, per [`WebhookDelivery::is_due`].
    async fn due(
        &self,
        now: DateTime<Utc>,
        pending_grace: Duration,
    ) -> Result<Vec<WebhookDelivery>>;
    async fn list_by_transaction(&self, transaction_id: &str) -> Result<Vec<WebhookDelivery>>;
}

/// Fire-and-forget sideband. Callers log and drop any error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PaymentEvent) -> Result<()>;
}

/// Sends a JSON body to a merchant callback. Never fails: every outcome,
/// including timeouts, is reported as a [`DeliveryOutcome`].
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, body: &str) -> DeliveryOutcome;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type MerchantDirectoryRef = Arc<dyn MerchantDirectory>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type RefundStoreRef = Arc<dyn RefundStore>;
pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type WebhookStoreRef = Arc<dyn WebhookStore>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
pub type WebhookTransportRef = Arc<dyn WebhookTransport>;
pub type ClockRef = Arc<dyn Clock>;
