use crate::domain::ledger::{LedgerEntry, Posting, RecordWrites};
use crate::domain::merchant::Merchant;
use crate::domain::ports::{
    Inserted, LedgerStore, MerchantDirectory, RefundStore, TransactionStore, WebhookStore,
};
use crate::domain::refund::Refund;
use crate::domain::transaction::Transaction;
use crate::domain::webhook::WebhookDelivery;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    merchants: HashMap<String, Merchant>,
    transactions: HashMap<String, Transaction>,
    /// idempotency key -> transaction ID
    idempotency: HashMap<String, String>,
    refunds: HashMap<String, Refund>,
    ledger: Vec<LedgerEntry>,
    webhooks: HashMap<String, WebhookDelivery>,
}

/// A thread-safe in-memory store implementing every storage port.
///
/// All tables sit behind one `Arc<RwLock<..>>`, so a ledger posting and its
/// companion record writes happen under a single write guard. Versioned
/// records are updated by compare-and-set.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the merchant registry. Merchant management lives elsewhere.
    pub async fn register_merchant(&self, merchant: Merchant) {
        let mut tables = self.tables.write().await;
        tables.merchants.insert(merchant.merchant_id.clone(), merchant);
    }
}

fn conflict(kind: &str, id: &str) -> PaymentError {
    PaymentError::Conflict(format!("{kind} {id} was modified concurrently"))
}

fn check_version(kind: &str, id: &str, stored: Option<u64>, expected: u64) -> Result<()> {
    match stored {
        None => Err(PaymentError::NotFound(format!("{kind} not found: {id}"))),
        Some(v) if v != expected => Err(conflict(kind, id)),
        Some(_) => Ok(()),
    }
}

fn sorted_by_creation<T: Clone>(
    items: impl Iterator<Item = T>,
    key: impl Fn(&T) -> (DateTime<Utc>, String),
) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl MerchantDirectory for InMemoryStore {
    async fn get_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        let tables = self.tables.read().await;
        Ok(tables.merchants.get(merchant_id).cloned())
    }

    async fn list_merchants(&self) -> Result<Vec<Merchant>> {
        let tables = self.tables.read().await;
        let mut merchants: Vec<Merchant> = tables.merchants.values().cloned().collect();
        merchants.sort_by(|a, b| a.merchant_id.cmp(&b.merchant_id));
        Ok(merchants)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert(&self, mut tx: Transaction) -> Result<Inserted> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        if let Some(key) = tx.idempotency_key.clone() {
            match tables.idempotency.entry(key) {
                Entry::Occupied(existing) => {
                    let stored = tables.transactions.get(existing.get()).cloned().ok_or_else(|| {
                        PaymentError::Storage(format!(
                            "idempotency key points at missing transaction {}",
                            existing.get()
                        ))
                    })?;
                    return Ok(Inserted::Existing(stored));
                }
                Entry::Vacant(slot) => {
                    slot.insert(tx.transaction_id.clone());
                }
            }
        }

        tx.version = 0;
        tables.transactions.insert(tx.transaction_id.clone(), tx.clone());
        Ok(Inserted::Created(tx))
    }

    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(transaction_id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .idempotency
            .get(key)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }

    async fn list_by_merchant(&self, merchant_id: &str) -> Result<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables
                .transactions
                .values()
                .filter(|tx| tx.merchant_id == merchant_id)
                .cloned(),
            |tx| (tx.created_at, tx.transaction_id.clone()),
        ))
    }

    async fn update(&self, mut tx: Transaction) -> Result<Transaction> {
        let mut tables = self.tables.write().await;
        let stored = tables.transactions.get(&tx.transaction_id).map(|t| t.version);
        check_version("Transaction", &tx.transaction_id, stored, tx.version)?;
        tx.version += 1;
        tables.transactions.insert(tx.transaction_id.clone(), tx.clone());
        Ok(tx)
    }
}

#[async_trait]
impl RefundStore for InMemoryStore {
    async fn insert(&self, mut refund: Refund) -> Result<Refund> {
        let mut tables = self.tables.write().await;
        if tables.refunds.contains_key(&refund.refund_id) {
            return Err(PaymentError::Storage(format!(
                "duplicate refund ID {}",
                refund.refund_id
            )));
        }
        refund.version = 0;
        tables.refunds.insert(refund.refund_id.clone(), refund.clone());
        Ok(refund)
    }

    async fn get(&self, refund_id: &str) -> Result<Option<Refund>> {
        let tables = self.tables.read().await;
        Ok(tables.refunds.get(refund_id).cloned())
    }

    async fn list_by_transaction(&self, transaction_id: &str) -> Result<Vec<Refund>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables
                .refunds
                .values()
                .filter(|r| r.transaction_id == transaction_id)
                .cloned(),
            |r| (r.created_at, r.refund_id.clone()),
        ))
    }

    async fn update(&self, mut refund: Refund) -> Result<Refund> {
        let mut tables = self.tables.write().await;
        let stored = tables.refunds.get(&refund.refund_id).map(|r| r.version);
        check_version("Refund", &refund.refund_id, stored, refund.version)?;
        refund.version += 1;
        tables.refunds.insert(refund.refund_id.clone(), refund.clone());
        Ok(refund)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn post(
        &self,
        posting: Posting,
        writes: RecordWrites,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        // Validate everything before touching anything.
        if let Some(tx) = &writes.transaction {
            let stored = tables.transactions.get(&tx.transaction_id).map(|t| t.version);
            check_version("Transaction", &tx.transaction_id, stored, tx.version)?;
        }
        if let Some(refund) = &writes.refund {
            let stored = tables.refunds.get(&refund.refund_id).map(|r| r.version);
            check_version("Refund", &refund.refund_id, stored, refund.version)?;
        }
        let merchant = tables.merchants.get_mut(&posting.merchant_id).ok_or_else(|| {
            PaymentError::NotFound(format!("Merchant not found: {}", posting.merchant_id))
        })?;

        let balance_after = merchant.balance.checked_add(posting.signed_amount())?;
        merchant.balance = balance_after;
        merchant.updated_at = now;

        if let Some(mut tx) = writes.transaction {
            tx.version += 1;
            tables.transactions.insert(tx.transaction_id.clone(), tx);
        }
        if let Some(mut refund) = writes.refund {
            refund.version += 1;
            tables.refunds.insert(refund.refund_id.clone(), refund);
        }

        let entry = LedgerEntry {
            entry_id: Uuid::new_v4().to_string(),
            sequence: tables.ledger.len() as u64 + 1,
            reference_id: posting.reference_id,
            transaction_id: posting.transaction_id,
            merchant_id: posting.merchant_id,
            entry_type: posting.entry_type,
            amount: posting.amount,
            currency: posting.currency,
            description: posting.description,
            balance_after,
            created_at: now,
        };
        tables.ledger.push(entry.clone());
        Ok(entry)
    }

    async fn entries_for_reference(&self, reference_id: &str) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.reference_id == reference_id)
            .cloned()
            .collect())
    }

    async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn entries_for_merchant(&self, merchant_id: &str) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.merchant_id == merchant_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WebhookStore for InMemoryStore {
    async fn insert(&self, mut delivery: WebhookDelivery) -> Result<WebhookDelivery> {
        let mut tables = self.tables.write().await;
        if tables.webhooks.contains_key(&delivery.delivery_id) {
            return Err(PaymentError::Storage(format!(
                "duplicate webhook ID {}",
                delivery.delivery_id
            )));
        }
        delivery.version = 0;
        tables
            .webhooks
            .insert(delivery.delivery_id.clone(), delivery.clone());
        Ok(delivery)
    }

    async fn get(&self, delivery_id: &str) -> Result<Option<WebhookDelivery>> {
        let tables = self.tables.read().await;
        Ok(tables.webhooks.get(delivery_id).cloned())
    }

    async fn update(&self, mut delivery: WebhookDelivery) -> Result<WebhookDelivery> {
        let mut tables = self.tables.write().await;
        let stored = tables.webhooks.get(&delivery.delivery_id).map(|d| d.version);
        check_version("Webhook delivery", &delivery.delivery_id, stored, delivery.version)?;
        delivery.version += 1;
        tables
            .webhooks
            .insert(delivery.delivery_id.clone(), delivery.clone());
        Ok(delivery)
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        pending_grace: Duration,
    ) -> Result<Vec<WebhookDelivery>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables
                .webhooks
                .values()
                .filter(|d| d.is_due(now, pending_grace))
                .cloned(),
            |d| (d.created_at, d.delivery_id.clone()),
        ))
    }

    async fn list_by_transaction(&self, transaction_id: &str) -> Result<Vec<WebhookDelivery>> {
        let tables = self.tables.read().await;
        Ok(sorted_by_creation(
            tables
                .webhooks
                .values()
                .filter(|d| d.transaction_id == transaction_id)
                .cloned(),
            |d| (d.created_at, d.delivery_id.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::EntryType;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::refund::{Refund, RefundStatus};
    use crate::domain::transaction::PaymentStatus;
    use crate::domain::transaction::tests::sample;
    use rust_decimal_macros::dec;

    async fn store_with_merchant() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .register_merchant(Merchant::new("MER_1", "Acme", "s3cret", "http://acme/cb"))
            .await;
        store
    }

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_by_key() {
        let store = InMemoryStore::new();
        let mut first = sample(dec!(100), PaymentStatus::Initiated);
        first.idempotency_key = Some("key-1".to_string());
        let mut second = first.clone();
        second.transaction_id = "TXN_2".to_string();
        second.amount = amount(dec!(999));

        assert!(matches!(
            TransactionStore::insert(&store, first.clone()).await.unwrap(),
            Inserted::Created(_)
        ));
        match TransactionStore::insert(&store, second).await.unwrap() {
            Inserted::Existing(tx) => assert_eq!(tx.transaction_id, first.transaction_id),
            other => panic!("expected existing, got {other:?}"),
        }
        assert!(TransactionStore::get(&store, "TXN_2").await.unwrap().is_none());
        let found = store.find_by_idempotency_key("key-1").await.unwrap().unwrap();
        assert_eq!(found.amount, amount(dec!(100)));
    }

    #[tokio::test]
    async fn test_update_rejects_stale_version() {
        let store = InMemoryStore::new();
        let tx = sample(dec!(100), PaymentStatus::Initiated);
        TransactionStore::insert(&store, tx.clone()).await.unwrap();

        let mut a = tx.clone();
        a.status = PaymentStatus::Processing;
        let stored = TransactionStore::update(&store, a).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut b = tx;
        b.status = PaymentStatus::Failed;
        assert!(matches!(
            TransactionStore::update(&store, b).await,
            Err(PaymentError::Conflict(_))
        ));
        let current = TransactionStore::get(&store, &stored.transaction_id).await.unwrap().unwrap();
        assert_eq!(current.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_post_moves_balance_and_appends() {
        let store = store_with_merchant().await;
        let now = Utc::now();
        let credit = store
            .post(
                Posting::credit("MER_1", amount(dec!(1000)), "INR", "TXN_1"),
                RecordWrites::none(),
                now,
            )
            .await
            .unwrap();
        assert_eq!(credit.balance_after, Balance::new(dec!(1000)));
        assert_eq!(credit.entry_type, EntryType::Credit);

        let debit = store
            .post(
                Posting::debit("MER_1", amount(dec!(400)), "INR", "RFD_1", "TXN_1"),
                RecordWrites::none(),
                now,
            )
            .await
            .unwrap();
        assert_eq!(debit.balance_after, Balance::new(dec!(600)));
        assert!(debit.sequence > credit.sequence);

        let merchant = store.get_merchant("MER_1").await.unwrap().unwrap();
        assert_eq!(merchant.balance, Balance::new(dec!(600)));
        assert_eq!(store.entries_for_merchant("MER_1").await.unwrap().len(), 2);
        assert_eq!(store.entries_for_reference("RFD_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_is_all_or_nothing() {
        let store = store_with_merchant().await;
        let now = Utc::now();
        let tx = sample(dec!(1000), PaymentStatus::Success);
        TransactionStore::insert(&store, tx.clone()).await.unwrap();
        let refund = Refund::new("RFD_1".to_string(), &tx, amount(dec!(400)), None, now);
        let refund = RefundStore::insert(&store, refund).await.unwrap();

        // Stale transaction version: nothing may change.
        let mut stale = tx.clone();
        stale.version = 7;
        let mut done = refund.clone();
        done.status = RefundStatus::Success;
        let result = store
            .post(
                Posting::debit("MER_1", amount(dec!(400)), "INR", "RFD_1", &tx.transaction_id),
                RecordWrites::refund_and_transaction(done, stale),
                now,
            )
            .await;
        assert!(matches!(result, Err(PaymentError::Conflict(_))));

        let merchant = store.get_merchant("MER_1").await.unwrap().unwrap();
        assert_eq!(merchant.balance, Balance::ZERO);
        assert!(store.entries_for_merchant("MER_1").await.unwrap().is_empty());
        let refund = RefundStore::get(&store, "RFD_1").await.unwrap().unwrap();
        assert_eq!(refund.status, RefundStatus::Processing);
    }

    #[tokio::test]
    async fn test_post_unknown_merchant() {
        let store = InMemoryStore::new();
        let result = store
            .post(
                Posting::credit("NOPE", amount(dec!(1)), "INR", "TXN_1"),
                RecordWrites::none(),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(PaymentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_post_overflow_changes_nothing() {
        let store = store_with_merchant().await;
        let now = Utc::now();
        let max = amount(rust_decimal::Decimal::MAX);
        store
            .post(Posting::credit("MER_1", max, "INR", "TXN_1"), RecordWrites::none(), now)
            .await
            .unwrap();

        let tx = sample(dec!(1), PaymentStatus::Processing);
        TransactionStore::insert(&store, tx.clone()).await.unwrap();
        let mut settled = tx.clone();
        settled.status = PaymentStatus::Success;
        let result = store
            .post(
                Posting::credit("MER_1", amount(dec!(1)), "INR", &tx.transaction_id),
                RecordWrites::transaction(settled),
                now,
            )
            .await;
        assert!(matches!(result, Err(PaymentError::Internal(_))));

        let merchant = store.get_merchant("MER_1").await.unwrap().unwrap();
        assert_eq!(merchant.balance, Balance::from(max));
        assert_eq!(store.entries_for_merchant("MER_1").await.unwrap().len(), 1);
        let stored = TransactionStore::get(&store, &tx.transaction_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Processing);
        assert_eq!(stored.version, tx.version);
    }

    #[tokio::test]
    async fn test_concurrent_posts_keep_running_sum() {
        let store = store_with_merchant().await;
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let posting = if i % 5 == 0 {
                    Posting::debit("MER_1", amount(dec!(3)), "INR", &format!("RFD_{i}"), "TXN")
                } else {
                    Posting::credit("MER_1", amount(dec!(10)), "INR", &format!("TXN_{i}"))
                };
                store.post(posting, RecordWrites::none(), Utc::now()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = store.entries_for_merchant("MER_1").await.unwrap();
        let merchant = store.get_merchant("MER_1").await.unwrap().unwrap();
        assert_eq!(entries.len(), 50);
        assert_eq!(merchant.balance, Balance::new(dec!(370)));
        assert!(crate::domain::ledger::audit(&entries, merchant.balance).is_empty());
    }
}
