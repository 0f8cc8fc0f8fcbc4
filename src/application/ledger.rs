use crate::domain::ledger::{Discrepancy, EntryType, LedgerEntry, Posting, RecordWrites, audit};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{ClockRef, LedgerStoreRef, MerchantDirectoryRef};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use tracing::info;

/// Per-merchant totals derived from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantStatement {
    pub merchant_id: String,
    pub balance: Balance,
    pub credits: Decimal,
    pub debits: Decimal,
    pub entries: usize,
}

/// The only component allowed to move a merchant balance.
///
/// Each credit or debit goes through
/// [`LedgerStore::post`](crate::domain::ports::LedgerStore::post), which updates
/// the balance and appends the entry under one critical section, together with
/// whatever record writes the caller attaches.
#[derive(Clone)]
pub struct Ledger {
    store: LedgerStoreRef,
    merchants: MerchantDirectoryRef,
    clock: ClockRef,
}

impl Ledger {
    pub fn new(store: LedgerStoreRef, merchants: MerchantDirectoryRef, clock: ClockRef) -> Self {
        Self {
            store,
            merchants,
            clock,
        }
    }

    /// Credits a settled payment. The entry references the transaction.
    pub async fn record_credit(
        &self,
        merchant_id: &str,
        amount: Amount,
        currency: &str,
        transaction_id: &str,
        writes: RecordWrites,
    ) -> Result<LedgerEntry> {
        let posting = Posting::credit(merchant_id, amount, currency, transaction_id);
        let entry = self.store.post(posting, writes, self.clock.now()).await?;
        info!(
            merchant_id,
            transaction_id,
            amount = %amount,
            balance_after = %entry.balance_after,
            "recorded credit"
        );
        Ok(entry)
    }

    /// Debits a successful refund. The entry references the refund.
    pub async fn record_debit(
        &self,
        merchant_id: &str,
        amount: Amount,
        currency: &str,
        refund_id: &str,
        transaction_id: &str,
        writes: RecordWrites,
    ) -> Result<LedgerEntry> {
        let posting = Posting::debit(merchant_id, amount, currency, refund_id, transaction_id);
        let entry = self.store.post(posting, writes, self.clock.now()).await?;
        info!(
            merchant_id,
            refund_id,
            transaction_id,
            amount = %amount,
            balance_after = %entry.balance_after,
            "recorded debit"
        );
        Ok(entry)
    }

    /// Entries referencing a transaction ID (its credit) or a refund ID (its
    /// debit).
    pub async fn entries_for_reference(&self, reference_id: &str) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_reference(reference_id).await
    }

    pub async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_transaction(transaction_id).await
    }

    pub async fn entries_for_merchant(&self, merchant_id: &str) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_merchant(merchant_id).await
    }

    /// Replays the merchant's entries against its stored balance. An empty
    /// result means the ledger is consistent.
    pub async fn verify_merchant(&self, merchant_id: &str) -> Result<Vec<Discrepancy>> {
        let merchant = self
            .merchants
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Merchant not found: {merchant_id}")))?;
        let entries = self.store.entries_for_merchant(merchant_id).await?;
        Ok(audit(&entries, merchant.balance))
    }

    pub async fn statement(&self, merchant_id: &str) -> Result<MerchantStatement> {
        let merchant = self
            .merchants
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Merchant not found: {merchant_id}")))?;
        let entries = self.store.entries_for_merchant(merchant_id).await?;

        let mut credits = Decimal::ZERO;
        let mut debits = Decimal::ZERO;
        for e in &entries {
            let total = match e.entry_type {
                EntryType::Credit => &mut credits,
                EntryType::Debit => &mut debits,
            };
            *total = total.checked_add(e.amount.value()).ok_or_else(|| {
                PaymentError::internal(format!("Statement total overflow for {merchant_id}"))
            })?;
        }
        Ok(MerchantStatement {
            merchant_id: merchant.merchant_id,
            balance: merchant.balance,
            credits,
            debits,
            entries: entries.len(),
        })
    }
}
