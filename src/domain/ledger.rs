use super::money::{Amount, Balance};
use super::refund::Refund;
use super::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Credit,
    Debit,
}

/// Immutable audit record of one balance movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub entry_id: String,
    /// Append order across the whole ledger, assigned by the store.
    pub sequence: u64,
    /// Transaction ID for credits, refund ID for debits.
    pub reference_id: String,
    /// The payment the movement belongs to, for credits and debits alike.
    pub transaction_id: String,
    pub merchant_id: String,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub currency: String,
    pub description: String,
    pub balance_after: Balance,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> Balance {
        signed(self.entry_type, self.amount)
    }
}

/// A ledger entry that has not been applied yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub merchant_id: String,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub currency: String,
    pub reference_id: String,
    pub transaction_id: String,
    pub description: String,
}

impl Posting {
    pub fn credit(
        merchant_id: &str,
        amount: Amount,
        currency: &str,
        transaction_id: &str,
    ) -> Self {
        Self {
            merchant_id: merchant_id.to_string(),
            entry_type: EntryType::Credit,
            amount,
            currency: currency.to_string(),
            reference_id: transaction_id.to_string(),
            transaction_id: transaction_id.to_string(),
            description: "Payment received".to_string(),
        }
    }

    pub fn debit(
        merchant_id: &str,
        amount: Amount,
        currency: &str,
        refund_id: &str,
        transaction_id: &str,
    ) -> Self {
        Self {
            merchant_id: merchant_id.to_string(),
            entry_type: EntryType::Debit,
            amount,
            currency: currency.to_string(),
            reference_id: refund_id.to_string(),
            transaction_id: transaction_id.to_string(),
            description: format!("Refund for transaction: {transaction_id}"),
        }
    }

    pub fn signed_amount(&self) -> Balance {
        signed(self.entry_type, self.amount)
    }
}

fn signed(entry_type: EntryType, amount: Amount) -> Balance {
    match entry_type {
        EntryType::Credit => Balance::from(amount),
        EntryType::Debit => Balance::negated(amount),
    }
}

/// Entity updates that must commit together with a posting, or not at all.
///
/// Each record is written with a version check against the stored copy.
#[derive(Debug, Clone, Default)]
pub struct RecordWrites {
    pub transaction: Option<Transaction>,
    pub refund: Option<Refund>,
}

impl RecordWrites {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn transaction(transaction: Transaction) -> Self {
        Self {
            transaction: Some(transaction),
            refund: None,
        }
    }

    pub fn refund_and_transaction(refund: Refund, transaction: Transaction) -> Self {
        Self {
            transaction: Some(transaction),
            refund: Some(refund),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    /// An entry's `balance_after` disagrees with the running sum through it.
    Entry {
        entry_id: String,
        expected: Balance,
        recorded: Balance,
    },
    /// The merchant's stored balance disagrees with the sum of all entries.
    Balance { expected: Balance, stored: Balance },
    /// The running sum left the representable range at this entry; the
    /// replay stops there.
    Overflow { entry_id: String },
}

/// Replays `entries` (in append order) and checks each snapshot and the final
/// stored balance.
pub fn audit(entries: &[LedgerEntry], stored: Balance) -> Vec<Discrepancy> {
    let mut running = Balance::ZERO;
    let mut found = Vec::new();
    for entry in entries {
        let Ok(next) = running.checked_add(entry.signed_amount()) else {
            found.push(Discrepancy::Overflow {
                entry_id: entry.entry_id.clone(),
            });
            return found;
        };
        running = next;
        if entry.balance_after != running {
            found.push(Discrepancy::Entry {
                entry_id: entry.entry_id.clone(),
                expected: running,
                recorded: entry.balance_after,
            });
        }
    }
    if running != stored {
        found.push(Discrepancy::Balance {
            expected: running,
            stored,
        });
    }
    found
}
