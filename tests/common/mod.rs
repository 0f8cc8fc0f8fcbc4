#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paygate::application::gateway::{Gateway, GatewayBuilder};
use paygate::application::lifecycle::PaymentRequest;
use paygate::config::GatewayConfig;
use paygate::domain::merchant::Merchant;
use paygate::domain::policy::Policies;
use paygate::domain::ledger::{EntryType, LedgerEntry, Posting, RecordWrites};
use paygate::domain::ports::{LedgerStore, WebhookTransport};
use paygate::domain::signature;
use paygate::domain::transaction::PaymentMethod;
use paygate::domain::webhook::DeliveryOutcome;
use paygate::error::{PaymentError, Result};
use paygate::infrastructure::in_memory::InMemoryStore;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const MERCHANT: &str = "MER_1";
pub const SECRET: &str = "mer1-secret";
pub const CALLBACK: &str = "http://merchant.test/callback";

/// Records every POST. Answers with scripted outcomes first, then with
/// `fallback`.
pub struct RecordingTransport {
    pub outcomes: Mutex<VecDeque<DeliveryOutcome>>,
    pub posts: Mutex<Vec<(String, String)>>,
    fallback: DeliveryOutcome,
}

impl RecordingTransport {
    pub fn answering(fallback: DeliveryOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            posts: Mutex::new(Vec::new()),
            fallback,
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::answering(DeliveryOutcome::Delivered {
            status_code: 200,
            body: "ok".to_string(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::answering(DeliveryOutcome::Rejected {
            status_code: 500,
            body: "down".to_string(),
        })
    }

    pub fn count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    /// Delivered bodies, parsed.
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| serde_json::from_str(body).unwrap())
            .collect()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, url: &str, body: &str) -> DeliveryOutcome {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), body.to_string()));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Ledger over `store` whose posts fail, either all of them or only one
/// entry type. Reads always delegate.
pub struct BrokenLedger {
    store: InMemoryStore,
    failing: Option<EntryType>,
}

impl BrokenLedger {
    pub fn all(store: &InMemoryStore) -> Arc<Self> {
        Arc::new(Self {
            store: store.clone(),
            failing: None,
        })
    }

    pub fn only(store: &InMemoryStore, entry_type: EntryType) -> Arc<Self> {
        Arc::new(Self {
            store: store.clone(),
            failing: Some(entry_type),
        })
    }
}

#[async_trait]
impl LedgerStore for BrokenLedger {
    async fn post(
        &self,
        posting: Posting,
        writes: RecordWrites,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        match self.failing {
            Some(entry_type) if entry_type != posting.entry_type => {
                self.store.post(posting, writes, now).await
            }
            _ => Err(PaymentError::Storage("ledger unavailable".to_string())),
        }
    }

    async fn entries_for_reference(&self, reference_id: &str) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_reference(reference_id).await
    }

    async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_transaction(transaction_id).await
    }

    async fn entries_for_merchant(&self, merchant_id: &str) -> Result<Vec<LedgerEntry>> {
        self.store.entries_for_merchant(merchant_id).await
    }
}

pub async fn store_with_merchant(callback_url: &str) -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .register_merchant(Merchant::new(MERCHANT, "Acme", SECRET, callback_url))
        .await;
    store
}

/// Instant delays, deterministic gates, no background sweep.
pub fn builder(store: &InMemoryStore, transport: Arc<RecordingTransport>) -> GatewayBuilder {
    Gateway::builder(GatewayConfig::instant())
        .store(store.clone())
        .transport(transport)
        .policies(Policies::deterministic())
        .sweeper(false)
}

pub async fn gateway() -> (Gateway, InMemoryStore, Arc<RecordingTransport>) {
    let store = store_with_merchant(CALLBACK).await;
    let transport = RecordingTransport::ok();
    let gateway = builder(&store, transport.clone()).start().unwrap();
    (gateway, store, transport)
}

pub fn payment(order_id: &str, amount: Decimal) -> PaymentRequest {
    PaymentRequest {
        merchant_id: MERCHANT.to_string(),
        order_id: order_id.to_string(),
        amount,
        currency: Some("INR".to_string()),
        payment_method: PaymentMethod::Upi,
        description: None,
        idempotency_key: None,
        signature: None,
    }
}

pub fn signed(mut request: PaymentRequest) -> PaymentRequest {
    let currency = request.currency.clone().unwrap_or_else(|| "INR".to_string());
    request.signature = Some(
        signature::sign(
            &request.merchant_id,
            &request.order_id,
            request.amount,
            &currency,
            SECRET,
        )
        .unwrap(),
    );
    request
}
