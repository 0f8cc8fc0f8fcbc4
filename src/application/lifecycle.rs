use super::ledger::Ledger;
use super::notify::Notifier;
use super::worker::{Job, JobQueue};
use super::{FAULT_WRITE_ATTEMPTS, INTERNAL_ERROR_REASON, Stores, simulate_latency};
use crate::config::{FraudConfig, GatewayConfig, SettlementConfig};
use crate::domain::event::EventType;
use crate::domain::ids;
use crate::domain::ledger::RecordWrites;
use crate::domain::money::Amount;
use crate::domain::policy::{GateRef, Policies};
use crate::domain::ports::{ClockRef, Inserted, MerchantDirectoryRef, TransactionStoreRef};
use crate::domain::signature;
use crate::domain::transaction::{PaymentMethod, PaymentStatus, Transaction};
use crate::error::{PaymentError, Result};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const FRAUD_REASON: &str = "High value transaction flagged";
pub const SETTLEMENT_DECLINED_REASON: &str = "Insufficient funds";

pub const MSG_INITIATED: &str = "Payment initiated successfully";
pub const MSG_EXISTS: &str = "Transaction already exists";
pub const MSG_REVIEW: &str = "Transaction under review";

/// Inbound payment request as handed over by the routing layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub merchant_id: String,
    pub order_id: String,
    /// Read from the JSON token text, so the scale the client signed survives.
    #[serde(deserialize_with = "rust_decimal::serde::arbitrary_precision::deserialize")]
    pub amount: Decimal,
    /// Falls back to the configured default currency.
    #[serde(default)]
    pub currency: Option<String>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiated {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub redirect_url: String,
    pub message: String,
}

impl PaymentInitiated {
    fn from_transaction(tx: &Transaction, message: &str) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            status: tx.status,
            redirect_url: tx.redirect_url.clone(),
            message: message.to_string(),
        }
    }
}

/// Owns transaction creation and settlement.
///
/// ```text
/// INITIATED ──fraud gate──> REVIEW
///     │
///     └─> PROCESSING ──> SUCCESS ──> PARTIAL_REFUNDED ──> REFUNDED
///                   └──> FAILED
/// ```
#[derive(Clone)]
pub struct PaymentEngine {
    merchants: MerchantDirectoryRef,
    transactions: TransactionStoreRef,
    ledger: Ledger,
    notifier: Notifier,
    jobs: JobQueue,
    clock: ClockRef,
    fraud_gate: GateRef,
    settlement_gate: GateRef,
    fraud: FraudConfig,
    settlement: SettlementConfig,
    payment_page_url: String,
    default_currency: String,
}

impl PaymentEngine {
    pub fn new(
        stores: &Stores,
        ledger: Ledger,
        notifier: Notifier,
        jobs: JobQueue,
        clock: ClockRef,
        policies: &Policies,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            merchants: stores.merchants.clone(),
            transactions: stores.transactions.clone(),
            ledger,
            notifier,
            jobs,
            clock,
            fraud_gate: policies.fraud.clone(),
            settlement_gate: policies.settlement.clone(),
            fraud: config.fraud.clone(),
            settlement: config.settlement.clone(),
            payment_page_url: config.payment_page_url.trim_end_matches('/').to_string(),
            default_currency: config.default_currency.clone(),
        }
    }

    /// Validates, screens and stores a new payment, then schedules settlement
    /// unless it was flagged.
    ///
    /// With an idempotency key that is already taken, the stored transaction
    /// is returned as-is and nothing else happens.
    pub async fn create(&self, request: PaymentRequest) -> Result<PaymentInitiated> {
        if request.merchant_id.trim().is_empty() {
            return Err(PaymentError::InvalidArgument("merchantId is required".to_string()));
        }
        if request.order_id.trim().is_empty() {
            return Err(PaymentError::InvalidArgument("orderId is required".to_string()));
        }
        let amount = Amount::new(request.amount)?;
        let currency = request
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_currency)
            .to_string();

        let merchant = self
            .merchants
            .get_merchant(&request.merchant_id)
            .await?
            .filter(|m| m.active)
            .ok_or_else(|| {
                PaymentError::NotFound(format!("Merchant not found: {}", request.merchant_id))
            })?;

        if let Some(supplied) = &request.signature {
            signature::verify(
                &merchant.merchant_id,
                &request.order_id,
                amount.value(),
                &currency,
                &merchant.secret_key,
                supplied,
            )?;
        }

        let idempotency_key = request.idempotency_key.filter(|k| !k.trim().is_empty());
        if let Some(key) = &idempotency_key
            && let Some(existing) = self.transactions.find_by_idempotency_key(key).await?
        {
            info!(transaction_id = %existing.transaction_id, "idempotent replay");
            return Ok(PaymentInitiated::from_transaction(&existing, MSG_EXISTS));
        }

        let fraud_checked = amount.value() > self.fraud.threshold;
        let fraudulent = fraud_checked && self.fraud_gate.pass();

        let now = self.clock.now();
        let transaction_id = ids::transaction_id(now);
        let tx = Transaction {
            redirect_url: format!("{}/{}", self.payment_page_url, transaction_id),
            transaction_id,
            merchant_id: merchant.merchant_id,
            order_id: request.order_id,
            amount,
            currency,
            refunded_amount: Decimal::ZERO,
            status: if fraudulent {
                PaymentStatus::Review
            } else {
                PaymentStatus::Initiated
            },
            payment_method: request.payment_method,
            description: request.description,
            idempotency_key,
            failure_reason: None,
            fraud_checked,
            fraudulent,
            fraud_reason: fraudulent.then(|| FRAUD_REASON.to_string()),
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        };

        let tx = match self.transactions.insert(tx).await? {
            Inserted::Created(tx) => tx,
            Inserted::Existing(existing) => {
                info!(transaction_id = %existing.transaction_id, "idempotent replay");
                return Ok(PaymentInitiated::from_transaction(&existing, MSG_EXISTS));
            }
        };
        info!(
            transaction_id = %tx.transaction_id,
            merchant_id = %tx.merchant_id,
            amount = %tx.amount,
            status = %tx.status,
            "payment initiated"
        );

        self.notifier.event(EventType::Initiated, &tx).await;

        if fraudulent {
            warn!(transaction_id = %tx.transaction_id, "transaction flagged for review");
            return Ok(PaymentInitiated::from_transaction(&tx, MSG_REVIEW));
        }

        if let Err(e) = self.jobs.submit(Job::Settle {
            transaction_id: tx.transaction_id.clone(),
        }) {
            error!(transaction_id = %tx.transaction_id, error = %e, "settlement not scheduled");
        }
        Ok(PaymentInitiated::from_transaction(&tx, MSG_INITIATED))
    }

    /// Drives an INITIATED transaction to SUCCESS or FAILED. Any other status
    /// is left alone. Internal faults resolve the transaction to FAILED.
    pub async fn settle(&self, transaction_id: &str) {
        if let Err(e) = self.try_settle(transaction_id).await {
            error!(transaction_id, error = %e, "error processing payment");
            self.fail_after_fault(transaction_id).await;
        }
    }

    async fn try_settle(&self, transaction_id: &str) -> Result<()> {
        simulate_latency(self.gateway_latency_ms()).await;

        let mut tx = self.get_status(transaction_id).await?;
        if tx.status != PaymentStatus::Initiated {
            info!(transaction_id, status = %tx.status, "settlement skipped");
            return Ok(());
        }
        tx.transition(PaymentStatus::Processing, self.clock.now())?;
        let mut tx = self.transactions.update(tx).await?;
        info!(transaction_id, "transaction processing");

        simulate_latency(self.settlement.processing_delay_ms).await;

        if self.settlement_gate.pass() {
            tx.transition(PaymentStatus::Success, self.clock.now())?;
            self.ledger
                .record_credit(
                    &tx.merchant_id,
                    tx.amount,
                    &tx.currency,
                    &tx.transaction_id,
                    RecordWrites::transaction(tx.clone()),
                )
                .await?;
            info!(transaction_id, "payment completed successfully");
            self.notifier.event(EventType::Succeeded, &tx).await;
            self.notifier.webhook(&tx).await;
        } else {
            tx.fail(SETTLEMENT_DECLINED_REASON, self.clock.now())?;
            let tx = self.transactions.update(tx).await?;
            info!(transaction_id, reason = SETTLEMENT_DECLINED_REASON, "payment failed");
            self.notifier.event(EventType::Failed, &tx).await;
            self.notifier.webhook(&tx).await;
        }
        Ok(())
    }

    async fn fail_after_fault(&self, transaction_id: &str) {
        for attempt in 1..=FAULT_WRITE_ATTEMPTS {
            let mut tx = match self.transactions.get(transaction_id).await {
                Ok(Some(tx)) => tx,
                Ok(None) => return,
                Err(e) => {
                    warn!(transaction_id, attempt, error = %e, "reload after fault failed");
                    continue;
                }
            };
            if !matches!(tx.status, PaymentStatus::Initiated | PaymentStatus::Processing) {
                return;
            }
            if tx.fail(INTERNAL_ERROR_REASON, self.clock.now()).is_err() {
                return;
            }
            match self.transactions.update(tx).await {
                Ok(tx) => {
                    warn!(transaction_id, "transaction failed after internal error");
                    self.notifier.event(EventType::Failed, &tx).await;
                    self.notifier.webhook(&tx).await;
                    return;
                }
                Err(e) => warn!(transaction_id, attempt, error = %e, "failure write rejected"),
            }
        }
        error!(transaction_id, "transaction left unresolved after internal error");
    }

    fn gateway_latency_ms(&self) -> u64 {
        let (min, max) = (self.settlement.min_delay_ms, self.settlement.max_delay_ms);
        if max > min {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        }
    }

    pub async fn get_status(&self, transaction_id: &str) -> Result<Transaction> {
        self.transactions
            .get(transaction_id)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("Transaction not found: {transaction_id}"))
            })
    }

    pub async fn list_by_merchant(&self, merchant_id: &str) -> Result<Vec<Transaction>> {
        self.transactions.list_by_merchant(merchant_id).await
    }
}
