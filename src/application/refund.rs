use super::ledger::Ledger;
use super::notify::Notifier;
use super::worker::{Job, JobQueue};
use super::{FAULT_WRITE_ATTEMPTS, INTERNAL_ERROR_REASON, Stores, simulate_latency};
use crate::config::RefundConfig;
use crate::domain::event::EventType;
use crate::domain::ids;
use crate::domain::ledger::RecordWrites;
use crate::domain::money::Amount;
use crate::domain::policy::GateRef;
use crate::domain::ports::{ClockRef, RefundStoreRef, TransactionStoreRef};
use crate::domain::refund::{Refund, RefundStatus, RefundView};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

pub const REFUND_DECLINED_REASON: &str = "Bank declined refund";

/// Refunds against settled transactions.
///
/// A successful completion commits the refund, the transaction's refunded
/// total and the ledger debit in one posting. A failed refund has no
/// financial effect.
#[derive(Clone)]
pub struct RefundEngine {
    transactions: TransactionStoreRef,
    refunds: RefundStoreRef,
    ledger: Ledger,
    notifier: Notifier,
    jobs: JobQueue,
    clock: ClockRef,
    gate: GateRef,
    config: RefundConfig,
}

enum Completion {
    Done,
    Declined(String),
    /// Another writer changed the transaction or refund first.
    Raced,
}

impl RefundEngine {
    pub fn new(
        stores: &Stores,
        ledger: Ledger,
        notifier: Notifier,
        jobs: JobQueue,
        clock: ClockRef,
        gate: GateRef,
        config: RefundConfig,
    ) -> Self {
        Self {
            transactions: stores.transactions.clone(),
            refunds: stores.refunds.clone(),
            ledger,
            notifier,
            jobs,
            clock,
            gate,
            config,
        }
    }

    /// Checks the request against the transaction, stores a PROCESSING refund
    /// and schedules its completion.
    pub async fn initiate_refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<RefundView> {
        let tx = self
            .transactions
            .get(transaction_id)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("Transaction not found: {transaction_id}"))
            })?;
        if !tx.status.is_refundable() {
            return Err(PaymentError::InvalidState(format!(
                "Cannot refund transaction with status: {}",
                tx.status
            )));
        }
        let amount = Amount::new(amount)?;
        let now = self.clock.now();
        // Dry run against a copy: same bound the completion enforces.
        tx.clone().apply_refund(amount, now)?;

        let refund = Refund::new(ids::refund_id(now), &tx, amount, reason, now);
        let refund = self.refunds.insert(refund).await?;
        info!(
            refund_id = %refund.refund_id,
            transaction_id,
            amount = %amount,
            "refund initiated"
        );

        if let Err(e) = self.jobs.submit(Job::CompleteRefund {
            refund_id: refund.refund_id.clone(),
        }) {
            error!(refund_id = %refund.refund_id, error = %e, "refund completion not scheduled");
        }
        Ok(RefundView::initiated(&refund))
    }

    /// Resolves a PROCESSING refund. Internal faults resolve it to FAILED.
    pub async fn complete_refund(&self, refund_id: &str) {
        simulate_latency(self.config.processing_delay_ms).await;

        let approved = self.gate.pass();
        loop {
            match self.try_complete(refund_id, approved).await {
                Ok(Completion::Done) => return,
                Ok(Completion::Declined(reason)) => {
                    self.fail_refund(refund_id, &reason).await;
                    return;
                }
                // Another refund committed first. Re-read and re-check the bound.
                Ok(Completion::Raced) => {
                    debug!(refund_id, "refund completion raced, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    error!(refund_id, error = %e, "error processing refund");
                    break;
                }
            }
        }
        self.fail_refund(refund_id, INTERNAL_ERROR_REASON).await;
    }

    async fn try_complete(&self, refund_id: &str, approved: bool) -> Result<Completion> {
        let mut refund = self.get_refund_record(refund_id).await?;
        if refund.status != RefundStatus::Processing {
            info!(refund_id, status = refund.status.as_str(), "refund already resolved");
            return Ok(Completion::Done);
        }
        if !approved {
            return Ok(Completion::Declined(REFUND_DECLINED_REASON.to_string()));
        }

        let mut tx = self
            .transactions
            .get(&refund.transaction_id)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("Transaction not found: {}", refund.transaction_id))
            })?;
        let now = self.clock.now();
        if let Err(e) = tx.apply_refund(refund.amount, now) {
            // Concurrent refunds may have used up the balance since initiation.
            if e.is_client_error() {
                return Ok(Completion::Declined(e.to_string()));
            }
            return Err(e);
        }
        refund.succeed(now);

        let posted = self
            .ledger
            .record_debit(
                &refund.merchant_id,
                refund.amount,
                &refund.currency,
                &refund.refund_id,
                &tx.transaction_id,
                RecordWrites::refund_and_transaction(refund.clone(), tx.clone()),
            )
            .await;
        match posted {
            Ok(_) => {}
            Err(PaymentError::Conflict(_)) => return Ok(Completion::Raced),
            Err(e) => return Err(e),
        }

        info!(
            refund_id,
            transaction_id = %tx.transaction_id,
            status = %tx.status,
            refunded_amount = %tx.refunded_amount,
            "refund completed"
        );
        self.notifier.event(EventType::Refunded, &tx).await;
        self.notifier.webhook(&tx).await;
        Ok(Completion::Done)
    }

    async fn fail_refund(&self, refund_id: &str, reason: &str) {
        for attempt in 1..=FAULT_WRITE_ATTEMPTS {
            let mut refund = match self.refunds.get(refund_id).await {
                Ok(Some(refund)) => refund,
                Ok(None) => return,
                Err(e) => {
                    warn!(refund_id, attempt, error = %e, "reload refund failed");
                    continue;
                }
            };
            if refund.status != RefundStatus::Processing {
                return;
            }
            refund.fail(reason, self.clock.now());
            match self.refunds.update(refund).await {
                Ok(_) => {
                    info!(refund_id, reason, "refund failed");
                    return;
                }
                Err(e) => warn!(refund_id, attempt, error = %e, "refund failure write rejected"),
            }
        }
        error!(refund_id, "refund left unresolved");
    }

    async fn get_refund_record(&self, refund_id: &str) -> Result<Refund> {
        self.refunds
            .get(refund_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Refund not found: {refund_id}")))
    }

    pub async fn get_refund(&self, refund_id: &str) -> Result<RefundView> {
        let refund = self.get_refund_record(refund_id).await?;
        Ok(RefundView::from(&refund))
    }

    pub async fn list_by_transaction(&self, transaction_id: &str) -> Result<Vec<RefundView>> {
        let refunds = self.refunds.list_by_transaction(transaction_id).await?;
        Ok(refunds.iter().map(RefundView::from).collect())
    }
}
