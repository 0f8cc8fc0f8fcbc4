use super::worker::{Job, JobQueue};
use crate::config::WebhookConfig;
use crate::domain::ids;
use crate::domain::ports::{ClockRef, WebhookStoreRef, WebhookTransportRef};
use crate::domain::webhook::{DeliveryStatus, WebhookDelivery, WebhookPayload};
use crate::error::Result;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Outcome counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retrying: usize,
    pub failed: usize,
}

/// At-least-once notifier for merchant callbacks.
///
/// Every delivery is persisted before the first attempt and every attempt's
/// outcome is written back to the record, which is the only place delivery
/// errors surface. Receivers must tolerate duplicates.
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: WebhookStoreRef,
    transport: WebhookTransportRef,
    jobs: JobQueue,
    clock: ClockRef,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(
        store: WebhookStoreRef,
        transport: WebhookTransportRef,
        jobs: JobQueue,
        clock: ClockRef,
        config: WebhookConfig,
    ) -> Self {
        Self {
            store,
            transport,
            jobs,
            clock,
            config,
        }
    }

    /// Persists a PENDING record and schedules an immediate attempt.
    pub async fn enqueue(
        &self,
        payload: &WebhookPayload,
        callback_url: &str,
    ) -> Result<WebhookDelivery> {
        let now = self.clock.now();
        let delivery = WebhookDelivery::new(
            ids::webhook_id(now),
            payload,
            callback_url,
            self.config.max_retries,
            now,
        )?;
        let delivery = self.store.insert(delivery).await?;
        info!(
            delivery_id = %delivery.delivery_id,
            transaction_id = %delivery.transaction_id,
            status = %payload.status,
            "webhook enqueued"
        );

        // A record that never gets its first attempt is recovered by the sweep.
        if let Err(e) = self.jobs.submit(Job::DeliverWebhook {
            delivery_id: delivery.delivery_id.clone(),
        }) {
            warn!(
                delivery_id = %delivery.delivery_id,
                error = %e,
                "immediate delivery not scheduled"
            );
        }
        Ok(delivery)
    }

    /// Loads the record and attempts it. Never fails outward.
    pub async fn deliver(&self, delivery_id: &str) -> Option<DeliveryStatus> {
        match self.store.get(delivery_id).await {
            Ok(Some(record)) => self.attempt(record).await,
            Ok(None) => {
                warn!(delivery_id, "webhook delivery not found");
                None
            }
            Err(e) => {
                error!(delivery_id, error = %e, "failed to load webhook delivery");
                None
            }
        }
    }

    async fn attempt(&self, record: WebhookDelivery) -> Option<DeliveryStatus> {
        let delivery_id = record.delivery_id.clone();
        match self.attempt_delivery(record).await {
            Ok(updated) => Some(updated.status),
            Err(e) => {
                warn!(%delivery_id, error = %e, "webhook attempt not recorded");
                None
            }
        }
    }

    /// POSTs the stored payload and folds the outcome into the record.
    ///
    /// Terminal records are returned untouched. The write-back is version
    /// checked, so of two racing attempts on one record only one is counted.
    pub async fn attempt_delivery(&self, mut record: WebhookDelivery) -> Result<WebhookDelivery> {
        if record.status.is_terminal() {
            return Ok(record);
        }
        let attempt = record.retry_count + 1;
        info!(
            delivery_id = %record.delivery_id,
            transaction_id = %record.transaction_id,
            attempt,
            "attempting webhook delivery"
        );

        let outcome = self.transport.post(&record.callback_url, &record.payload).await;
        record.record_attempt(outcome, self.clock.now(), self.config.base_delay());
        let record = self.store.update(record).await?;

        match record.status {
            DeliveryStatus::Success => info!(
                delivery_id = %record.delivery_id,
                transaction_id = %record.transaction_id,
                "webhook delivered"
            ),
            DeliveryStatus::Retrying => warn!(
                delivery_id = %record.delivery_id,
                transaction_id = %record.transaction_id,
                retry_count = record.retry_count,
                next_retry_at = ?record.next_retry_at,
                error = record.error_message.as_deref().unwrap_or_default(),
                "webhook failed, will retry"
            ),
            DeliveryStatus::Failed => error!(
                delivery_id = %record.delivery_id,
                transaction_id = %record.transaction_id,
                retry_count = record.retry_count,
                "webhook failed permanently"
            ),
            DeliveryStatus::Pending => {}
        }
        Ok(record)
    }

    /// Attempts every due record, each on its own task, and waits for all of
    /// them.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let due = match self.store.due(now, self.config.pending_grace()).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "webhook sweep query failed");
                return SweepReport::default();
            }
        };
        info!(count = due.len(), "found webhooks to retry");

        let mut tasks = JoinSet::new();
        for record in due {
            let dispatcher = self.clone();
            tasks.spawn(async move { dispatcher.attempt(record).await });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            report.attempted += 1;
            match joined {
                Ok(Some(DeliveryStatus::Success)) => report.delivered += 1,
                Ok(Some(DeliveryStatus::Retrying)) => report.retrying += 1,
                Ok(Some(DeliveryStatus::Failed)) => report.failed += 1,
                Ok(_) => {}
                Err(e) => error!(error = %e, "webhook sweep task panicked"),
            }
        }
        report
    }

    pub async fn logs_for_transaction(&self, transaction_id: &str) -> Result<Vec<WebhookDelivery>> {
        self.store.list_by_transaction(transaction_id).await
    }
}

/// Periodic sweep: waits `initial_delay`, then sweeps every `interval`
/// (measured from the end of one sweep to the start of the next).
pub async fn run_sweeper(
    dispatcher: WebhookDispatcher,
    initial_delay: Duration,
    interval: Duration,
) {
    tokio::time::sleep(initial_delay).await;
    loop {
        let report = dispatcher.sweep().await;
        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                retrying = report.retrying,
                failed = report.failed,
                "webhook sweep finished"
            );
        }
        tokio::time::sleep(interval).await;
    }
}
