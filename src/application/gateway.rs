use super::Stores;
use super::ledger::Ledger;
use super::lifecycle::{PaymentEngine, PaymentInitiated, PaymentRequest};
use super::notify::Notifier;
use super::refund::RefundEngine;
use super::webhook::{SweepReport, WebhookDispatcher, run_sweeper};
use super::worker::{Job, JobHandler, JobQueue, WorkerPool};
use crate::config::GatewayConfig;
use crate::domain::merchant::Merchant;
use crate::domain::policy::Policies;
use crate::domain::ports::{
    ClockRef, EventPublisherRef, LedgerStore, LedgerStoreRef, MerchantDirectory,
    MerchantDirectoryRef, RefundStore, TransactionStore, WebhookStore, WebhookTransportRef,
};
use crate::domain::refund::RefundView;
use crate::domain::transaction::Transaction;
use crate::domain::webhook::WebhookDelivery;
use crate::error::{PaymentError, Result};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::events::NoopEventPublisher;
use crate::infrastructure::http::HttpWebhookTransport;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Routes jobs from the queue to the engine that owns them.
struct JobRunner {
    payments: PaymentEngine,
    refunds: RefundEngine,
    webhooks: WebhookDispatcher,
}

#[async_trait]
impl JobHandler for JobRunner {
    async fn handle(&self, job: Job) {
        match job {
            Job::Settle { transaction_id } => self.payments.settle(&transaction_id).await,
            Job::CompleteRefund { refund_id } => self.refunds.complete_refund(&refund_id).await,
            Job::DeliverWebhook { delivery_id } => {
                self.webhooks.deliver(&delivery_id).await;
            }
        }
    }
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    stores: Option<Stores>,
    ledger_store: Option<LedgerStoreRef>,
    transport: Option<WebhookTransportRef>,
    events: EventPublisherRef,
    clock: ClockRef,
    policies: Option<Policies>,
    sweeper: bool,
}

impl GatewayBuilder {
    /// Uses one store for every storage port.
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: MerchantDirectory
            + TransactionStore
            + RefundStore
            + LedgerStore
            + WebhookStore
            + Clone
            + 'static,
    {
        self.stores = Some(Stores {
            merchants: Arc::new(store.clone()),
            transactions: Arc::new(store.clone()),
            refunds: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            webhooks: Arc::new(store),
        });
        self
    }

    /// Replaces only the ledger port, for fault injection.
    ///
    /// `ledger` must wrap the store passed to [`GatewayBuilder::store`]: a
    /// posting commits its transaction and refund writes through the ledger
    /// port, so a separate store would apply them to the wrong records.
    #[doc(hidden)]
    pub fn ledger_store(mut self, ledger: LedgerStoreRef) -> Self {
        self.ledger_store = Some(ledger);
        self
    }

    pub fn transport(mut self, transport: WebhookTransportRef) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn events(mut self, events: EventPublisherRef) -> Self {
        self.events = events;
        self
    }

    pub fn clock(mut self, clock: ClockRef) -> Self {
        self.clock = clock;
        self
    }

    pub fn policies(mut self, policies: Policies) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Whether to run the periodic webhook sweep (default on).
    pub fn sweeper(mut self, enabled: bool) -> Self {
        self.sweeper = enabled;
        self
    }

    /// Wires the engines and spawns the job dispatcher (and the sweeper).
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Result<Gateway> {
        let mut stores = self
            .stores
            .ok_or_else(|| PaymentError::internal("gateway started without a store"))?;
        if let Some(ledger) = self.ledger_store {
            stores.ledger = ledger;
        }
        let config = self.config;
        let transport = self
            .transport
            .unwrap_or_else(|| {
                Arc::new(HttpWebhookTransport::new(config.webhook.request_timeout()))
            });
        let policies = self.policies.unwrap_or_else(|| {
            Policies::random(
                config.fraud.flag_probability,
                config.settlement.success_rate,
                config.refund.success_rate,
            )
        });

        let (jobs, receiver) = JobQueue::channel();
        let webhooks = WebhookDispatcher::new(
            stores.webhooks.clone(),
            transport,
            jobs.clone(),
            self.clock.clone(),
            config.webhook.clone(),
        );
        let ledger = Ledger::new(
            stores.ledger.clone(),
            stores.merchants.clone(),
            self.clock.clone(),
        );
        let notifier = Notifier::new(
            stores.merchants.clone(),
            self.events,
            webhooks.clone(),
            self.clock.clone(),
        );
        let payments = PaymentEngine::new(
            &stores,
            ledger.clone(),
            notifier.clone(),
            jobs.clone(),
            self.clock.clone(),
            &policies,
            &config,
        );
        let refunds = RefundEngine::new(
            &stores,
            ledger.clone(),
            notifier,
            jobs.clone(),
            self.clock,
            policies.refund.clone(),
            config.refund.clone(),
        );

        let pool = WorkerPool::new(config.workers);
        let runner = Arc::new(JobRunner {
            payments: payments.clone(),
            refunds: refunds.clone(),
            webhooks: webhooks.clone(),
        });
        let mut tasks = vec![tokio::spawn(receiver.run(pool.clone(), runner))];
        if self.sweeper {
            tasks.push(tokio::spawn(run_sweeper(
                webhooks.clone(),
                config.webhook.sweep_initial_delay(),
                config.webhook.sweep_interval(),
            )));
        }
        info!(workers = config.workers, sweeper = self.sweeper, "gateway started");

        Ok(Gateway {
            payments,
            refunds,
            webhooks,
            ledger,
            merchants: stores.merchants,
            jobs,
            pool,
            tasks,
        })
    }
}

/// The inbound request surface, one method per engine operation.
///
/// Dropping the gateway stops its background tasks; use
/// [`shutdown`](Gateway::shutdown) to let queued work finish first.
pub struct Gateway {
    payments: PaymentEngine,
    refunds: RefundEngine,
    webhooks: WebhookDispatcher,
    ledger: Ledger,
    merchants: MerchantDirectoryRef,
    jobs: JobQueue,
    pool: WorkerPool,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            stores: None,
            ledger_store: None,
            transport: None,
            events: Arc::new(NoopEventPublisher),
            clock: Arc::new(SystemClock),
            policies: None,
            sweeper: true,
        }
    }

    pub async fn create_payment(&self, request: PaymentRequest) -> Result<PaymentInitiated> {
        self.payments.create(request).await
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction> {
        self.payments.get_status(transaction_id).await
    }

    pub async fn list_transactions(&self, merchant_id: &str) -> Result<Vec<Transaction>> {
        self.payments.list_by_merchant(merchant_id).await
    }

    pub async fn initiate_refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<RefundView> {
        self.refunds.initiate_refund(transaction_id, amount, reason).await
    }

    pub async fn get_refund(&self, refund_id: &str) -> Result<RefundView> {
        self.refunds.get_refund(refund_id).await
    }

    pub async fn list_refunds(&self, transaction_id: &str) -> Result<Vec<RefundView>> {
        self.refunds.list_by_transaction(transaction_id).await
    }

    pub async fn webhook_logs(&self, transaction_id: &str) -> Result<Vec<WebhookDelivery>> {
        self.webhooks.logs_for_transaction(transaction_id).await
    }

    pub async fn merchants(&self) -> Result<Vec<Merchant>> {
        self.merchants.list_merchants().await
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn payments(&self) -> &PaymentEngine {
        &self.payments
    }

    pub fn refunds(&self) -> &RefundEngine {
        &self.refunds
    }

    pub fn webhooks(&self) -> &WebhookDispatcher {
        &self.webhooks
    }

    /// Runs one sweep now, independent of the periodic sweeper.
    pub async fn sweep(&self) -> SweepReport {
        self.webhooks.sweep().await
    }

    /// Waits until no settlement, refund completion or webhook attempt is
    /// queued or running.
    pub async fn wait_idle(&self) {
        self.jobs.wait_idle().await;
    }

    pub async fn shutdown(self) {
        self.wait_idle().await;
        info!("gateway stopped");
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.pool.close();
        for task in &self.tasks {
            task.abort();
        }
    }
}
