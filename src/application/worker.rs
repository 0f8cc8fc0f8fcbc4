//! Background work submission.
//!
//! Jobs carry only an entity ID, so whoever runs them re-reads current state
//! before acting. A [`JobQueue`] hands jobs to a single dispatcher loop which
//! runs each one as its own task on a bounded [`WorkerPool`].

use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Settle { transaction_id: String },
    CompleteRefund { refund_id: String },
    DeliverWebhook { delivery_id: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: Job);
}

/// Counts submitted jobs that have not finished yet.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Finishes one job when dropped, so a job that panics still counts as done.
struct Finished(Arc<InFlight>);

impl Drop for Finished {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
    in_flight: Arc<InFlight>,
}

pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<Job>,
    in_flight: Arc<InFlight>,
}

impl JobQueue {
    pub fn channel() -> (JobQueue, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let in_flight = Arc::new(InFlight::default());
        (
            JobQueue {
                sender,
                in_flight: in_flight.clone(),
            },
            JobReceiver {
                receiver,
                in_flight,
            },
        )
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        self.in_flight.start();
        if let Err(e) = self.sender.send(job) {
            self.in_flight.finish();
            return Err(PaymentError::internal(format!(
                "job queue closed, dropped {:?}",
                e.0
            )));
        }
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolves once no job is queued or running. Jobs submitted by running
    /// jobs are counted before their parent finishes.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Caps how many jobs run at the same time.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Waits for a free slot, then runs `task` on its own tokio task.
    /// Returns `None` once the pool is closed.
    pub async fn spawn<F>(&self, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.ok()?;
        Some(tokio::spawn(async move {
            task.await;
            drop(permit);
        }))
    }

    pub fn close(&self) {
        self.permits.close();
    }
}

impl JobReceiver {
    /// Dispatcher loop. Ends when every queue handle is dropped or the pool
    /// is closed.
    pub async fn run<H: JobHandler>(mut self, pool: WorkerPool, handler: Arc<H>) {
        while let Some(job) = self.receiver.recv().await {
            debug!(?job, "dispatching job");
            let handler = handler.clone();
            let finished = Finished(self.in_flight.clone());
            let spawned = pool
                .spawn(async move {
                    let _finished = finished;
                    handler.handle(job).await;
                })
                .await;
            // A refused task was dropped unrun, which already finished its job.
            if spawned.is_none() {
                warn!("worker pool closed, stopping dispatcher");
                break;
            }
        }
    }
}
