//! Application layer containing the payment lifecycle orchestration.
//!
//! The `Gateway` is the entry point. Deferred work (settlement, refund
//! completion, webhook attempts) is submitted as jobs over a `tokio` channel
//! and each job runs on its own task, so one slow transaction never holds up
//! another.

pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod refund;
pub mod webhook;
pub mod worker;

use crate::domain::ports::{
    LedgerStoreRef, MerchantDirectoryRef, RefundStoreRef, TransactionStoreRef, WebhookStoreRef,
};
use std::time::Duration;

/// Reason recorded when a background step fails unexpectedly.
pub const INTERNAL_ERROR_REASON: &str = "Internal processing error";

/// How often a terminal failure write is retried after an internal fault.
pub(crate) const FAULT_WRITE_ATTEMPTS: u32 = 3;

/// Handles to every storage port.
#[derive(Clone)]
pub struct Stores {
    pub merchants: MerchantDirectoryRef,
    pub transactions: TransactionStoreRef,
    pub refunds: RefundStoreRef,
    pub ledger: LedgerStoreRef,
    pub webhooks: WebhookStoreRef,
}

async fn simulate_latency(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
