use super::webhook::WebhookDispatcher;
use crate::domain::event::{EventType, PaymentEvent};
use crate::domain::ports::{ClockRef, EventPublisherRef, MerchantDirectoryRef};
use crate::domain::transaction::Transaction;
use crate::domain::webhook::WebhookPayload;
use tracing::{debug, warn};

/// Outbound side effects of a transaction changing state. Neither channel can
/// fail the caller: problems are logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    merchants: MerchantDirectoryRef,
    events: EventPublisherRef,
    webhooks: WebhookDispatcher,
    clock: ClockRef,
}

impl Notifier {
    pub fn new(
        merchants: MerchantDirectoryRef,
        events: EventPublisherRef,
        webhooks: WebhookDispatcher,
        clock: ClockRef,
    ) -> Self {
        Self {
            merchants,
            events,
            webhooks,
            clock,
        }
    }

    pub async fn event(&self, event_type: EventType, tx: &Transaction) {
        let event = PaymentEvent::new(event_type, tx, self.clock.now());
        if let Err(e) = self.events.publish(&event).await {
            warn!(
                transaction_id = %tx.transaction_id,
                event_type = ?event_type,
                error = %e,
                "failed to publish payment event"
            );
        }
    }

    /// Enqueues a webhook carrying the transaction's current status to the
    /// merchant's callback URL, if it has one.
    pub async fn webhook(&self, tx: &Transaction) {
        let callback_url = match self.merchants.get_merchant(&tx.merchant_id).await {
            Ok(Some(merchant)) if !merchant.callback_url.trim().is_empty() => merchant.callback_url,
            Ok(_) => {
                debug!(merchant_id = %tx.merchant_id, "no callback URL, webhook skipped");
                return;
            }
            Err(e) => {
                warn!(
                    merchant_id = %tx.merchant_id,
                    error = %e,
                    "merchant lookup failed, webhook skipped"
                );
                return;
            }
        };
        let payload = WebhookPayload::for_transaction(tx, self.clock.now());
        if let Err(e) = self.webhooks.enqueue(&payload, &callback_url).await {
            warn!(transaction_id = %tx.transaction_id, error = %e, "failed to enqueue webhook");
        }
    }
}
