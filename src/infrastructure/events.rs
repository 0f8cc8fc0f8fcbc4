use crate::domain::event::PaymentEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Stands in for an absent event bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _event: &PaymentEvent) -> Result<()> {
        Ok(())
    }
}

/// Fans events out over a tokio broadcast channel. Slow subscribers lag and
/// lose events; publishing never waits for them.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<PaymentEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: &PaymentEvent) -> Result<()> {
        // No subscribers is not a failure.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
