use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use beacon_core::{ChangePublisher, ChangeSet, Event, EventError, ReadTxn};

use crate::events::service_health_events_from_changes;
use crate::subscribe::SubscribeRequest;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("subscriber fell behind by {0} batches and must resnapshot")]
    Lagged(u64),

    #[error("publisher closed")]
    Closed,
}

/// Fans committed event batches out to in-process subscribers.
///
/// One batch per transaction. Slow subscribers lose batches and are told so
/// on their next receive.
pub struct EventPublisher {
    tx: broadcast::Sender<Arc<[Event]>>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Every batch, unfiltered.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<[Event]>> {
        self.tx.subscribe()
    }

    /// Batches narrowed to the events `req` matches.
    pub fn subscribe_to(&self, req: SubscribeRequest) -> Subscription {
        Subscription {
            req,
            rx: self.tx.subscribe(),
        }
    }
}

impl ChangePublisher for EventPublisher {
    fn prepare(&self, tx: &dyn ReadTxn, changes: &ChangeSet) -> Result<Vec<Event>, EventError> {
        service_health_events_from_changes(tx, changes)
    }

    fn publish(&self, events: Vec<Event>) {
        // no receivers is fine
        let _ = self.tx.send(events.into());
    }
}

pub struct Subscription {
    req: SubscribeRequest,
    rx: broadcast::Receiver<Arc<[Event]>>,
}

impl Subscription {
    /// Next non-empty batch of matching events.
    pub async fn next(&mut self) -> Result<Vec<Event>, SubscriptionError> {
        loop {
            let batch = match self.rx.recv().await {
                Ok(batch) => batch,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(key = %self.req.key, skipped = n, "subscriber lagged");
                    return Err(SubscriptionError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
            };
            let matching: Vec<Event> = batch
                .iter()
                .filter(|e| self.req.matches(e))
                .cloned()
                .collect();
            if !matching.is_empty() {
                return Ok(matching);
            }
        }
    }
}
