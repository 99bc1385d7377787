//! Broadcast event bus for distributing `WorkflowEvent` to multiple subscribers.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op.

use toolweave_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// Multi-consumer event bus for workflow lifecycle events.
///
/// Cloning the bus clones the sender, so every clone publishes into the
/// same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events (at least 1).
    ///
    /// Subscribers that fall further behind observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// with no subscribers the event is dropped.
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(execution_id = %event.execution_id(), "no event subscribers");
                0
            }
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
