//! Broadcast bus for committed workflow events
//!
//! Events are published only after the store commit succeeds, so a
//! subscriber never sees a transition that could still be rolled back.
//! Persistence is the store's job; the bus is purely in-process fan-out.

use tokio::sync::broadcast;
use tracing::debug;

use crate::audit::WorkflowEvent;
use crate::lifecycle::Action;
use crate::ticket::{Category, TicketId};

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Subscriber lagged, skipped {0} events")]
    Lagged(u64),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fan an event out to current subscribers; returns how many got it
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        let ticket_id = event.ticket_id.clone();
        let action = event.action;
        match self.sender.send(event) {
            Ok(count) => {
                debug!(ticket_id = %ticket_id, %action, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(ticket_id = %ticket_id, %action, "Event published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub ticket_id: Option<TicketId>,
    pub category: Option<Category>,
    /// Any of these actions
    pub actions: Option<Vec<Action>>,
}

impl EventFilter {
    /// Matches all events
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(mut self, ticket_id: &str) -> Self {
        self.ticket_id = Some(ticket_id.to_string());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn matches(&self, event: &WorkflowEvent) -> bool {
        if let Some(ref id) = self.ticket_id {
            if &event.ticket_id != id {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category() != Some(category) {
                return false;
            }
        }
        if let Some(ref actions) = self.actions {
            if !actions.contains(&event.action) {
                return false;
            }
        }
        true
    }
}

/// Receiver that only yields events passing its filter
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<WorkflowEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<WorkflowEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Next matching event
    pub async fn recv(&mut self) -> EventBusResult<WorkflowEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Err(EventBusError::Lagged(n))
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            }
        }
    }
}
