//! Assignment Router: per-category fixer work queues
//!
//! ```text
//!             approve / reopen                     claim
//! ticket ───────────────────────▶ [ELE queue] ─────────────▶ assigned
//!                                 emergency ▸ high ▸ medium ▸ low
//!                                 FIFO by enqueued_at within a level
//! ```
//!
//! The router holds no authority over ticket state. It mirrors which
//! tickets are claimable, and is rebuilt from the store on startup. The
//! single-winner guarantee for claims comes from the engine's per-ticket
//! lock plus the store's version check; the router just drops the entry
//! once a claim commits.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ticket::{Category, Priority, Ticket, TicketId};

/// A claimable ticket waiting in a category queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub ticket_id: TicketId,
    pub category: Category,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Entry for a queueable ticket; `None` if it has no priority yet.
    /// Arrival is the approval time, so a reopened ticket keeps its place
    /// and a rebuilt queue orders exactly like the live one.
    pub fn for_ticket(ticket: &Ticket) -> Option<Self> {
        Some(Self {
            ticket_id: ticket.ticket_id.clone(),
            category: ticket.category,
            priority: ticket.priority?,
            enqueued_at: ticket.approved_at.unwrap_or(ticket.created_at),
        })
    }

    fn key(&self) -> QueueKey {
        (self.priority, self.enqueued_at, self.ticket_id.clone())
    }
}

/// Priority first (emergency sorts lowest), then arrival, then id
type QueueKey = (Priority, DateTime<Utc>, TicketId);

#[derive(Default)]
pub struct AssignmentRouter {
    queues: DashMap<Category, BTreeMap<QueueKey, QueueEntry>>,
}

impl AssignmentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a ticket already queued is left where it is.
    /// Returns whether the entry was inserted.
    pub fn enqueue(&self, entry: QueueEntry) -> bool {
        let mut queue = self.queues.entry(entry.category).or_default();
        if queue.values().any(|e| e.ticket_id == entry.ticket_id) {
            return false;
        }
        debug!(
            ticket_id = %entry.ticket_id,
            category = %entry.category,
            priority = %entry.priority,
            depth = queue.len() + 1,
            "Ticket enqueued"
        );
        queue.insert(entry.key(), entry);
        true
    }

    /// Drop a ticket from its queue; returns the removed entry
    pub fn remove(&self, category: Category, ticket_id: &str) -> Option<QueueEntry> {
        let mut queue = self.queues.get_mut(&category)?;
        let key = queue
            .iter()
            .find(|(_, e)| e.ticket_id == ticket_id)
            .map(|(k, _)| k.clone())?;
        queue.remove(&key)
    }

    pub fn contains(&self, category: Category, ticket_id: &str) -> bool {
        self.queues
            .get(&category)
            .map(|q| q.values().any(|e| e.ticket_id == ticket_id))
            .unwrap_or(false)
    }

    /// Ordered snapshot of a category queue
    pub fn peek(&self, category: Category) -> Vec<QueueEntry> {
        self.queues
            .get(&category)
            .map(|q| q.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, category: Category) -> usize {
        self.queues.get(&category).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }

    /// Replace all queues with entries for the given queueable tickets.
    /// Returns the number of entries placed.
    pub fn rebuild<'a>(&self, tickets: impl IntoIterator<Item = &'a Ticket>) -> usize {
        self.queues.clear();
        let mut placed = 0;
        for ticket in tickets.into_iter().filter(|t| t.is_queueable()) {
            if let Some(entry) = QueueEntry::for_ticket(ticket) {
                if self.enqueue(entry) {
                    placed += 1;
                }
            }
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, priority: Priority, offset_min: i64, base: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            ticket_id: id.to_string(),
            category: Category::Electrical,
            priority,
            enqueued_at: base + Duration::minutes(offset_min),
        }
    }

    #[test]
    fn test_priority_then_fifo_order() {
        let router = AssignmentRouter::new();
        let base = Utc::now();
        router.enqueue(entry("low-1", Priority::Low, 0, base));
        router.enqueue(entry("med-1", Priority::Medium, 1, base));
        router.enqueue(entry("high-2", Priority::High, 5, base));
        router.enqueue(entry("high-1", Priority::High, 2, base));
        router.enqueue(entry("emer-1", Priority::Emergency, 9, base));

        let order: Vec<_> = router
            .peek(Category::Electrical)
            .into_iter()
            .map(|e| e.ticket_id)
            .collect();
        assert_eq!(order, vec!["emer-1", "high-1", "high-2", "med-1", "low-1"]);
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let router = AssignmentRouter::new();
        let base = Utc::now();
        assert!(router.enqueue(entry("t-1", Priority::High, 0, base)));
        assert!(!router.enqueue(entry("t-1", Priority::Low, 3, base)));
        assert_eq!(router.len(Category::Electrical), 1);
        assert_eq!(router.peek(Category::Electrical)[0].priority, Priority::High);
    }

    #[test]
    fn test_remove() {
        let router = AssignmentRouter::new();
        router.enqueue(entry("t-1", Priority::High, 0, Utc::now()));
        assert!(router.contains(Category::Electrical, "t-1"));
        assert!(router.remove(Category::Electrical, "t-1").is_some());
        assert!(router.remove(Category::Electrical, "t-1").is_none());
        assert!(router.is_empty());
        assert!(router.peek(Category::Mechanical).is_empty());
    }
}
