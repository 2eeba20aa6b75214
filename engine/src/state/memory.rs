//! In-process ticket store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{sort_tickets, StoreError, StoreResult, TicketFilter, TicketStore};
use crate::audit::WorkflowEvent;
use crate::ticket::{Category, Ticket, TicketId};

#[derive(Default)]
struct Inner {
    tickets: HashMap<TicketId, Ticket>,
    /// Commit order
    events: Vec<WorkflowEvent>,
    sequences: HashMap<(Category, i32), u64>,
}

/// Map-backed store; a single write lock makes each commit atomic
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ticket_count(&self) -> usize {
        self.inner.read().await.tickets.len()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn next_sequence(&self, category: Category, year: i32) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let seq = inner.sequences.entry((category, year)).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn insert_ticket(&self, ticket: &Ticket, event: &WorkflowEvent) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.tickets.contains_key(&ticket.ticket_id) {
            return Err(StoreError::AlreadyExists(ticket.ticket_id.clone()));
        }
        inner
            .tickets
            .insert(ticket.ticket_id.clone(), ticket.clone());
        inner.events.push(event.clone());
        Ok(())
    }

    async fn get_ticket(&self, ticket_id: &str) -> StoreResult<Option<Ticket>> {
        Ok(self.inner.read().await.tickets.get(ticket_id).cloned())
    }

    async fn commit_transition(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .tickets
            .get_mut(&ticket.ticket_id)
            .ok_or_else(|| StoreError::NotFound(ticket.ticket_id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                ticket_id: ticket.ticket_id.clone(),
                expected: expected_version,
                found: stored.version,
            });
        }
        *stored = ticket.clone();
        inner.events.push(event.clone());
        Ok(())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let inner = self.inner.read().await;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        sort_tickets(&mut tickets);
        Ok(tickets)
    }

    async fn events_for(&self, ticket_id: &str) -> StoreResult<Vec<WorkflowEvent>> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        let mut events: Vec<WorkflowEvent> = self
            .inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Action;
    use crate::ticket::{Location, TicketDraft, TicketStatus};
    use chrono::Duration;

    fn ticket(id: &str) -> Ticket {
        let draft = TicketDraft::new(Category::Electrical, Location::block(5), "socket", "dead");
        Ticket::new(id.into(), draft, "r-1".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_sequences_are_per_category_and_year() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sequence(Category::Electrical, 2026).await.unwrap(), 1);
        assert_eq!(store.next_sequence(Category::Electrical, 2026).await.unwrap(), 2);
        assert_eq!(store.next_sequence(Category::Mechanical, 2026).await.unwrap(), 1);
        assert_eq!(store.next_sequence(Category::Electrical, 2027).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_is_unique() {
        let store = MemoryStore::new();
        let t = ticket("ELE-2026-000001");
        let e = WorkflowEvent::created(&t.ticket_id, "r-1", t.created_at);
        store.insert_ticket(&t, &e).await.unwrap();
        let err = store.insert_ticket(&t, &e).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_commit_is_rejected_without_side_effects() {
        let store = MemoryStore::new();
        let t = ticket("ELE-2026-000001");
        store
            .insert_ticket(&t, &WorkflowEvent::created(&t.ticket_id, "r-1", t.created_at))
            .await
            .unwrap();

        let mut next = t.clone();
        next.status = TicketStatus::PendingApproval;
        next.version = 1;
        let event = WorkflowEvent::new(
            &t.ticket_id,
            Some(TicketStatus::Submitted),
            TicketStatus::PendingApproval,
            "r-1",
            Action::Submit,
            Utc::now(),
        );
        store.commit_transition(&next, 0, &event).await.unwrap();

        let err = store.commit_transition(&next, 0, &event).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { found: 1, .. }));
        assert_eq!(store.events_for(&t.ticket_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_events_between() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for (i, id) in ["ELE-2026-000001", "ELE-2026-000002"].iter().enumerate() {
            let t = ticket(id);
            let e = WorkflowEvent::created(*id, "r-1", base + Duration::hours(i as i64));
            store.insert_ticket(&t, &e).await.unwrap();
        }
        let window = store
            .events_between(base + Duration::minutes(30), base + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].ticket_id, "ELE-2026-000002");
    }
}
