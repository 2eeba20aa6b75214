//! Read-through ticket cache
//!
//! Serves `get_ticket` reads. Every committed transition replaces the
//! cached entry with the committed version, and a failed commit drops it;
//! the store stays authoritative and transitions always read from it
//! directly. Entries only ever move to a higher `version`.

use dashmap::DashMap;
use tracing::trace;

use crate::state::{StoreResult, TicketStore};
use crate::ticket::{Ticket, TicketId};

#[derive(Default)]
pub struct TicketCache {
    entries: DashMap<TicketId, Ticket>,
}

impl TicketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached ticket, loading from `store` on a miss
    pub async fn get_or_load(
        &self,
        ticket_id: &str,
        store: &dyn TicketStore,
    ) -> StoreResult<Option<Ticket>> {
        if let Some(hit) = self.entries.get(ticket_id) {
            trace!(ticket_id, "Ticket cache hit");
            return Ok(Some(hit.clone()));
        }

        let loaded = store.get_ticket(ticket_id).await?;
        if let Some(ref ticket) = loaded {
            self.refresh(ticket);
        }
        Ok(loaded)
    }

    /// Store `ticket` unless a newer version is already cached
    pub fn refresh(&self, ticket: &Ticket) {
        self.entries
            .entry(ticket.ticket_id.clone())
            .and_modify(|cached| {
                if ticket.version > cached.version {
                    *cached = ticket.clone();
                }
            })
            .or_insert_with(|| ticket.clone());
    }

    pub fn invalidate(&self, ticket_id: &str) {
        self.entries.remove(ticket_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
