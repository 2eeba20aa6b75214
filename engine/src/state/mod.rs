//! Ticket persistence
//!
//! The store is the only source of truth for tickets and their audit trail.
//! Two backends implement [`TicketStore`]:
//!
//! - `memory`: in-process maps, the default for tests and single-node runs
//! - `rocks`: RocksDB with column families (feature `heavy-state`)
//!
//! Every write that changes a ticket also appends exactly one
//! `WorkflowEvent`, in the same atomic step. Writers state the version they
//! read; a mismatch is rejected with `VersionConflict` and nothing is written.

pub mod memory;
#[cfg(feature = "heavy-state")]
pub mod rocks;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::WorkflowEvent;
use crate::ticket::{Category, Location, LocationBucket, Ticket, TicketStatus};

pub use memory::MemoryStore;
#[cfg(feature = "heavy-state")]
pub use rocks::RocksStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict on {ticket_id}: expected {expected}, found {found}")]
    VersionConflict {
        ticket_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to any store backend
pub type SharedTicketStore = Arc<dyn TicketStore>;

/// Durable ticket and audit storage
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Allocate the next per-category, per-year sequence number (starts at 1)
    async fn next_sequence(&self, category: Category, year: i32) -> StoreResult<u64>;

    /// Persist a new ticket together with its creation event
    async fn insert_ticket(&self, ticket: &Ticket, event: &WorkflowEvent) -> StoreResult<()>;

    async fn get_ticket(&self, ticket_id: &str) -> StoreResult<Option<Ticket>>;

    /// Replace a ticket whose stored version is `expected_version` and append
    /// `event`, atomically
    async fn commit_transition(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        event: &WorkflowEvent,
    ) -> StoreResult<()>;

    /// Tickets matching `filter`, oldest first
    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>>;

    /// Audit events for one ticket in commit order
    async fn events_for(&self, ticket_id: &str) -> StoreResult<Vec<WorkflowEvent>>;

    /// Audit events across all tickets with `start <= timestamp <= end`
    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkflowEvent>>;
}

/// Selection criteria for ticket scans. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub category: Option<Category>,
    /// Any of these statuses; empty means any status
    pub statuses: Vec<TicketStatus>,
    pub bucket: Option<LocationBucket>,
    /// Exclude terminal statuses
    pub open_only: bool,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn status(mut self, status: TicketStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn location(mut self, location: &Location) -> Self {
        self.bucket = Some(location.bucket());
        self
    }

    pub fn open(mut self) -> Self {
        self.open_only = true;
        self
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(category) = self.category {
            if ticket.category != category {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&ticket.status) {
            return false;
        }
        if self.open_only && ticket.status.is_terminal() {
            return false;
        }
        if let Some(ref bucket) = self.bucket {
            if &ticket.location.bucket() != bucket {
                return false;
            }
        }
        true
    }
}

/// Oldest first, id as tiebreak
pub(crate) fn sort_tickets(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.ticket_id.cmp(&b.ticket_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketDraft;

    fn ticket(category: Category, location: Location, status: TicketStatus) -> Ticket {
        let draft = TicketDraft::new(category, location, "fan", "noisy");
        let mut t = Ticket::new("ELE-2026-000001".into(), draft, "r".into(), Utc::now());
        t.status = status;
        t
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let t = ticket(Category::Electrical, Location::block(1), TicketStatus::Closed);
        assert!(TicketFilter::new().matches(&t));
    }

    #[test]
    fn test_filter_combinations() {
        let t = ticket(
            Category::Electrical,
            Location::room(7, "101"),
            TicketStatus::Approved,
        );
        assert!(TicketFilter::new()
            .category(Category::Electrical)
            .location(&Location::block(7))
            .open()
            .matches(&t));
        assert!(!TicketFilter::new().category(Category::Mechanical).matches(&t));
        assert!(!TicketFilter::new().location(&Location::block(8)).matches(&t));
        assert!(TicketFilter::new()
            .status(TicketStatus::Approved)
            .status(TicketStatus::Reopened)
            .matches(&t));
        assert!(!TicketFilter::new().status(TicketStatus::Completed).matches(&t));
    }

    #[test]
    fn test_open_excludes_terminal() {
        let t = ticket(Category::Mechanical, Location::block(2), TicketStatus::Rejected);
        assert!(!TicketFilter::new().open().matches(&t));
    }
}
