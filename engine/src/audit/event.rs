//! The audit record written for every accepted transition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::Action;
use crate::ticket::{parse_category, Category, TicketId, TicketStatus, UserId};

/// Unique identifier for a workflow event
pub type EventId = String;

/// One immutable step in a ticket's history.
///
/// Created only by the lifecycle engine. Ticket creation is recorded with
/// `from_status = None` and action `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_id: EventId,
    pub ticket_id: TicketId,
    pub from_status: Option<TicketStatus>,
    pub to_status: TicketStatus,
    /// Actor id, or `system` for timer-driven transitions
    pub actor: UserId,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl WorkflowEvent {
    pub fn new(
        ticket_id: impl Into<TicketId>,
        from_status: Option<TicketStatus>,
        to_status: TicketStatus,
        actor: impl Into<UserId>,
        action: Action,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            ticket_id: ticket_id.into(),
            from_status,
            to_status,
            actor: actor.into(),
            action,
            timestamp,
            notes: None,
        }
    }

    /// Creation record for a freshly submitted ticket
    pub fn created(
        ticket_id: impl Into<TicketId>,
        reporter: impl Into<UserId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            ticket_id,
            None,
            TicketStatus::Submitted,
            reporter,
            Action::Create,
            timestamp,
        )
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn is_creation(&self) -> bool {
        self.from_status.is_none()
    }

    /// Category, recovered from the ticket id prefix
    pub fn category(&self) -> Option<Category> {
        parse_category(&self.ticket_id)
    }

    /// Sort key for stable chronological ordering
    pub(crate) fn timestamp_nanos(&self) -> i64 {
        self.timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_event() {
        let e = WorkflowEvent::created("MEC-2026-000010", "r-1", Utc::now());
        assert!(e.is_creation());
        assert_eq!(e.action, Action::Create);
        assert_eq!(e.to_status, TicketStatus::Submitted);
        assert_eq!(e.category(), Some(Category::Mechanical));
    }

    #[test]
    fn test_event_ids_are_unique() {
        let now = Utc::now();
        let a = WorkflowEvent::created("ELE-2026-000001", "r-1", now);
        let b = WorkflowEvent::created("ELE-2026-000001", "r-1", now);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_json_shape() {
        let e = WorkflowEvent::new(
            "ELE-2026-000001",
            Some(TicketStatus::Completed),
            TicketStatus::Closed,
            "system",
            Action::Close,
            Utc::now(),
        );
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["from_status"], "completed");
        assert_eq!(json["action"], "close");
        assert_eq!(json["actor"], "system");
    }
}
