//! Workflow audit trail
//!
//! Append-only: events are written by the store in the same atomic step as
//! the ticket change they describe, and are never updated or deleted.

pub mod event;
pub mod trail;

pub use event::{EventId, WorkflowEvent};
pub use trail::{AuditTrail, SlaReport, SlaReportRow};
