//! Facilities ticket engine
//!
//! This library provides:
//! - The ticket lifecycle state machine with role-gated, audited transitions
//! - SLA deadlines from priority, with a periodic sweep for warnings and auto-close
//! - Advisory duplicate detection at intake
//! - Per-category fixer queues where each ticket can be claimed exactly once
//!
//! # Flow
//!
//! ```text
//! create_ticket ─▶ submitted ─▶ pending_approval ─▶ approved ──▶ queue ─▶ assigned
//!                                      │                                    │
//!                                      ▼                                    ▼
//!                                  rejected              closed ◀─ completed ◀─ in_progress
//!                                                                     │
//!                                                                     ▼
//!                                                                  reopened ─▶ queue
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fixit_engine::{Actor, Category, Location, MemoryStore, StaticDirectory, TicketDraft, TicketEngine};
//!
//! # async fn demo() -> Result<(), fixit_engine::EngineError> {
//! let directory = StaticDirectory::from_actors([Actor::reporter("r-1")]);
//! let engine = TicketEngine::new(Arc::new(MemoryStore::new()), Arc::new(directory));
//! let draft = TicketDraft::new(Category::Electrical, Location::room(12, "G-04"), "fan", "sparks");
//! let intake = engine.create_ticket("r-1", draft).await?;
//! println!("filed {}", intake.ticket_id());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod assignment;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod config;
pub mod duplicate;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod locks;
pub mod notify;
pub mod single_flight;
pub mod sla;
pub mod state;
pub mod sweeper;
pub mod ticket;

// Engine facade
pub use engine::{Intake, SharedTicketEngine, TicketEngine};
pub use sweeper::{SlaSweeper, SweepReport};

// Errors
pub use error::{EngineError, EngineResult, SoftWarning, StructuredError};

// Ticket model and lifecycle
pub use lifecycle::{Action, TransitionPayload};
pub use ticket::{
    Category, Location, Priority, Ticket, TicketDraft, TicketId, TicketStatus, UserId,
};

// Collaborators
pub use assignment::{AssignmentRouter, QueueEntry};
pub use audit::{SlaReport, SlaReportRow, WorkflowEvent};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, ReopenPolicy};
pub use duplicate::{DuplicateCheck, DuplicateDetector};
pub use events::{EventBus, EventFilter, FilteredReceiver};
pub use identity::{Actor, DirectoryError, IdentityDirectory, Role, StaticDirectory};
pub use notify::{
    DeliveryError, LogChannel, NotificationChannel, NotificationDispatcher, NotificationKind,
    Recipient,
};
pub use state::{MemoryStore, SharedTicketStore, StoreError, StoreResult, TicketFilter, TicketStore};
#[cfg(feature = "heavy-state")]
pub use state::RocksStore;
