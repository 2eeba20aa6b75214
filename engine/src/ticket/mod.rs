//! Ticket data model
//!
//! - `types`: the `Ticket` record and its enums (category, priority, status, location)
//! - `id`: human-readable id formatting

pub mod id;
pub mod types;

pub use id::{format_ticket_id, parse_category};
pub use types::{
    Category, Location, LocationBucket, Priority, Ticket, TicketDraft, TicketId, TicketStatus,
    UserId, MAX_BLOCK_ID, MIN_BLOCK_ID,
};
