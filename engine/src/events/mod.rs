//! In-process fan-out of committed workflow events
//!
//! ```text
//! ┌──────────────┐  commit   ┌──────────────┐     ┌──────────────┐
//! │ TicketEngine │──────────▶│  Event Bus   │────▶│  Subscribers │
//! │ (transition) │           │  (broadcast) │     │   (recv)     │
//! └──────┬───────┘           └──────────────┘     └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │ TicketStore  │  audit trail, durable
//! └──────────────┘
//! ```

pub mod bus;

pub use bus::{
    EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver,
};
