//! SLA Calculator: priority to deadline
//!
//! ```text
//! emergency   2h
//! high       24h
//! medium     72h
//! low       168h
//! ```
//!
//! Pure and deterministic. The lifecycle calls it exactly once per ticket,
//! at approval, and freezes the result on the ticket.

use chrono::{DateTime, Duration, Utc};

use crate::ticket::Priority;

/// Time allowed to resolve a ticket of the given priority
pub fn allowance(priority: Priority) -> Duration {
    match priority {
        Priority::Emergency => Duration::hours(2),
        Priority::High => Duration::hours(24),
        Priority::Medium => Duration::hours(72),
        Priority::Low => Duration::hours(168),
    }
}

/// Deadline for a ticket submitted at `submitted_at`
pub fn deadline(priority: Priority, submitted_at: DateTime<Utc>) -> DateTime<Utc> {
    submitted_at + allowance(priority)
}

/// Time left until the deadline (negative once breached)
pub fn remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    deadline - now
}
