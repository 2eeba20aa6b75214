//! Column family layout for the RocksDB ticket store
//!
//! Keys are plain UTF-8 so the database can be inspected with `ldb`.

/// Column family for ticket rows (bincode)
pub const CF_TICKETS: &str = "tickets";

/// Column family for workflow events (JSON)
pub const CF_EVENTS: &str = "events";

/// Column family for counters
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_TICKETS, CF_EVENTS, CF_META];

/// Key builders
pub mod keys {
    use crate::ticket::Category;

    pub const TICKET_PREFIX: &str = "tkt:";
    pub const TIMELINE_PREFIX: &str = "evt:";
    pub const HISTORY_PREFIX: &str = "hist:";

    pub fn ticket(ticket_id: &str) -> String {
        format!("{}{}", TICKET_PREFIX, ticket_id)
    }

    /// Global timeline key; sorts by time
    pub fn timeline(timestamp_nanos: i64, event_id: &str) -> String {
        format!("{}{:020}:{}", TIMELINE_PREFIX, timestamp_nanos, event_id)
    }

    /// Per-ticket history key; sorts by commit order within a ticket
    pub fn history(ticket_id: &str, seq: u64) -> String {
        format!("{}{}:{:010}", HISTORY_PREFIX, ticket_id, seq)
    }

    pub fn history_prefix(ticket_id: &str) -> String {
        format!("{}{}:", HISTORY_PREFIX, ticket_id)
    }

    pub fn sequence(category: Category, year: i32) -> String {
        format!("seq:{}:{}", category.code(), year)
    }

    /// Parse the timestamp out of a timeline key
    pub fn parse_timeline_timestamp(key: &str) -> Option<i64> {
        let rest = key.strip_prefix(TIMELINE_PREFIX)?;
        rest.split(':').next()?.parse().ok()
    }
}
