//! Ticket id formatting

use super::types::{Category, TicketId};

/// Format a ticket id from its category, the creation year and a
/// per-category sequence number: `ELE-2026-000042`
pub fn format_ticket_id(category: Category, year: i32, sequence: u64) -> TicketId {
    format!("{}-{:04}-{:06}", category.code(), year, sequence)
}

/// Recover the category prefix from a ticket id
pub fn parse_category(ticket_id: &str) -> Option<Category> {
    let prefix = ticket_id.split('-').next()?;
    Category::all()
        .iter()
        .copied()
        .find(|c| c.code() == prefix)
}
