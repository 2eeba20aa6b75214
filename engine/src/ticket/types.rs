//! Core ticket types
//!
//! These types are persisted by the ticket store and represent the durable
//! state of a facilities report across its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Human-readable ticket identifier (e.g. `ELE-2026-000042`)
pub type TicketId = String;

/// Identity of a reporter, coordinator or fixer as issued by the directory
pub type UserId = String;

/// Lowest and highest campus block numbers
pub const MIN_BLOCK_ID: u8 = 1;
pub const MAX_BLOCK_ID: u8 = 100;

/// Maintenance category; decides which fixer queue a ticket lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electrical,
    Mechanical,
}

impl Category {
    /// Three-letter prefix used in ticket ids
    pub fn code(&self) -> &'static str {
        match self {
            Category::Electrical => "ELE",
            Category::Mechanical => "MEC",
        }
    }

    /// All categories, in queue display order
    pub fn all() -> &'static [Category] {
        &[Category::Electrical, Category::Mechanical]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Electrical => write!(f, "electrical"),
            Category::Mechanical => write!(f, "mechanical"),
        }
    }
}

/// Coordinator-assigned urgency
///
/// Variant order is queue order: `Emergency` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Emergency,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Emergency,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Emergency => write!(f, "emergency"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Where the issue is. Exactly one form is ever populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// A numbered campus block, optionally narrowed to a room
    Block {
        block_id: u8,
        room_number: Option<String>,
    },
    /// Anything outside the block grid ("parking lot B", "north gate")
    General { description: String },
}

impl Location {
    pub fn block(block_id: u8) -> Self {
        Location::Block {
            block_id,
            room_number: None,
        }
    }

    pub fn room(block_id: u8, room_number: impl Into<String>) -> Self {
        Location::Block {
            block_id,
            room_number: Some(room_number.into()),
        }
    }

    pub fn general(description: impl Into<String>) -> Self {
        Location::General {
            description: description.into(),
        }
    }

    /// Block number, if this is a block location
    pub fn block_id(&self) -> Option<u8> {
        match self {
            Location::Block { block_id, .. } => Some(*block_id),
            Location::General { .. } => None,
        }
    }

    /// Grouping key used for duplicate candidate pools
    pub fn bucket(&self) -> LocationBucket {
        match self {
            Location::Block { block_id, .. } => LocationBucket::Block(*block_id),
            Location::General { description } => {
                LocationBucket::General(crate::duplicate::normalize(description))
            }
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Block {
                block_id,
                room_number: Some(room),
            } => write!(f, "block {} room {}", block_id, room),
            Location::Block { block_id, .. } => write!(f, "block {}", block_id),
            Location::General { description } => write!(f, "{}", description),
        }
    }
}

/// Normalized location key; two tickets share a bucket when they describe
/// the same block or the same free-text place
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationBucket {
    Block(u8),
    General(String),
}

/// Lifecycle position of a ticket. See `lifecycle::machine` for the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Submitted,
    PendingApproval,
    Approved,
    Rejected,
    Assigned,
    InProgress,
    Completed,
    Closed,
    Reopened,
}

impl TicketStatus {
    /// No further transitions leave a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Rejected | TicketStatus::Closed)
    }

    pub fn all() -> &'static [TicketStatus] {
        &[
            TicketStatus::Submitted,
            TicketStatus::PendingApproval,
            TicketStatus::Approved,
            TicketStatus::Rejected,
            TicketStatus::Assigned,
            TicketStatus::InProgress,
            TicketStatus::Completed,
            TicketStatus::Closed,
            TicketStatus::Reopened,
        ]
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Submitted => write!(f, "submitted"),
            TicketStatus::PendingApproval => write!(f, "pending_approval"),
            TicketStatus::Approved => write!(f, "approved"),
            TicketStatus::Rejected => write!(f, "rejected"),
            TicketStatus::Assigned => write!(f, "assigned"),
            TicketStatus::InProgress => write!(f, "in_progress"),
            TicketStatus::Completed => write!(f, "completed"),
            TicketStatus::Closed => write!(f, "closed"),
            TicketStatus::Reopened => write!(f, "reopened"),
        }
    }
}

/// Intake form as received from the reporter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDraft {
    pub category: Category,
    pub location: Location,
    /// What is broken ("ceiling fan", "distribution board 3")
    pub equipment_description: String,
    /// What is wrong with it
    pub problem_description: String,
    /// Opaque media-storage references; never dereferenced here
    pub photo_refs: Vec<String>,
}

impl TicketDraft {
    pub fn new(
        category: Category,
        location: Location,
        equipment_description: impl Into<String>,
        problem_description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            location,
            equipment_description: equipment_description.into(),
            problem_description: problem_description.into(),
            photo_refs: Vec::new(),
        }
    }

    pub fn with_photos(mut self, refs: Vec<String>) -> Self {
        self.photo_refs = refs;
        self
    }
}

/// A single reported facility issue and its full lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Assigned at creation, never changes
    pub ticket_id: TicketId,

    pub category: Category,

    pub location: Location,

    pub equipment_description: String,

    pub problem_description: String,

    pub photo_refs: Vec<String>,

    /// `None` until a coordinator approves
    pub priority: Option<Priority>,

    pub status: TicketStatus,

    /// Frozen at approval; set iff `priority` is set
    pub sla_deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub submitted_by: UserId,

    /// Current fixer, if any
    pub assigned_to: Option<UserId>,

    /// Earlier open ticket this one probably duplicates
    pub duplicate_of: Option<TicketId>,

    /// Reporter rating (0-5), only ever set from `completed`
    pub rating: Option<u8>,

    pub approved_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Fixer who last completed the work; reopen routing uses it
    pub last_fixer: Option<UserId>,

    pub rejection_reason: Option<String>,

    pub completion_notes: Option<String>,

    pub parts_used: Vec<String>,

    /// Bumped on every committed change; the store rejects stale writers
    pub version: u64,
}

impl Ticket {
    /// Build a freshly submitted ticket from an intake draft
    pub fn new(
        ticket_id: TicketId,
        draft: TicketDraft,
        submitted_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            category: draft.category,
            location: draft.location,
            equipment_description: draft.equipment_description,
            problem_description: draft.problem_description,
            photo_refs: draft.photo_refs,
            priority: None,
            status: TicketStatus::Submitted,
            sla_deadline: None,
            created_at,
            submitted_by,
            assigned_to: None,
            duplicate_of: None,
            rating: None,
            approved_at: None,
            completed_at: None,
            last_fixer: None,
            rejection_reason: None,
            completion_notes: None,
            parts_used: Vec::new(),
            version: 0,
        }
    }

    /// Mark as a probable duplicate of an earlier ticket
    pub fn with_duplicate_of(mut self, original: Option<TicketId>) -> Self {
        self.duplicate_of = original;
        self
    }

    /// Waiting in a category queue: approved or reopened, nobody holding it
    pub fn is_queueable(&self) -> bool {
        matches!(
            self.status,
            TicketStatus::Approved | TicketStatus::Reopened
        ) && self.assigned_to.is_none()
    }

    /// Past its SLA deadline and not yet completed
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.sla_deadline {
            Some(deadline) => {
                now > deadline
                    && !matches!(
                        self.status,
                        TicketStatus::Completed | TicketStatus::Closed | TicketStatus::Rejected
                    )
            }
            None => false,
        }
    }
}
