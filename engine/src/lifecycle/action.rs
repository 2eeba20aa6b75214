//! Lifecycle actions and their payloads

use serde::{Deserialize, Serialize};

use crate::ticket::Priority;

/// Everything an actor (or the engine's own timer) can ask a ticket to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Intake; only ever recorded in the audit trail, never requested
    Create,
    Submit,
    Review,
    Approve,
    Reject,
    Claim,
    StartWork,
    Complete,
    Rate,
    Reopen,
    /// Timer-driven close of an unrated completed ticket
    Close,
}

impl Action {
    pub fn all() -> &'static [Action] {
        &[
            Action::Create,
            Action::Submit,
            Action::Review,
            Action::Approve,
            Action::Reject,
            Action::Claim,
            Action::StartWork,
            Action::Complete,
            Action::Rate,
            Action::Reopen,
            Action::Close,
        ]
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Submit => write!(f, "submit"),
            Action::Review => write!(f, "review"),
            Action::Approve => write!(f, "approve"),
            Action::Reject => write!(f, "reject"),
            Action::Claim => write!(f, "claim"),
            Action::StartWork => write!(f, "start_work"),
            Action::Complete => write!(f, "complete"),
            Action::Rate => write!(f, "rate"),
            Action::Reopen => write!(f, "reopen"),
            Action::Close => write!(f, "close"),
        }
    }
}

/// Action-specific inputs. Which fields are required depends on the action:
///
/// | action   | required            | optional     |
/// |----------|---------------------|--------------|
/// | approve  | `priority`          | `notes`      |
/// | reject   | `reason`            |              |
/// | complete | `notes`             | `parts_used` |
/// | rate     | `rating` (0-5)      | `notes`      |
/// | reopen   |                     | `notes`      |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub parts_used: Vec<String>,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl TransitionPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_parts(mut self, parts: Vec<String>) -> Self {
        self.parts_used = parts;
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Free text worth keeping on the audit event
    pub fn audit_notes(&self) -> Option<String> {
        self.reason.clone().or_else(|| self.notes.clone())
    }
}
