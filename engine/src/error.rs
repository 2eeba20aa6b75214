//! Engine error taxonomy
//!
//! Hard errors abort the operation and leave the ticket untouched. Soft
//! warnings never abort; they ride along on the response and are logged.
//!
//! `StructuredError` is the rendering handed to the outer API layer, which
//! maps `code` to a transport status (404/403/409/422/503).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::identity::DirectoryError;
use crate::lifecycle::Action;
use crate::state::StoreError;
use crate::ticket::{TicketId, TicketStatus, UserId};

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Hard errors: returned synchronously, no partial state change
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    #[error("Actor not found: {0}")]
    ActorNotFound(UserId),

    #[error("Cannot {action} ticket {ticket_id} from status {from}{}", paren_suffix(.detail))]
    InvalidTransition {
        ticket_id: TicketId,
        from: TicketStatus,
        action: Action,
        detail: Option<String>,
    },

    #[error("Actor {actor} may not {action} ticket {ticket_id}: {reason}")]
    Forbidden {
        ticket_id: TicketId,
        actor: UserId,
        action: Action,
        reason: String,
    },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Ticket {ticket_id} was already claimed{}", by_suffix(.holder))]
    AlreadyClaimed {
        ticket_id: TicketId,
        holder: Option<UserId>,
    },

    #[error("Identity service error: {0}")]
    Identity(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn paren_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

fn by_suffix(holder: &Option<UserId>) -> String {
    holder
        .as_deref()
        .map(|h| format!(" by {}", h))
        .unwrap_or_default()
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TicketNotFound(_) | EngineError::ActorNotFound(_) => "NOT_FOUND",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::Forbidden { .. } => "FORBIDDEN",
            EngineError::Validation { .. } => "VALIDATION_FAILED",
            EngineError::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            EngineError::Identity(_) => "IDENTITY_UNAVAILABLE",
            EngineError::Store(StoreError::VersionConflict { .. }) => "CONFLICT",
            EngineError::Store(_) => "STORE_ERROR",
        }
    }

    /// Whether the caller may retry the identical request.
    ///
    /// A failed commit leaves the ticket in its prior state, so store and
    /// identity outages are safe to retry with the same action and payload.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Identity(_) | EngineError::Store(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::TicketNotFound(_) | EngineError::ActorNotFound(_)
        )
    }

    /// Render for API consumers
    pub fn to_structured(&self) -> StructuredError {
        let recovery = match self {
            EngineError::TicketNotFound(_) => "Check the ticket id",
            EngineError::ActorNotFound(_) => "Re-authenticate and retry",
            EngineError::InvalidTransition { .. } => {
                "Refresh the ticket and pick one of its allowed actions"
            }
            EngineError::Forbidden { .. } => "Ask an actor responsible for this ticket",
            EngineError::Validation { .. } => "Correct the payload and resubmit",
            EngineError::AlreadyClaimed { .. } => "Pick another ticket from the queue",
            EngineError::Identity(_) | EngineError::Store(_) => {
                "Retry the same request; the ticket was not changed"
            }
        };

        let mut err = StructuredError::new(self.code(), self.to_string(), recovery);
        match self {
            EngineError::TicketNotFound(id)
            | EngineError::InvalidTransition { ticket_id: id, .. }
            | EngineError::Forbidden { ticket_id: id, .. }
            | EngineError::AlreadyClaimed { ticket_id: id, .. } => {
                err = err.with_context("ticket_id", id.clone());
            }
            EngineError::Validation { field, .. } => {
                err = err.with_context("field", field.clone());
            }
            _ => {}
        }
        if self.is_retryable() {
            err = err.retryable();
        }
        err
    }
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::UnknownActor(id) => EngineError::ActorNotFound(id),
            DirectoryError::Unavailable(msg) => EngineError::Identity(msg),
        }
    }
}

/// Failures in non-critical dependencies, logged and surfaced as advisories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftWarning {
    /// Duplicate status is unknown; the ticket was still created
    DuplicateDetectionDegraded { reason: String },
    /// A notification intent did not reach its channel
    NotificationDeliveryFailed {
        event_type: String,
        recipient: String,
        reason: String,
    },
}

impl std::fmt::Display for SoftWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoftWarning::DuplicateDetectionDegraded { reason } => {
                write!(f, "duplicate check degraded: {}", reason)
            }
            SoftWarning::NotificationDeliveryFailed {
                event_type,
                recipient,
                reason,
            } => write!(
                f,
                "{} notification to {} failed: {}",
                event_type, recipient, reason
            ),
        }
    }
}

/// Structured error response for API consumers
///
/// ```json
/// {
///   "code": "ALREADY_CLAIMED",
///   "message": "Ticket ELE-2026-000042 was already claimed by f-7",
///   "recovery_action": "Pick another ticket from the queue",
///   "context": { "ticket_id": "ELE-2026-000042" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// What the caller should do next
    pub recovery_action: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Whether the identical request may be retried
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}
