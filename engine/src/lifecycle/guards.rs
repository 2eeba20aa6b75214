//! Transition guards, evaluated in a fixed order:
//!
//! 1. edge: the action leaves the current status (reopen window included)
//! 2. authz: the actor's role and scope allow it
//! 3. payload: the action's inputs are well-formed
//!
//! Ticket existence is checked by the engine before any of these run.

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::identity::{Actor, Role};
use crate::ticket::{Ticket, TicketStatus};

use super::action::{Action, TransitionPayload};
use super::machine::{allowed_actions, next_status, required_role};

/// Highest rating a reporter may give
pub const MAX_RATING: u8 = 5;

/// Resolve the target status, or explain why the edge does not exist
pub fn check_edge(
    ticket: &Ticket,
    action: Action,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<TicketStatus> {
    if action == Action::Claim
        && matches!(
            ticket.status,
            TicketStatus::Assigned
                | TicketStatus::InProgress
                | TicketStatus::Completed
                | TicketStatus::Closed
        )
    {
        return Err(EngineError::AlreadyClaimed {
            ticket_id: ticket.ticket_id.clone(),
            holder: ticket.assigned_to.clone().or_else(|| ticket.last_fixer.clone()),
        });
    }

    let Some(to) = next_status(ticket.status, action) else {
        let allowed = allowed_actions(ticket.status);
        let detail = if allowed.is_empty() {
            "ticket is in a terminal status".to_string()
        } else {
            format!(
                "allowed: {}",
                allowed
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        return Err(invalid(ticket, action, Some(detail)));
    };

    if action == Action::Reopen {
        let within = ticket
            .completed_at
            .and_then(|done| done.checked_add_signed(config.reopen_window()))
            .is_some_and(|end| now <= end);
        if !within {
            return Err(invalid(
                ticket,
                action,
                Some(format!(
                    "reopen window of {}h has elapsed",
                    config.reopen_window_hours
                )),
            ));
        }
    }

    if action == Action::Close {
        let due = ticket
            .completed_at
            .and_then(|done| done.checked_add_signed(config.auto_close_grace()))
            .is_some_and(|due_at| now >= due_at);
        if !due {
            return Err(invalid(
                ticket,
                action,
                Some(format!(
                    "auto-close grace of {}h has not elapsed",
                    config.auto_close_grace_hours
                )),
            ));
        }
    }

    Ok(to)
}

/// Role and scope check for `actor` performing `action` on `ticket`
pub fn authorize(ticket: &Ticket, action: Action, actor: &Actor) -> EngineResult<()> {
    if actor.role == Role::Admin {
        return Err(forbidden(ticket, action, actor, "admins have read-only access"));
    }
    if !actor.active {
        return Err(forbidden(ticket, action, actor, "actor is deactivated"));
    }

    let role = required_role(action);
    if actor.role != role {
        return Err(forbidden(
            ticket,
            action,
            actor,
            &format!("requires role {}", role),
        ));
    }

    match action {
        Action::Submit | Action::Rate | Action::Reopen => {
            if actor.user_id != ticket.submitted_by {
                return Err(forbidden(ticket, action, actor, "only the reporter may do this"));
            }
        }
        Action::Review | Action::Approve | Action::Reject => {
            if !actor.covers(&ticket.location) {
                return Err(forbidden(
                    ticket,
                    action,
                    actor,
                    &format!("{} is outside the coordinator's blocks", ticket.location),
                ));
            }
        }
        Action::Claim => {
            if actor.category != Some(ticket.category) {
                return Err(forbidden(
                    ticket,
                    action,
                    actor,
                    &format!("fixer does not work {} tickets", ticket.category),
                ));
            }
            // A reopened ticket may be reserved for its original fixer.
            if let Some(reserved) = &ticket.assigned_to {
                if reserved != &actor.user_id {
                    return Err(forbidden(
                        ticket,
                        action,
                        actor,
                        &format!("reserved for {}", reserved),
                    ));
                }
            }
        }
        Action::StartWork | Action::Complete => {
            if ticket.assigned_to.as_deref() != Some(actor.user_id.as_str()) {
                return Err(forbidden(ticket, action, actor, "only the assignee may do this"));
            }
        }
        Action::Close | Action::Create => {}
    }

    Ok(())
}

/// Action-specific payload checks
pub fn validate_payload(
    action: Action,
    payload: &TransitionPayload,
    config: &EngineConfig,
) -> EngineResult<()> {
    match action {
        Action::Approve => {
            if payload.priority.is_none() {
                return Err(EngineError::validation("priority", "approval requires a priority"));
            }
        }
        Action::Reject => {
            let len = payload
                .reason
                .as_deref()
                .map(|r| r.trim().chars().count())
                .unwrap_or(0);
            if len < config.min_rejection_reason_len {
                return Err(EngineError::validation(
                    "reason",
                    format!(
                        "rejection reason must be at least {} characters",
                        config.min_rejection_reason_len
                    ),
                ));
            }
        }
        Action::Complete => {
            let empty = payload
                .notes
                .as_deref()
                .map(|n| n.trim().is_empty())
                .unwrap_or(true);
            if empty {
                return Err(EngineError::validation("notes", "completion notes are required"));
            }
        }
        Action::Rate => match payload.rating {
            Some(r) if r <= MAX_RATING => {}
            Some(r) => {
                return Err(EngineError::validation(
                    "rating",
                    format!("{} is outside 0..={}", r, MAX_RATING),
                ))
            }
            None => return Err(EngineError::validation("rating", "a rating is required")),
        },
        _ => {}
    }
    Ok(())
}

/// All guards in order; returns the target status
pub fn check(
    ticket: &Ticket,
    action: Action,
    actor: &Actor,
    payload: &TransitionPayload,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<TicketStatus> {
    let to = match check_edge(ticket, action, now, config) {
        Ok(to) => to,
        Err(EngineError::AlreadyClaimed { ticket_id, holder }) => {
            // Only fixers of the trade learn who holds the ticket.
            let may_see = actor.active
                && actor.role == Role::Fixer
                && actor.category == Some(ticket.category);
            return Err(EngineError::AlreadyClaimed {
                ticket_id,
                holder: holder.filter(|_| may_see),
            });
        }
        Err(e) => return Err(e),
    };
    authorize(ticket, action, actor)?;
    validate_payload(action, payload, config)?;
    Ok(to)
}

fn invalid(ticket: &Ticket, action: Action, detail: Option<String>) -> EngineError {
    EngineError::InvalidTransition {
        ticket_id: ticket.ticket_id.clone(),
        from: ticket.status,
        action,
        detail,
    }
}

fn forbidden(ticket: &Ticket, action: Action, actor: &Actor, reason: &str) -> EngineError {
    EngineError::Forbidden {
        ticket_id: ticket.ticket_id.clone(),
        actor: actor.user_id.clone(),
        action,
        reason: reason.to_string(),
    }
}
