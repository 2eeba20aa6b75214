//! Field changes that accompany each accepted transition

use chrono::{DateTime, Utc};

use crate::identity::Actor;
use crate::sla;
use crate::ticket::{Ticket, TicketStatus, UserId};

use super::action::{Action, TransitionPayload};

/// Produce the next version of `ticket`.
///
/// Guards must already have passed. `reopen_assignee` is the fixer a
/// reopened ticket is handed back to, when the reopen policy found one.
pub fn apply(
    ticket: &Ticket,
    to: TicketStatus,
    action: Action,
    actor: &Actor,
    payload: &TransitionPayload,
    now: DateTime<Utc>,
    reopen_assignee: Option<UserId>,
) -> Ticket {
    let mut next = ticket.clone();
    next.status = to;
    next.version = ticket.version + 1;

    match action {
        Action::Approve => {
            if let Some(priority) = payload.priority {
                // Deadline is anchored to submission, frozen from here on.
                next.priority = Some(priority);
                next.sla_deadline = Some(sla::deadline(priority, ticket.created_at));
                next.approved_at = Some(now);
            }
        }
        Action::Reject => {
            next.rejection_reason = payload.reason.as_deref().map(|r| r.trim().to_string());
        }
        Action::Claim => {
            next.assigned_to = Some(actor.user_id.clone());
        }
        Action::Complete => {
            next.completion_notes = payload.notes.as_deref().map(|n| n.trim().to_string());
            next.parts_used = payload.parts_used.clone();
            next.completed_at = Some(now);
            next.last_fixer = ticket.assigned_to.clone();
        }
        Action::Rate => {
            next.rating = payload.rating;
        }
        Action::Reopen => {
            next.assigned_to = reopen_assignee;
        }
        Action::Create
        | Action::Submit
        | Action::Review
        | Action::StartWork
        | Action::Close => {}
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::{Category, Location, Priority, TicketDraft};
    use chrono::Duration;

    fn ticket() -> Ticket {
        let draft = TicketDraft::new(Category::Mechanical, Location::block(4), "lift", "stuck");
        Ticket::new("MEC-2026-000003".into(), draft, "r-1".into(), Utc::now())
    }

    #[test]
    fn test_approve_stamps_deadline_from_submission() {
        let mut t = ticket();
        t.status = TicketStatus::PendingApproval;
        let later = t.created_at + Duration::hours(5);

        let next = apply(
            &t,
            TicketStatus::Approved,
            Action::Approve,
            &Actor::coordinator("c-1", vec![4]),
            &TransitionPayload::new().with_priority(Priority::High),
            later,
            None,
        );

        assert_eq!(next.priority, Some(Priority::High));
        assert_eq!(next.sla_deadline, Some(t.created_at + Duration::hours(24)));
        assert_eq!(next.approved_at, Some(later));
        assert_eq!(next.version, t.version + 1);
    }

    #[test]
    fn test_complete_records_fixer_of_record() {
        let mut t = ticket();
        t.status = TicketStatus::InProgress;
        t.assigned_to = Some("f-9".into());

        let next = apply(
            &t,
            TicketStatus::Completed,
            Action::Complete,
            &Actor::fixer("f-9", Category::Mechanical),
            &TransitionPayload::new()
                .with_notes(" replaced relay ")
                .with_parts(vec!["relay".into()]),
            Utc::now(),
            None,
        );

        assert_eq!(next.last_fixer.as_deref(), Some("f-9"));
        assert_eq!(next.completion_notes.as_deref(), Some("replaced relay"));
        assert_eq!(next.parts_used, vec!["relay".to_string()]);
        assert!(next.completed_at.is_some());
    }

    #[test]
    fn test_reopen_resets_assignment() {
        let mut t = ticket();
        t.status = TicketStatus::Completed;
        t.assigned_to = Some("f-9".into());

        let queued = apply(
            &t,
            TicketStatus::Reopened,
            Action::Reopen,
            &Actor::reporter("r-1"),
            &TransitionPayload::new(),
            Utc::now(),
            None,
        );
        assert!(queued.is_queueable());

        let reserved = apply(
            &t,
            TicketStatus::Reopened,
            Action::Reopen,
            &Actor::reporter("r-1"),
            &TransitionPayload::new(),
            Utc::now(),
            Some("f-9".into()),
        );
        assert_eq!(reserved.assigned_to.as_deref(), Some("f-9"));
        assert!(!reserved.is_queueable());
    }
}
