//! Ticket state machine: the one authoritative transition table.
//!
//! Clients never decide legality themselves; they ask this table (through
//! `TicketEngine::transition`) and render the result.
//!
//! ```text
//! Submitted ──submit/review──▶ PendingApproval ──approve──▶ Approved ──claim──▶ Assigned
//!                                   │                                             │
//!                                   └──reject──▶ Rejected (terminal)       start_work
//!                                                                                 ▼
//! Reopened ──claim──▶ Assigned                                               InProgress
//!    ▲                                                                            │
//!    └──reopen── Completed ◀──────────────────complete────────────────────────────┘
//!                    │
//!                    └──rate / close──▶ Closed (terminal)
//! ```

use crate::identity::Role;
use crate::ticket::TicketStatus;

use super::action::Action;

/// Target status for `action` taken from `from`, or `None` if that edge
/// does not exist
pub fn next_status(from: TicketStatus, action: Action) -> Option<TicketStatus> {
    use Action as A;
    use TicketStatus as S;

    match (from, action) {
        (S::Submitted, A::Submit | A::Review) => Some(S::PendingApproval),
        (S::PendingApproval, A::Approve) => Some(S::Approved),
        (S::PendingApproval, A::Reject) => Some(S::Rejected),
        (S::Approved | S::Reopened, A::Claim) => Some(S::Assigned),
        (S::Assigned, A::StartWork) => Some(S::InProgress),
        (S::InProgress, A::Complete) => Some(S::Completed),
        (S::Completed, A::Rate | A::Close) => Some(S::Closed),
        (S::Completed, A::Reopen) => Some(S::Reopened),
        _ => None,
    }
}

/// Whether `from → to` is an edge of the graph (under any action)
pub fn is_legal_transition(from: TicketStatus, to: TicketStatus) -> bool {
    Action::all()
        .iter()
        .any(|a| next_status(from, *a) == Some(to))
}

/// Actions with an outgoing edge from `from`
pub fn allowed_actions(from: TicketStatus) -> Vec<Action> {
    Action::all()
        .iter()
        .copied()
        .filter(|a| next_status(from, *a).is_some())
        .collect()
}

/// Role that may perform an action
pub fn required_role(action: Action) -> Role {
    match action {
        Action::Create | Action::Submit | Action::Rate | Action::Reopen => Role::Reporter,
        Action::Review | Action::Approve | Action::Reject => Role::Coordinator,
        Action::Claim | Action::StartWork | Action::Complete => Role::Fixer,
        Action::Close => Role::System,
    }
}
