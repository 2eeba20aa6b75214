//! Lifecycle state machine
//!
//! - `action`: what can be asked of a ticket, and with which inputs
//! - `machine`: the transition table
//! - `guards`: edge, role and payload checks
//! - `effects`: field updates per accepted transition

pub mod action;
pub mod effects;
pub mod guards;
pub mod machine;

pub use action::{Action, TransitionPayload};
pub use machine::{allowed_actions, is_legal_transition, next_status, required_role};
