//! Notification Dispatcher: turns committed workflow events into delivery
//! intents and hands them to the external channel
//!
//! Delivery is fire-and-forget: each intent runs under the configured
//! timeout on a spawned task, and a failure is logged as
//! `NotificationDeliveryFailed`. A transition is never rolled back or
//! delayed because a notification did not go out.
//!
//! | trigger                          | kind                   | recipient               |
//! |----------------------------------|------------------------|-------------------------|
//! | every event                      | `report_status_update` | reporter                |
//! | → `pending_approval`             | `approval_required`    | coordinators of block   |
//! | → `approved`, queued `reopened`  | `new_assignment`       | category fixers         |
//! | → `reopened` reserved for fixer  | `new_assignment`       | that fixer              |
//! | sweeper, deadline approaching    | `sla_warning`          | assignee or fixers, coordinators |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::WorkflowEvent;
use crate::error::SoftWarning;
use crate::sla;
use crate::ticket::{Category, Ticket, TicketId, TicketStatus, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReportStatusUpdate,
    NewAssignment,
    ApprovalRequired,
    SlaWarning,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ReportStatusUpdate => "report_status_update",
            NotificationKind::NewAssignment => "new_assignment",
            NotificationKind::ApprovalRequired => "approval_required",
            NotificationKind::SlaWarning => "sla_warning",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who should hear about it. Group recipients are resolved by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipient {
    User { user_id: UserId },
    /// Coordinators of a block; `None` is the general (free-text) bucket
    Coordinators { block_id: Option<u8> },
    CategoryFixers { category: Category },
}

impl Recipient {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Recipient::User {
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::User { user_id } => write!(f, "user:{}", user_id),
            Recipient::Coordinators {
                block_id: Some(block),
            } => write!(f, "coordinators:block-{}", block),
            Recipient::Coordinators { block_id: None } => write!(f, "coordinators:general"),
            Recipient::CategoryFixers { category } => write!(f, "fixers:{}", category),
        }
    }
}

/// One message to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub ticket_id: TicketId,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Channel rejected message: {0}")]
    Rejected(String),

    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound push/email/in-app channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(
        &self,
        event_type: &str,
        recipient: &Recipient,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError>;
}

/// Channel that only writes to the log; used when no delivery service is wired
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn publish(
        &self,
        event_type: &str,
        recipient: &Recipient,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        info!(
            event_type,
            recipient = %recipient,
            ticket_id = payload["ticket_id"].as_str().unwrap_or_default(),
            "Notification"
        );
        Ok(())
    }
}

/// Intents for a committed transition
pub fn intents_for(event: &WorkflowEvent, ticket: &Ticket) -> Vec<NotificationIntent> {
    let payload = json!({
        "ticket_id": ticket.ticket_id,
        "event_id": event.event_id,
        "action": event.action,
        "actor": event.actor,
        "from_status": event.from_status,
        "to_status": event.to_status,
        "priority": ticket.priority,
        "sla_deadline": ticket.sla_deadline,
        "timestamp": event.timestamp,
    });
    let intent = |kind, recipient| NotificationIntent {
        kind,
        recipient,
        ticket_id: ticket.ticket_id.clone(),
        payload: payload.clone(),
    };

    let mut intents = vec![intent(
        NotificationKind::ReportStatusUpdate,
        Recipient::user(ticket.submitted_by.clone()),
    )];

    match event.to_status {
        TicketStatus::PendingApproval => intents.push(intent(
            NotificationKind::ApprovalRequired,
            Recipient::Coordinators {
                block_id: ticket.location.block_id(),
            },
        )),
        TicketStatus::Approved | TicketStatus::Reopened => {
            let recipient = match &ticket.assigned_to {
                Some(fixer) => Recipient::user(fixer.clone()),
                None => Recipient::CategoryFixers {
                    category: ticket.category,
                },
            };
            intents.push(intent(NotificationKind::NewAssignment, recipient));
        }
        _ => {}
    }

    intents
}

/// Warnings for a ticket whose SLA deadline is near
pub fn sla_warning(ticket: &Ticket, now: DateTime<Utc>) -> Vec<NotificationIntent> {
    let Some(deadline) = ticket.sla_deadline else {
        return Vec::new();
    };
    let payload = json!({
        "ticket_id": ticket.ticket_id,
        "status": ticket.status,
        "priority": ticket.priority,
        "sla_deadline": deadline,
        "minutes_remaining": sla::remaining(deadline, now).num_minutes(),
    });
    let worker = match &ticket.assigned_to {
        Some(fixer) => Recipient::user(fixer.clone()),
        None => Recipient::CategoryFixers {
            category: ticket.category,
        },
    };
    [
        worker,
        Recipient::Coordinators {
            block_id: ticket.location.block_id(),
        },
    ]
    .into_iter()
    .map(|recipient| NotificationIntent {
        kind: NotificationKind::SlaWarning,
        recipient,
        ticket_id: ticket.ticket_id.clone(),
        payload: payload.clone(),
    })
    .collect()
}

pub struct NotificationDispatcher {
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(channel: Arc<dyn NotificationChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Fire intents for a committed transition. The handle resolves to the
    /// delivery failures, if anyone wants to look.
    pub fn on_transition(
        &self,
        event: &WorkflowEvent,
        ticket: &Ticket,
    ) -> JoinHandle<Vec<SoftWarning>> {
        self.dispatch(intents_for(event, ticket))
    }

    /// Deliver intents concurrently on a background task
    pub fn dispatch(&self, intents: Vec<NotificationIntent>) -> JoinHandle<Vec<SoftWarning>> {
        let channel = self.channel.clone();
        let timeout = self.timeout;
        tokio::spawn(async move { deliver_all(channel, intents, timeout).await })
    }
}

async fn deliver_all(
    channel: Arc<dyn NotificationChannel>,
    intents: Vec<NotificationIntent>,
    timeout: Duration,
) -> Vec<SoftWarning> {
    let deliveries = intents.iter().map(|intent| {
        let channel = channel.clone();
        async move {
            let outcome = tokio::time::timeout(
                timeout,
                channel.publish(intent.kind.as_str(), &intent.recipient, &intent.payload),
            )
            .await
            .unwrap_or(Err(DeliveryError::Timeout(timeout)));
            (intent, outcome)
        }
    });

    let mut warnings = Vec::new();
    for (intent, outcome) in join_all(deliveries).await {
        match outcome {
            Ok(()) => debug!(
                ticket_id = %intent.ticket_id,
                kind = %intent.kind,
                recipient = %intent.recipient,
                "Notification delivered"
            ),
            Err(e) => {
                let warning = SoftWarning::NotificationDeliveryFailed {
                    event_type: intent.kind.to_string(),
                    recipient: intent.recipient.to_string(),
                    reason: e.to_string(),
                };
                warn!(ticket_id = %intent.ticket_id, "{}", warning);
                warnings.push(warning);
            }
        }
    }
    warnings
}
