//! Ticket engine: the single entry point for intake and transitions
//!
//! ```text
//! create_ticket ─▶ validate ─▶ duplicate check (soft, time-bounded) ─▶ insert + creation event
//!
//! transition ─▶ exists ─▶ resolve actor ─▶ lock(ticket) ─▶ re-read ─▶ guards
//!                                                              │
//!          bus + notifications ◀─ router ◀─ cache ◀─ commit(version check + event)
//! ```
//!
//! Every status change, including the sweeper's auto-close, goes through
//! `transition_as`, so there is exactly one place that writes tickets.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::assignment::{AssignmentRouter, QueueEntry};
use crate::audit::{AuditTrail, SlaReport, WorkflowEvent};
use crate::cache::TicketCache;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{EngineConfig, ReopenPolicy};
use crate::duplicate::{DuplicateCheck, DuplicateDetector};
use crate::error::{EngineError, EngineResult, SoftWarning};
use crate::events::{EventBus, EventFilter, FilteredReceiver};
use crate::identity::{Actor, IdentityDirectory, Role};
use crate::lifecycle::{effects, guards, Action, TransitionPayload};
use crate::locks::TicketLocks;
use crate::notify::{LogChannel, NotificationChannel, NotificationDispatcher};
use crate::state::{SharedTicketStore, TicketFilter};
use crate::ticket::{
    format_ticket_id, Category, Location, Ticket, TicketDraft, TicketStatus, UserId,
    MAX_BLOCK_ID, MIN_BLOCK_ID,
};

/// Result of a submission: the ticket always exists, advisories explain
/// anything that ran degraded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intake {
    pub ticket: Ticket,
    pub duplicate: DuplicateCheck,
    pub advisories: Vec<SoftWarning>,
}

impl Intake {
    pub fn ticket_id(&self) -> &str {
        &self.ticket.ticket_id
    }

    pub fn is_degraded(&self) -> bool {
        !self.advisories.is_empty()
    }
}

/// Shared reference to the engine
pub type SharedTicketEngine = Arc<TicketEngine>;

pub struct TicketEngine {
    store: SharedTicketStore,
    directory: Arc<dyn IdentityDirectory>,
    channel: Arc<dyn NotificationChannel>,
    dispatcher: NotificationDispatcher,
    router: AssignmentRouter,
    bus: EventBus,
    cache: TicketCache,
    locks: TicketLocks,
    detector: DuplicateDetector,
    audit: AuditTrail,
    clock: SharedClock,
    config: EngineConfig,
}

impl TicketEngine {
    /// Engine with default config, the wall clock and a logging channel
    pub fn new(store: SharedTicketStore, directory: Arc<dyn IdentityDirectory>) -> Self {
        let config = EngineConfig::default();
        let channel: Arc<dyn NotificationChannel> = Arc::new(LogChannel);
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            directory,
            dispatcher: NotificationDispatcher::new(channel.clone(), config.notification_timeout()),
            channel,
            router: AssignmentRouter::new(),
            bus: EventBus::with_capacity(config.event_bus_capacity),
            cache: TicketCache::new(),
            locks: TicketLocks::new(),
            detector: DuplicateDetector::new(config.duplicate_threshold),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.dispatcher =
            NotificationDispatcher::new(self.channel.clone(), config.notification_timeout());
        self.bus = EventBus::with_capacity(config.event_bus_capacity);
        self.detector = DuplicateDetector::new(config.duplicate_threshold);
        self.config = config;
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.dispatcher =
            NotificationDispatcher::new(channel.clone(), self.config.notification_timeout());
        self.channel = channel;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn shared(self) -> SharedTicketEngine {
        Arc::new(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn store(&self) -> &SharedTicketStore {
        &self.store
    }

    pub(crate) fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub(crate) fn locks(&self) -> &TicketLocks {
        &self.locks
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// File a new report. Duplicate detection is advisory: it can flag the
    /// ticket, but never prevents it from being created.
    pub async fn create_ticket(&self, reporter_id: &str, draft: TicketDraft) -> EngineResult<Intake> {
        let reporter = self.directory.resolve(reporter_id).await?;
        if reporter.role != Role::Reporter || !reporter.active {
            return Err(EngineError::Forbidden {
                ticket_id: "(new)".into(),
                actor: reporter.user_id,
                action: Action::Create,
                reason: "only active reporters may file tickets".into(),
            });
        }
        validate_draft(&draft)?;

        let (duplicate, degraded) = self.check_duplicate(&draft).await;
        let mut advisories = Vec::new();
        if let Some(warning) = degraded {
            advisories.push(warning);
        }

        let now = self.clock.now();
        let sequence = self.store.next_sequence(draft.category, now.year()).await?;
        let ticket_id = format_ticket_id(draft.category, now.year(), sequence);
        let original = duplicate
            .is_duplicate
            .then(|| duplicate.candidate_ticket_id.clone())
            .flatten();
        let ticket = Ticket::new(ticket_id, draft, reporter.user_id.clone(), now)
            .with_duplicate_of(original);
        let event = WorkflowEvent::created(&ticket.ticket_id, &reporter.user_id, now);

        self.store.insert_ticket(&ticket, &event).await?;
        self.cache.refresh(&ticket);

        info!(
            ticket_id = %ticket.ticket_id,
            category = %ticket.category,
            location = %ticket.location,
            duplicate_of = ticket.duplicate_of.as_deref().unwrap_or("-"),
            "Ticket created"
        );
        self.publish(event, &ticket);

        Ok(Intake {
            ticket,
            duplicate,
            advisories,
        })
    }

    async fn check_duplicate(&self, draft: &TicketDraft) -> (DuplicateCheck, Option<SoftWarning>) {
        let store = self.store.clone();
        let detector = self.detector.clone();
        let category = draft.category;
        let location = draft.location.clone();
        let equipment = draft.equipment_description.clone();

        let work = async move {
            let filter = TicketFilter::new().category(category).location(&location).open();
            let pool = store.list_tickets(&filter).await.map_err(|e| e.to_string())?;
            tokio::task::spawn_blocking(move || detector.check(category, &location, &equipment, &pool))
                .await
                .map_err(|e| e.to_string())?
                .map_err(|e| e.to_string())
        };

        let timeout = self.config.duplicate_check_timeout();
        let reason = match tokio::time::timeout(timeout, work).await {
            Ok(Ok(check)) => {
                debug!(
                    is_duplicate = check.is_duplicate,
                    score = check.similarity_score,
                    "Duplicate check complete"
                );
                return (check, None);
            }
            Ok(Err(reason)) => reason,
            Err(_) => format!("timed out after {:?}", timeout),
        };

        let warning = SoftWarning::DuplicateDetectionDegraded { reason };
        warn!("{}", warning);
        (DuplicateCheck::degraded(), Some(warning))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Apply `action` to a ticket on behalf of `actor_id`
    pub async fn transition(
        &self,
        ticket_id: &str,
        action: Action,
        actor_id: &str,
        payload: TransitionPayload,
    ) -> EngineResult<Ticket> {
        if self.store.get_ticket(ticket_id).await?.is_none() {
            return Err(EngineError::TicketNotFound(ticket_id.to_string()));
        }
        let actor = self.directory.resolve(actor_id).await?;
        self.transition_as(ticket_id, action, &actor, payload).await
    }

    /// Take a queued ticket. Among concurrent claimers exactly one wins;
    /// the rest get `AlreadyClaimed`.
    pub async fn claim(&self, ticket_id: &str, fixer_id: &str) -> EngineResult<Ticket> {
        self.transition(ticket_id, Action::Claim, fixer_id, TransitionPayload::new())
            .await
    }

    /// Transition with an already-resolved actor
    pub(crate) async fn transition_as(
        &self,
        ticket_id: &str,
        action: Action,
        actor: &Actor,
        payload: TransitionPayload,
    ) -> EngineResult<Ticket> {
        let guard = self.locks.lock(ticket_id).await;

        let current = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| EngineError::TicketNotFound(ticket_id.to_string()))?;
        let now = self.clock.now();

        let to = match guards::check(&current, action, actor, &payload, now, &self.config) {
            Ok(to) => to,
            Err(e) => {
                debug!(ticket_id, %action, actor = %actor.user_id, error = %e, "Transition refused");
                return Err(e);
            }
        };

        let reopen_assignee = if action == Action::Reopen {
            self.reopen_assignee(&current).await
        } else {
            None
        };

        let next = effects::apply(&current, to, action, actor, &payload, now, reopen_assignee);
        let event = WorkflowEvent::new(
            ticket_id,
            Some(current.status),
            to,
            actor.user_id.clone(),
            action,
            now,
        )
        .with_notes(payload.audit_notes());

        if let Err(e) = self
            .store
            .commit_transition(&next, current.version, &event)
            .await
        {
            self.cache.invalidate(ticket_id);
            warn!(ticket_id, %action, error = %e, "Transition commit failed");
            return Err(e.into());
        }
        self.cache.refresh(&next);
        self.route(&next);
        drop(guard);

        info!(
            ticket_id,
            %action,
            actor = %actor.user_id,
            from = %current.status,
            to = %to,
            "Ticket transitioned"
        );
        self.publish(event, &next);
        Ok(next)
    }

    /// Fixer a reopened ticket goes back to, under the configured policy
    async fn reopen_assignee(&self, ticket: &Ticket) -> Option<UserId> {
        if self.config.reopen_policy == ReopenPolicy::CategoryQueue {
            return None;
        }
        let fixer_id = ticket.last_fixer.as_deref()?;
        match self.directory.resolve(fixer_id).await {
            Ok(fixer)
                if fixer.active
                    && fixer.role == Role::Fixer
                    && fixer.category == Some(ticket.category) =>
            {
                Some(fixer.user_id)
            }
            Ok(_) => {
                debug!(ticket_id = %ticket.ticket_id, fixer_id, "Original fixer unavailable, queueing");
                None
            }
            Err(e) => {
                warn!(ticket_id = %ticket.ticket_id, fixer_id, error = %e, "Could not resolve original fixer, queueing");
                None
            }
        }
    }

    /// Keep the category queue in step with a committed ticket
    fn route(&self, ticket: &Ticket) {
        if ticket.is_queueable() {
            if let Some(entry) = QueueEntry::for_ticket(ticket) {
                self.router.enqueue(entry);
            }
        } else {
            self.router.remove(ticket.category, &ticket.ticket_id);
        }
    }

    fn publish(&self, event: WorkflowEvent, ticket: &Ticket) {
        // Delivery outcome is logged by the dispatcher; nobody waits on it.
        drop(self.dispatcher.on_transition(&event, ticket));
        self.bus.publish(event);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_ticket(&self, ticket_id: &str) -> EngineResult<Ticket> {
        self.cache
            .get_or_load(ticket_id, self.store.as_ref())
            .await?
            .ok_or_else(|| EngineError::TicketNotFound(ticket_id.to_string()))
    }

    /// Ordered snapshot of a category's claimable tickets
    pub fn get_queue(&self, category: Category) -> Vec<QueueEntry> {
        self.router.peek(category)
    }

    /// Actions `actor_id` could take on the ticket right now
    pub async fn available_actions(
        &self,
        ticket_id: &str,
        actor_id: &str,
    ) -> EngineResult<Vec<Action>> {
        let ticket = self.get_ticket(ticket_id).await?;
        let actor = self.directory.resolve(actor_id).await?;
        let now = self.clock.now();
        Ok(crate::lifecycle::allowed_actions(ticket.status)
            .into_iter()
            .filter(|a| {
                guards::check_edge(&ticket, *a, now, &self.config).is_ok()
                    && guards::authorize(&ticket, *a, &actor).is_ok()
            })
            .collect())
    }

    /// Audit events for a ticket, creation first
    pub async fn ticket_history(&self, ticket_id: &str) -> EngineResult<Vec<WorkflowEvent>> {
        self.get_ticket(ticket_id).await?;
        Ok(self.audit.history(ticket_id).await?)
    }

    pub async fn sla_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<SlaReport> {
        Ok(self.audit.sla_report(from, to, self.clock.now()).await?)
    }

    /// Rebuild every category queue from the store; returns entries placed
    pub async fn rebuild_queues(&self) -> EngineResult<usize> {
        let filter = TicketFilter::new()
            .status(TicketStatus::Approved)
            .status(TicketStatus::Reopened);
        let tickets = self.store.list_tickets(&filter).await?;
        let placed = self.router.rebuild(tickets.iter());
        info!(placed, scanned = tickets.len(), "Queues rebuilt");
        Ok(placed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.bus.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        self.bus.subscribe_filtered(filter)
    }
}

fn validate_draft(draft: &TicketDraft) -> EngineResult<()> {
    match &draft.location {
        Location::Block { block_id, .. } => {
            if !(MIN_BLOCK_ID..=MAX_BLOCK_ID).contains(block_id) {
                return Err(EngineError::validation(
                    "location.block_id",
                    format!("{} is outside {}..={}", block_id, MIN_BLOCK_ID, MAX_BLOCK_ID),
                ));
            }
        }
        Location::General { description } => {
            if description.trim().is_empty() {
                return Err(EngineError::validation(
                    "location.description",
                    "a general location needs a description",
                ));
            }
        }
    }
    if draft.equipment_description.trim().is_empty() {
        return Err(EngineError::validation(
            "equipment_description",
            "must not be empty",
        ));
    }
    if draft.problem_description.trim().is_empty() {
        return Err(EngineError::validation("problem_description", "must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_draft() {
        let ok = TicketDraft::new(Category::Electrical, Location::block(100), "fan", "broken");
        assert!(validate_draft(&ok).is_ok());

        let bad_block = TicketDraft::new(Category::Electrical, Location::block(0), "fan", "broken");
        assert!(matches!(
            validate_draft(&bad_block),
            Err(EngineError::Validation { ref field, .. }) if field == "location.block_id"
        ));

        let blank = TicketDraft::new(Category::Mechanical, Location::general("  "), "pump", "x");
        assert!(validate_draft(&blank).is_err());

        let no_problem = TicketDraft::new(Category::Mechanical, Location::block(3), "pump", " ");
        assert!(validate_draft(&no_problem).is_err());
    }

    #[test]
    fn test_intake_degraded_flag() {
        let draft = TicketDraft::new(Category::Electrical, Location::block(1), "fan", "broken");
        let mut intake = Intake {
            ticket: Ticket::new("ELE-2026-000001".into(), draft, "r-1".into(), Utc::now()),
            duplicate: DuplicateCheck::clean(),
            advisories: Vec::new(),
        };
        assert!(!intake.is_degraded());
        intake.advisories.push(SoftWarning::DuplicateDetectionDegraded {
            reason: "timeout".into(),
        });
        assert!(intake.is_degraded());
        assert_eq!(intake.ticket_id(), "ELE-2026-000001");
    }
}
