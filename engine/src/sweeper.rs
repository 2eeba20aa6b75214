//! Periodic SLA sweep
//!
//! Each pass:
//! - closes completed, unrated tickets whose auto-close grace has elapsed,
//!   through the same transition path as any other actor
//! - sends one `sla_warning` per ticket whose deadline is within the lead
//! - prunes idle per-ticket locks

use std::collections::HashSet;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SharedTicketEngine;
use crate::error::EngineResult;
use crate::identity::Actor;
use crate::lifecycle::{Action, TransitionPayload};
use crate::notify;
use crate::state::TicketFilter;
use crate::ticket::{TicketId, TicketStatus};

/// What a single pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub closed: Vec<TicketId>,
    pub warned: Vec<TicketId>,
    /// Tickets the pass tried to close but could not, with the reason
    pub failures: Vec<(TicketId, String)>,
    pub locks_pruned: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        self.closed.is_empty() && self.warned.is_empty() && self.failures.is_empty()
    }
}

pub struct SlaSweeper {
    engine: SharedTicketEngine,
    /// Tickets already warned about by this process
    warned: DashSet<TicketId>,
}

impl SlaSweeper {
    pub fn new(engine: SharedTicketEngine) -> Self {
        Self {
            engine,
            warned: DashSet::new(),
        }
    }

    /// Sweep every `sweep_interval` until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.engine.config().sweep_interval();
        let mut ticker = tokio::time::interval(period);
        info!(interval_secs = period.as_secs(), "SLA sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep_once().await {
                Ok(report) if report.is_idle() => debug!("SLA sweep: nothing to do"),
                Ok(report) => info!(
                    closed = report.closed.len(),
                    warned = report.warned.len(),
                    failures = report.failures.len(),
                    "SLA sweep complete"
                ),
                Err(e) => warn!(error = %e, "SLA sweep failed"),
            }
        }
        info!("SLA sweeper stopped");
    }

    /// One pass at the engine's current time
    pub async fn sweep_once(&self) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();
        self.auto_close(&mut report).await?;
        self.warn_due(&mut report).await?;
        report.locks_pruned = self.engine.locks().prune();
        Ok(report)
    }

    async fn auto_close(&self, report: &mut SweepReport) -> EngineResult<()> {
        let now = self.engine.now();
        let grace = self.engine.config().auto_close_grace();
        let completed = self
            .engine
            .store()
            .list_tickets(&TicketFilter::new().status(TicketStatus::Completed))
            .await?;

        let system = Actor::system();
        for ticket in completed {
            let due = ticket.rating.is_none()
                && ticket
                    .completed_at
                    .and_then(|done| done.checked_add_signed(grace))
                    .is_some_and(|due_at| due_at <= now);
            if !due {
                continue;
            }
            match self
                .engine
                .transition_as(&ticket.ticket_id, Action::Close, &system, TransitionPayload::new())
                .await
            {
                Ok(_) => report.closed.push(ticket.ticket_id),
                Err(e) => {
                    // Usually a reporter rating or reopening at the same moment.
                    debug!(ticket_id = %ticket.ticket_id, error = %e, "Auto-close skipped");
                    report.failures.push((ticket.ticket_id, e.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn warn_due(&self, report: &mut SweepReport) -> EngineResult<()> {
        let now = self.engine.now();
        let lead = self.engine.config().sla_warning_lead();
        let filter = TicketFilter::new()
            .status(TicketStatus::Approved)
            .status(TicketStatus::Assigned)
            .status(TicketStatus::InProgress)
            .status(TicketStatus::Reopened);
        let open = self.engine.store().list_tickets(&filter).await?;

        let mut still_open = HashSet::with_capacity(open.len());
        for ticket in &open {
            still_open.insert(ticket.ticket_id.clone());
            let Some(deadline) = ticket.sla_deadline else {
                continue;
            };
            if deadline - now > lead || self.warned.contains(&ticket.ticket_id) {
                continue;
            }
            self.warned.insert(ticket.ticket_id.clone());
            drop(
                self.engine
                    .dispatcher()
                    .dispatch(notify::sla_warning(ticket, now)),
            );
            info!(
                ticket_id = %ticket.ticket_id,
                minutes_remaining = (deadline - now).num_minutes(),
                "SLA warning sent"
            );
            report.warned.push(ticket.ticket_id.clone());
        }

        // Forget tickets that can no longer come back (closed or rejected).
        let stale: Vec<TicketId> = self
            .warned
            .iter()
            .filter(|id| !still_open.contains(id.key()))
            .map(|id| id.key().clone())
            .collect();
        for id in stale {
            let finished = match self.engine.store().get_ticket(&id).await? {
                Some(ticket) => ticket.status.is_terminal(),
                None => true,
            };
            if finished {
                self.warned.remove(&id);
            }
        }
        Ok(())
    }
}
