//! Audit queries: per-ticket history and SLA compliance reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::event::WorkflowEvent;
use crate::lifecycle::Action;
use crate::state::{SharedTicketStore, StoreResult, TicketFilter};
use crate::ticket::Priority;

/// SLA outcome counts for one priority level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaReportRow {
    pub priority: Priority,
    /// Completions at or before the deadline
    pub completed_on_time: usize,
    /// Completions after the deadline
    pub completed_late: usize,
    /// Still open (not yet completed) and already past the deadline
    pub open_overdue: usize,
}

impl SlaReportRow {
    fn empty(priority: Priority) -> Self {
        Self {
            priority,
            completed_on_time: 0,
            completed_late: 0,
            open_overdue: 0,
        }
    }

    /// Share of completions that met the deadline, if there were any
    pub fn compliance_rate(&self) -> Option<f64> {
        let total = self.completed_on_time + self.completed_late;
        (total > 0).then(|| self.completed_on_time as f64 / total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    /// One row per priority, emergency first
    pub rows: Vec<SlaReportRow>,
}

impl SlaReport {
    pub fn row(&self, priority: Priority) -> Option<&SlaReportRow> {
        self.rows.iter().find(|r| r.priority == priority)
    }

    pub fn total_breaches(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.completed_late + r.open_overdue)
            .sum()
    }
}

/// Read side of the audit trail
pub struct AuditTrail {
    store: SharedTicketStore,
}

impl AuditTrail {
    pub fn new(store: SharedTicketStore) -> Self {
        Self { store }
    }

    /// Every event for a ticket, creation first
    pub async fn history(&self, ticket_id: &str) -> StoreResult<Vec<WorkflowEvent>> {
        let events = self.store.events_for(ticket_id).await?;
        debug!(ticket_id, count = events.len(), "Loaded ticket history");
        Ok(events)
    }

    /// SLA outcomes for completions in `[from, to]`, plus tickets that are
    /// open past their deadline as of `now`
    pub async fn sla_report(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<SlaReport> {
        let mut rows: Vec<SlaReportRow> = Priority::all()
            .iter()
            .map(|p| SlaReportRow::empty(*p))
            .collect();
        let index = |p: Priority| Priority::all().iter().position(|x| *x == p);

        let completions: Vec<WorkflowEvent> = self
            .store
            .events_between(from, to)
            .await?
            .into_iter()
            .filter(|e| e.action == Action::Complete)
            .collect();

        for event in &completions {
            let Some(ticket) = self.store.get_ticket(&event.ticket_id).await? else {
                continue;
            };
            let (Some(priority), Some(deadline)) = (ticket.priority, ticket.sla_deadline) else {
                continue;
            };
            if let Some(i) = index(priority) {
                if event.timestamp <= deadline {
                    rows[i].completed_on_time += 1;
                } else {
                    rows[i].completed_late += 1;
                }
            }
        }

        for ticket in self.store.list_tickets(&TicketFilter::new().open()).await? {
            if !ticket.is_overdue(now) {
                continue;
            }
            if let Some(i) = ticket.priority.and_then(index) {
                rows[i].open_overdue += 1;
            }
        }

        let report = SlaReport {
            from,
            to,
            generated_at: now,
            rows,
        };
        info!(
            completions = completions.len(),
            breaches = report.total_breaches(),
            "SLA report generated"
        );
        Ok(report)
    }
}
