//! Integration tests for soft-failure handling
//!
//! Duplicate detection and notification delivery may fail or hang; neither
//! may block intake or a transition. A failed commit leaves the ticket as
//! it was so the same request can be retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fixit_engine::{
    Action, Actor, Category, DeliveryError, EngineError, Location, MemoryStore,
    NotificationChannel, Recipient, SoftWarning, StaticDirectory, StoreError, StoreResult,
    Ticket, TicketDraft, TicketEngine, TicketFilter, TicketStatus, TicketStore,
    TransitionPayload, WorkflowEvent,
};
use mockall::mock;

/// Memory store with switchable faults
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    slow_scans: AtomicBool,
    failing_scans: AtomicBool,
    fail_next_commit: AtomicBool,
}

#[async_trait]
impl TicketStore for FlakyStore {
    async fn next_sequence(&self, category: Category, year: i32) -> StoreResult<u64> {
        self.inner.next_sequence(category, year).await
    }

    async fn insert_ticket(&self, ticket: &Ticket, event: &WorkflowEvent) -> StoreResult<()> {
        self.inner.insert_ticket(ticket, event).await
    }

    async fn get_ticket(&self, ticket_id: &str) -> StoreResult<Option<Ticket>> {
        self.inner.get_ticket(ticket_id).await
    }

    async fn commit_transition(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("primary lost".into()));
        }
        self.inner
            .commit_transition(ticket, expected_version, event)
            .await
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        if self.failing_scans.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scan replica down".into()));
        }
        if self.slow_scans.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.list_tickets(filter).await
    }

    async fn events_for(&self, ticket_id: &str) -> StoreResult<Vec<WorkflowEvent>> {
        self.inner.events_for(ticket_id).await
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        self.inner.events_between(start, end).await
    }
}

mock! {
    pub Channel {}
    #[async_trait]
    impl NotificationChannel for Channel {
        async fn publish(
            &self,
            event_type: &str,
            recipient: &Recipient,
            payload: &serde_json::Value,
        ) -> Result<(), DeliveryError>;
    }
}

/// Channel that never answers
struct StuckChannel;

#[async_trait]
impl NotificationChannel for StuckChannel {
    async fn publish(
        &self,
        _event_type: &str,
        _recipient: &Recipient,
        _payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        std::future::pending().await
    }
}

fn directory() -> Arc<StaticDirectory> {
    Arc::new(StaticDirectory::from_actors([
        Actor::reporter("r-1"),
        Actor::coordinator("c-1", vec![3]),
    ]))
}

fn draft(equipment: &str) -> TicketDraft {
    TicketDraft::new(
        Category::Mechanical,
        Location::room(3, "L-1"),
        equipment,
        "grinding noise",
    )
}

/// Test: a hung duplicate scan times out and the ticket is still created
#[tokio::test(start_paused = true)]
async fn test_duplicate_timeout_does_not_block_intake() {
    let store = Arc::new(FlakyStore::default());
    let engine = TicketEngine::new(store.clone(), directory());
    engine.create_ticket("r-1", draft("lift motor")).await.unwrap();

    store.slow_scans.store(true, Ordering::SeqCst);
    let intake = engine.create_ticket("r-1", draft("lift motor")).await.unwrap();

    assert_eq!(intake.ticket.status, TicketStatus::Submitted);
    assert!(intake.duplicate.degraded);
    assert!(!intake.duplicate.is_duplicate);
    assert!(intake.is_degraded());
    assert!(matches!(
        &intake.advisories[0],
        SoftWarning::DuplicateDetectionDegraded { reason } if reason.contains("timed out")
    ));
    assert_eq!(store.inner.ticket_count().await, 2);
}

/// Test: a failing duplicate scan degrades instead of failing intake
#[tokio::test]
async fn test_duplicate_scan_error_is_advisory() {
    let store = Arc::new(FlakyStore::default());
    store.failing_scans.store(true, Ordering::SeqCst);
    let engine = TicketEngine::new(store.clone(), directory());

    let intake = engine.create_ticket("r-1", draft("lift motor")).await.unwrap();
    assert!(intake.duplicate.degraded);
    assert!(matches!(
        &intake.advisories[0],
        SoftWarning::DuplicateDetectionDegraded { reason } if reason.contains("scan replica down")
    ));
    assert_eq!(intake.ticket.status, TicketStatus::Submitted);
}

/// Test: a description the detector cannot score still files a ticket
#[tokio::test]
async fn test_unscoreable_description_is_advisory() {
    let engine = TicketEngine::new(Arc::new(MemoryStore::new()), directory());
    let intake = engine.create_ticket("r-1", draft("???")).await.unwrap();
    assert!(intake.duplicate.degraded);
    assert_eq!(intake.advisories.len(), 1);
}

/// Test: a failed commit changes nothing and the same request can be retried
#[tokio::test]
async fn test_failed_commit_is_retryable() {
    let store = Arc::new(FlakyStore::default());
    let engine = TicketEngine::new(store.clone(), directory());
    let intake = engine.create_ticket("r-1", draft("lift motor")).await.unwrap();
    let id = intake.ticket_id();

    // Warm the read cache so a stale entry would show
    assert_eq!(engine.get_ticket(id).await.unwrap().version, 0);

    store.fail_next_commit.store(true, Ordering::SeqCst);
    let err = engine
        .transition(id, Action::Review, "c-1", TransitionPayload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
    assert!(err.is_retryable());
    assert_eq!(err.code(), "STORE_ERROR");
    assert!(err.to_structured().retryable);

    let unchanged = engine.get_ticket(id).await.unwrap();
    assert_eq!(unchanged.status, TicketStatus::Submitted);
    assert_eq!(engine.ticket_history(id).await.unwrap().len(), 1);

    let retried = engine
        .transition(id, Action::Review, "c-1", TransitionPayload::new())
        .await
        .unwrap();
    assert_eq!(retried.status, TicketStatus::PendingApproval);
    assert_eq!(engine.get_ticket(id).await.unwrap().version, 1);
    assert_eq!(engine.ticket_history(id).await.unwrap().len(), 2);
}

/// Test: delivery failures never surface as transition failures
#[tokio::test]
async fn test_notification_failure_does_not_fail_transition() {
    let mut channel = MockChannel::new();
    channel
        .expect_publish()
        .returning(|_, _, _| Err(DeliveryError::Unavailable("push gateway down".into())));

    let engine = TicketEngine::new(Arc::new(MemoryStore::new()), directory())
        .with_channel(Arc::new(channel));
    let intake = engine.create_ticket("r-1", draft("lift motor")).await.unwrap();
    assert!(!intake.is_degraded());

    let ticket = engine
        .transition(intake.ticket_id(), Action::Submit, "r-1", TransitionPayload::new())
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::PendingApproval);
}

/// Test: a channel that hangs does not hold up the caller
#[tokio::test]
async fn test_stuck_channel_does_not_delay_transition() {
    let engine = TicketEngine::new(Arc::new(MemoryStore::new()), directory())
        .with_channel(Arc::new(StuckChannel));
    let intake = tokio::time::timeout(
        Duration::from_secs(1),
        engine.create_ticket("r-1", draft("lift motor")),
    )
    .await
    .unwrap()
    .unwrap();

    let ticket = tokio::time::timeout(
        Duration::from_secs(1),
        engine.transition(intake.ticket_id(), Action::Review, "c-1", TransitionPayload::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(ticket.status, TicketStatus::PendingApproval);
}
