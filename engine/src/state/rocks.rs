//! RocksDB-backed ticket store
//!
//! Tickets are stored as bincode in `tickets`, workflow events as JSON in
//! `events` (for debuggability), counters in `meta`. A ticket change and its
//! event go into one `WriteBatch`.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::schema::{self, keys, ALL_CFS};
use super::{sort_tickets, StoreError, StoreResult, TicketFilter, TicketStore};
use crate::audit::WorkflowEvent;
use crate::ticket::{Category, Ticket};

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match err.kind() {
            ErrorKind::Busy
            | ErrorKind::TimedOut
            | ErrorKind::TryAgain
            | ErrorKind::ShutdownInProgress => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Persistent store. Reads share the lock; read-modify-write paths
/// (sequence allocation, versioned commits) take it exclusively.
pub struct RocksStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;
        debug!(path = %path.display(), "Opened ticket store");

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    fn encode_event(event: &WorkflowEvent) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(event).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode_event(bytes: &[u8]) -> StoreResult<WorkflowEvent> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    fn read_ticket(db: &DB, ticket_id: &str) -> StoreResult<Option<Ticket>> {
        let cf = cf_handle(db, schema::CF_TICKETS)?;
        match db.get_cf(&cf, keys::ticket(ticket_id).as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stage a ticket row and both event index entries
    fn stage(
        db: &DB,
        batch: &mut WriteBatch,
        ticket: &Ticket,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let tickets = cf_handle(db, schema::CF_TICKETS)?;
        let events = cf_handle(db, schema::CF_EVENTS)?;

        batch.put_cf(
            &tickets,
            keys::ticket(&ticket.ticket_id).as_bytes(),
            Self::encode(ticket)?,
        );
        let json = Self::encode_event(event)?;
        batch.put_cf(
            &events,
            keys::timeline(event.timestamp_nanos(), &event.event_id).as_bytes(),
            &json,
        );
        batch.put_cf(
            &events,
            keys::history(&ticket.ticket_id, ticket.version).as_bytes(),
            &json,
        );
        Ok(())
    }
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> StoreResult<&'a rocksdb::ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| StoreError::ColumnFamilyNotFound(name.to_string()))
}

#[async_trait]
impl TicketStore for RocksStore {
    async fn next_sequence(&self, category: Category, year: i32) -> StoreResult<u64> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf_handle(&db, schema::CF_META)?;
        let key = keys::sequence(category, year);

        let current: u64 = match db.get_cf(&cf, key.as_bytes())? {
            Some(bytes) => Self::decode(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        db.put_cf(&cf, key.as_bytes(), Self::encode(&next)?)?;
        Ok(next)
    }

    async fn insert_ticket(&self, ticket: &Ticket, event: &WorkflowEvent) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        if Self::read_ticket(&db, &ticket.ticket_id)?.is_some() {
            return Err(StoreError::AlreadyExists(ticket.ticket_id.clone()));
        }

        let mut batch = WriteBatch::default();
        Self::stage(&db, &mut batch, ticket, event)?;
        db.write(batch)?;
        Ok(())
    }

    async fn get_ticket(&self, ticket_id: &str) -> StoreResult<Option<Ticket>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::read_ticket(&db, ticket_id)
    }

    async fn commit_transition(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let stored = Self::read_ticket(&db, &ticket.ticket_id)?
            .ok_or_else(|| StoreError::NotFound(ticket.ticket_id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                ticket_id: ticket.ticket_id.clone(),
                expected: expected_version,
                found: stored.version,
            });
        }

        let mut batch = WriteBatch::default();
        Self::stage(&db, &mut batch, ticket, event)?;
        db.write(batch)?;
        Ok(())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf_handle(&db, schema::CF_TICKETS)?;

        let mut tickets = Vec::new();
        for result in db.prefix_iterator_cf(&cf, keys::TICKET_PREFIX.as_bytes()) {
            let (key, value) = result?;
            if !key.starts_with(keys::TICKET_PREFIX.as_bytes()) {
                break;
            }
            let ticket: Ticket = Self::decode(&value)?;
            if filter.matches(&ticket) {
                tickets.push(ticket);
            }
        }
        sort_tickets(&mut tickets);
        Ok(tickets)
    }

    async fn events_for(&self, ticket_id: &str) -> StoreResult<Vec<WorkflowEvent>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf_handle(&db, schema::CF_EVENTS)?;
        let prefix = keys::history_prefix(ticket_id);

        let mut events = Vec::new();
        for result in db.prefix_iterator_cf(&cf, prefix.as_bytes()) {
            let (key, value) = result?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            events.push(Self::decode_event(&value)?);
        }
        Ok(events)
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<WorkflowEvent>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = cf_handle(&db, schema::CF_EVENTS)?;

        let start_nanos = start.timestamp_nanos_opt().unwrap_or(0);
        let end_nanos = end.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let start_key = keys::timeline(start_nanos, "");

        let mut events = Vec::new();
        let iter = db.iterator_cf(
            &cf,
            IteratorMode::From(start_key.as_bytes(), rocksdb::Direction::Forward),
        );
        for result in iter {
            let (key, value) = result?;
            let key_str = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            match keys::parse_timeline_timestamp(&key_str) {
                Some(ts) if ts > end_nanos => break,
                Some(_) => events.push(Self::decode_event(&value)?),
                None => break,
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Action;
    use crate::ticket::{Location, Priority, TicketDraft, TicketStatus};
    use chrono::Duration;
    use tempfile::tempdir;

    fn test_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("tickets.db")).unwrap();
        (store, dir)
    }

    fn ticket(id: &str) -> Ticket {
        let draft = TicketDraft::new(Category::Electrical, Location::room(9, "B2"), "panel", "hum");
        Ticket::new(id.into(), draft, "r-1".into(), Utc::now())
    }

    #[tokio::test]
    async fn test_ticket_roundtrip_and_history() {
        let (store, _dir) = test_store();
        let t = ticket("ELE-2026-000001");
        store
            .insert_ticket(&t, &WorkflowEvent::created(&t.ticket_id, "r-1", t.created_at))
            .await
            .unwrap();

        let mut next = t.clone();
        next.status = TicketStatus::PendingApproval;
        next.priority = Some(Priority::Low);
        next.version = 1;
        let event = WorkflowEvent::new(
            &t.ticket_id,
            Some(TicketStatus::Submitted),
            TicketStatus::PendingApproval,
            "r-1",
            Action::Submit,
            Utc::now(),
        );
        store.commit_transition(&next, 0, &event).await.unwrap();

        assert_eq!(store.get_ticket(&t.ticket_id).await.unwrap(), Some(next));
        let history = store.events_for(&t.ticket_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, Action::Create);
        assert_eq!(history[1].action, Action::Submit);
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let (store, _dir) = test_store();
        let t = ticket("ELE-2026-000002");
        store
            .insert_ticket(&t, &WorkflowEvent::created(&t.ticket_id, "r-1", t.created_at))
            .await
            .unwrap();

        let mut next = t.clone();
        next.version = 1;
        let event = WorkflowEvent::created(&t.ticket_id, "r-1", Utc::now());
        let err = store.commit_transition(&next, 5, &event).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 5, found: 0, .. }));
    }

    #[tokio::test]
    async fn test_sequences_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tickets.db");
        {
            let store = RocksStore::open(&path).unwrap();
            assert_eq!(store.next_sequence(Category::Mechanical, 2026).await.unwrap(), 1);
            assert_eq!(store.next_sequence(Category::Mechanical, 2026).await.unwrap(), 2);
        }
        let store = RocksStore::open(&path).unwrap();
        assert_eq!(store.next_sequence(Category::Mechanical, 2026).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_timeline_range() {
        let (store, _dir) = test_store();
        let base = Utc::now();
        for (i, id) in ["ELE-2026-000001", "ELE-2026-000002", "ELE-2026-000003"]
            .iter()
            .enumerate()
        {
            let t = ticket(id);
            let e = WorkflowEvent::created(*id, "r-1", base + Duration::hours(i as i64));
            store.insert_ticket(&t, &e).await.unwrap();
        }

        let events = store
            .events_between(base + Duration::minutes(30), base + Duration::minutes(150))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        let open = store
            .list_tickets(&TicketFilter::new().open())
            .await
            .unwrap();
        assert_eq!(open.len(), 3);
    }
}
