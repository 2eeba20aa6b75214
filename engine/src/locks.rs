//! Keyed async mutexes, one per ticket

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ticket::TicketId;

/// Serializes status changes per ticket. Operations on different tickets
/// never contend.
#[derive(Default)]
pub struct TicketLocks {
    locks: DashMap<TicketId, Arc<Mutex<()>>>,
}

impl TicketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `ticket_id`
    pub async fn lock(&self, ticket_id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let mutex = self
            .locks
            .entry(ticket_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop entries nobody holds or waits on; returns how many were removed
    pub fn prune(&self) -> usize {
        // Count inside retain; other tasks may insert while shards are visited.
        let mut removed = 0;
        self.locks.retain(|_, m| {
            let keep = Arc::strong_count(m) > 1;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_ticket_serializes() {
        let locks = Arc::new(TicketLocks::new());
        let guard = locks.lock("ELE-2026-000001").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock("ELE-2026-000001").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_tickets_do_not_contend() {
        let locks = TicketLocks::new();
        let _a = locks.lock("ELE-2026-000001").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("ELE-2026-000002")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = TicketLocks::new();
        let held = locks.lock("a").await;
        drop(locks.lock("b").await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_prune_while_locks_are_taken() {
        let locks = Arc::new(TicketLocks::new());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let pruner = {
            let locks = locks.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut total = 0usize;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    total += locks.prune();
                }
                total
            })
        };

        let mut workers = Vec::new();
        for w in 0..4 {
            let locks = locks.clone();
            workers.push(tokio::spawn(async move {
                for i in 0..20_000 {
                    drop(locks.lock(&format!("ELE-2026-{}{:05}", w, i)).await);
                }
            }));
        }
        for worker in workers {
            worker.await.unwrap();
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);

        let pruned = pruner.join().expect("prune must not panic");
        let rest = locks.prune();
        assert_eq!(pruned + rest, 80_000);
        assert!(locks.is_empty());
    }
}
