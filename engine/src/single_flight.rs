//! Single-flight call coalescing
//!
//! Concurrent callers asking for the same key share one in-flight call: the
//! first caller runs it, later callers park on a wait-list and receive a
//! clone of the leader's result when it lands.
//!
//! ```text
//! caller A ──run(k)──▶ [in-flight k] ──f().await──▶ result ──┬──▶ A
//! caller B ──run(k)──▶ waits ─────────────────────────────────┤──▶ B
//! caller C ──run(k)──▶ waits ─────────────────────────────────┘──▶ C
//! ```
//!
//! If the leader is cancelled before finishing, its waiters wake up and
//! retry; one of them becomes the new leader.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::oneshot;

type WaitList<V, E> = Vec<oneshot::Sender<Result<V, E>>>;

/// Keyed call coalescer
pub struct SingleFlight<K, V, E> {
    inflight: Mutex<HashMap<K, WaitList<V, E>>>,
}

enum Role<V, E> {
    Leader,
    Waiter(oneshot::Receiver<Result<V, E>>),
}

/// Removes the in-flight marker even if the leader future is dropped
struct LeaderGuard<'a, K: Eq + Hash, V, E> {
    flight: &'a SingleFlight<K, V, E>,
    key: Option<K>,
}

impl<K: Eq + Hash, V, E> LeaderGuard<'_, K, V, E> {
    fn finish(mut self) -> WaitList<V, E> {
        match self.key.take() {
            Some(key) => self.flight.take_waiters(&key),
            None => Vec::new(),
        }
    }
}

impl<K: Eq + Hash, V, E> Drop for LeaderGuard<'_, K, V, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            // Dropping the senders wakes the waiters with RecvError.
            drop(self.flight.take_waiters(&key));
        }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key`, or join an identical call already in flight
    pub async fn run<F, Fut>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut f = Some(f);
        loop {
            match self.join(&key) {
                Role::Waiter(rx) => match rx.await {
                    Ok(result) => return result,
                    // Leader was cancelled; contend again.
                    Err(_) => continue,
                },
                Role::Leader => {
                    let guard = LeaderGuard {
                        flight: self,
                        key: Some(key.clone()),
                    };
                    let call = match f.take() {
                        Some(call) => call,
                        None => unreachable!("single-flight leader runs at most once"),
                    };
                    let result = call().await;
                    for waiter in guard.finish() {
                        let _ = waiter.send(result.clone());
                    }
                    return result;
                }
            }
        }
    }

    /// Number of keys currently in flight
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn join(&self, key: &K) -> Role<V, E> {
        let mut inflight = match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match inflight.get_mut(key) {
            Some(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Role::Waiter(rx)
            }
            None => {
                inflight.insert(key.clone(), Vec::new());
                Role::Leader
            }
        }
    }

}

impl<K: Eq + Hash, V, E> SingleFlight<K, V, E> {
    fn take_waiters(&self, key: &K) -> WaitList<V, E> {
        let mut inflight = match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inflight.remove(key).unwrap_or_default()
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
