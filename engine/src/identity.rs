//! Actors and the identity directory seam
//!
//! The engine never stores credentials. Every inbound call names an actor id;
//! the directory resolves it to a role plus the scope that role acts within
//! (a coordinator's blocks, a fixer's category).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::single_flight::SingleFlight;
use crate::ticket::{Category, Location, UserId};

/// Actor id used for timer-driven transitions
pub const SYSTEM_ACTOR_ID: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reporter,
    Coordinator,
    Fixer,
    Admin,
    /// The engine itself (SLA sweeper)
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Reporter => write!(f, "reporter"),
            Role::Coordinator => write!(f, "coordinator"),
            Role::Fixer => write!(f, "fixer"),
            Role::Admin => write!(f, "admin"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A resolved caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    /// Blocks a coordinator is responsible for
    pub assigned_blocks: Vec<u8>,
    /// Trade of a fixer
    pub category: Option<Category>,
    /// Deactivated staff keep their identity but can no longer take work
    pub active: bool,
}

impl Actor {
    pub fn reporter(user_id: impl Into<UserId>) -> Self {
        Self::with_role(user_id, Role::Reporter)
    }

    pub fn coordinator(user_id: impl Into<UserId>, blocks: Vec<u8>) -> Self {
        Self {
            assigned_blocks: blocks,
            ..Self::with_role(user_id, Role::Coordinator)
        }
    }

    pub fn fixer(user_id: impl Into<UserId>, category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::with_role(user_id, Role::Fixer)
        }
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self::with_role(user_id, Role::Admin)
    }

    pub fn system() -> Self {
        Self::with_role(SYSTEM_ACTOR_ID, Role::System)
    }

    fn with_role(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            assigned_blocks: Vec::new(),
            category: None,
            active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether a coordinator's remit covers `location`.
    ///
    /// Free-text locations sit in the general bucket every coordinator sees.
    pub fn covers(&self, location: &Location) -> bool {
        match location.block_id() {
            Some(block) => self.assigned_blocks.contains(&block),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// Resolves actor ids to roles and scopes
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve(&self, actor_id: &str) -> Result<Actor, DirectoryError>;
}

/// In-process directory, used by the service binary's seed file and tests
#[derive(Default)]
pub struct StaticDirectory {
    actors: RwLock<HashMap<UserId, Actor>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        Self {
            actors: RwLock::new(
                actors
                    .into_iter()
                    .map(|a| (a.user_id.clone(), a))
                    .collect(),
            ),
        }
    }

    pub async fn insert(&self, actor: Actor) {
        self.actors.write().await.insert(actor.user_id.clone(), actor);
    }

    /// Flip an actor to inactive; returns false if unknown
    pub async fn deactivate(&self, user_id: &str) -> bool {
        match self.actors.write().await.get_mut(user_id) {
            Some(actor) => {
                actor.active = false;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.actors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actors.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn resolve(&self, actor_id: &str) -> Result<Actor, DirectoryError> {
        self.actors
            .read()
            .await
            .get(actor_id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownActor(actor_id.to_string()))
    }
}

/// Wraps a remote directory so concurrent lookups of the same actor share a
/// single outbound call
pub struct CoalescingDirectory<D> {
    inner: Arc<D>,
    flights: SingleFlight<UserId, Actor, DirectoryError>,
}

impl<D: IdentityDirectory> CoalescingDirectory<D> {
    pub fn new(inner: Arc<D>) -> Self {
        Self {
            inner,
            flights: SingleFlight::new(),
        }
    }
}

#[async_trait]
impl<D: IdentityDirectory + 'static> IdentityDirectory for CoalescingDirectory<D> {
    async fn resolve(&self, actor_id: &str) -> Result<Actor, DirectoryError> {
        let inner = self.inner.clone();
        let id = actor_id.to_string();
        self.flights
            .run(actor_id.to_string(), || async move {
                debug!(actor_id = %id, "Resolving actor");
                inner.resolve(&id).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_coordinator_coverage() {
        let coord = Actor::coordinator("c-1", vec![12, 14]);
        assert!(coord.covers(&Location::block(12)));
        assert!(!coord.covers(&Location::room(13, "2")));
        assert!(coord.covers(&Location::general("north gate")));
    }

    #[tokio::test]
    async fn test_static_directory() {
        let dir = StaticDirectory::from_actors([Actor::fixer("f-1", Category::Electrical)]);
        let actor = dir.resolve("f-1").await.unwrap();
        assert_eq!(actor.role, Role::Fixer);
        assert!(actor.active);

        assert!(dir.deactivate("f-1").await);
        assert!(!dir.resolve("f-1").await.unwrap().active);
        assert_eq!(
            dir.resolve("nobody").await,
            Err(DirectoryError::UnknownActor("nobody".into()))
        );
    }

    struct SlowDirectory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityDirectory for SlowDirectory {
        async fn resolve(&self, actor_id: &str) -> Result<Actor, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Actor::reporter(actor_id))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_coalescing_directory_shares_lookups() {
        let slow = Arc::new(SlowDirectory {
            calls: AtomicUsize::new(0),
        });
        let dir = Arc::new(CoalescingDirectory::new(slow.clone()));

        let lookups: Vec<_> = (0..6)
            .map(|_| {
                let dir = dir.clone();
                tokio::spawn(async move { dir.resolve("r-1").await })
            })
            .collect();
        for lookup in lookups {
            assert_eq!(lookup.await.unwrap().unwrap().user_id, "r-1");
        }

        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }
}
