//! fixitd: runs the facilities ticket engine as a long-lived service
//!
//! Startup:
//! 1. resolve config (file, env, flags)
//! 2. load the staff directory seed
//! 3. open the ticket store (memory, or RocksDB with `heavy-state`)
//! 4. rebuild fixer queues from the store
//! 5. run the SLA sweeper and the audit log tail until shutdown

pub mod config;

use std::path::Path;
use std::sync::Arc;

use fixit_engine::identity::CoalescingDirectory;
use fixit_engine::{
    MemoryStore, SharedTicketEngine, SharedTicketStore, SlaSweeper, StaticDirectory,
    TicketEngine,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use config::{load_directory, parse_actors, Args, ServiceConfig, ServiceError};

/// Open the configured ticket store
pub fn open_store(state_path: Option<&Path>) -> Result<SharedTicketStore, ServiceError> {
    match state_path {
        None => {
            info!("Using in-memory ticket store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "heavy-state")]
        Some(path) => {
            info!(path = %path.display(), "Opening RocksDB ticket store");
            Ok(fixit_engine::RocksStore::open(path)?.shared())
        }
        #[cfg(not(feature = "heavy-state"))]
        Some(path) => Err(ServiceError::DurableStoreDisabled(path.to_path_buf())),
    }
}

/// Running service: engine plus its background tasks
pub struct Service {
    pub engine: SharedTicketEngine,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Wire the engine and start background tasks
    pub async fn start(config: &ServiceConfig) -> anyhow::Result<Self> {
        let directory = match &config.actors_path {
            Some(path) => load_directory(path)?,
            None => {
                warn!("No actors file given; every request will fail actor resolution");
                StaticDirectory::new()
            }
        };
        info!(actors = directory.len().await, "Staff directory loaded");

        let store = open_store(config.state_path.as_deref())?;
        let directory = CoalescingDirectory::new(Arc::new(directory));
        let engine = TicketEngine::new(store, Arc::new(directory))
            .with_config(config.engine.clone())
            .shared();

        let placed = engine.rebuild_queues().await?;
        info!(placed, "Fixer queues ready");

        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_sweeper(engine.clone(), cancel.clone()),
            spawn_audit_tail(engine.clone(), cancel.clone()),
        ];

        Ok(Self {
            engine,
            cancel,
            tasks,
        })
    }

    /// Stop background tasks and wait for them
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("fixitd stopped");
    }
}

fn spawn_sweeper(engine: SharedTicketEngine, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let sweeper = SlaSweeper::new(engine);
        sweeper.run(cancel).await
    })
}

/// Mirror committed workflow events into the service log
fn spawn_audit_tail(engine: SharedTicketEngine, cancel: CancellationToken) -> JoinHandle<()> {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => debug!(
                        ticket_id = %event.ticket_id,
                        action = %event.action,
                        actor = %event.actor,
                        to = %event.to_status,
                        "Workflow event"
                    ),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Audit tail lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}
