//! Background synchronization of a session with its persistence

use crate::persistence::{Persistence, PersistenceResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trellis_editor::EditSession;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Drains a session's outbox into a [`Persistence`] on a fixed interval
///
/// Saved change sets are confirmed on the session. A failed save puts the
/// change sets back in front of the outbox so the next tick retries them.
pub struct SyncLoop {
    session: Arc<Mutex<EditSession>>,
    persistence: Arc<dyn Persistence>,
    config: SyncConfig,
}

impl SyncLoop {
    pub fn new(
        session: Arc<Mutex<EditSession>>,
        persistence: Arc<dyn Persistence>,
        config: SyncConfig,
    ) -> Self {
        Self {
            session,
            persistence,
            config,
        }
    }

    fn session(&self) -> MutexGuard<'_, EditSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save whatever is in the outbox
    ///
    /// Returns the persisted version, or `None` when there was nothing to save.
    pub async fn sync_once(&self) -> PersistenceResult<Option<u64>> {
        let change_sets = self.session().take_outbox();
        if change_sets.is_empty() {
            return Ok(None);
        }

        match self.persistence.save(&change_sets).await {
            Ok(version) => {
                let mut session = self.session();
                for change_set in &change_sets {
                    if let Err(error) = session.confirm(&change_set.id) {
                        debug!(%error, "Saved change set was not pending");
                    }
                }
                debug!(version, count = change_sets.len(), "Synced");
                Ok(Some(version))
            }
            Err(error) => {
                warn!(%error, count = change_sets.len(), "Sync failed, will retry");
                self.session().requeue(change_sets);
                Err(error)
            }
        }
    }

    /// Run until `shutdown` turns true (or its sender goes away)
    ///
    /// A last sync is attempted on the way out.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = self.sync_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            let _ = self.sync_once().await;
            info!("Sync loop stopped");
        })
    }
}
