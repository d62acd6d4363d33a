//! # Trellis Workspace
//!
//! The boundary between an editing session and where the project is stored.
//!
//! ```text
//! EditSession ──outbox──▶ SyncLoop ──save──▶ Persistence (file / memory)
//!      ▲                                          │
//!      └──────────── confirm / requeue ◀──────────┘
//! ```

pub mod persistence;
pub mod sync;

pub use persistence::{
    FilePersistence, LogEntry, MemoryPersistence, Persistence, PersistenceError,
    PersistenceResult,
};
pub use sync::{SyncConfig, SyncLoop, DEFAULT_SYNC_INTERVAL};

use std::sync::{Arc, Mutex};
use trellis_data::ProjectData;
use trellis_editor::EditSession;

/// Load a project and start a session on it
pub async fn open_session(
    client_id: &str,
    persistence: &dyn Persistence,
) -> PersistenceResult<Arc<Mutex<EditSession>>> {
    let snapshot = persistence.load().await?;
    let session = EditSession::new(client_id, ProjectData::from_snapshot(snapshot));
    Ok(Arc::new(Mutex::new(session)))
}
