//! Where committed change sets end up
//!
//! A [`Persistence`] hands out the project snapshot a session starts from and
//! accepts the change sets the session commits afterwards. Every accepted
//! save bumps the stored version.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use trellis_data::{ChangeSet, PatchError, ProjectData, ProjectSnapshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot encode change set: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load(&self) -> PersistenceResult<ProjectSnapshot>;

    /// Store change sets in order; returns the version after the save
    async fn save(&self, change_sets: &[ChangeSet]) -> PersistenceResult<u64>;
}

/// One line of the patch log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub version: u64,
    pub timestamp: i64,
    pub change_set: ChangeSet,
}

fn apply_change_sets(data: &mut ProjectData, change_sets: &[ChangeSet]) -> PersistenceResult<()> {
    for change_set in change_sets {
        data.apply_patches(&change_set.patches)?;
    }
    Ok(())
}

/// Snapshot file plus an append-only JSONL log of every saved change set
///
/// The snapshot is rewritten after each save, so loading never replays the log.
pub struct FilePersistence {
    snapshot_path: PathBuf,
    log_path: PathBuf,
    /// Serializes saves
    version: tokio::sync::Mutex<u64>,
}

impl FilePersistence {
    /// Open the snapshot at `snapshot_path`; the log lives next to it
    pub async fn open(snapshot_path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let snapshot_path = snapshot_path.into();
        let log_path = snapshot_path.with_extension("log.jsonl");

        let version = match tokio::fs::read_to_string(&log_path).await {
            Ok(log) => log.lines().filter(|line| !line.trim().is_empty()).count() as u64,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        debug!(path = %snapshot_path.display(), version, "Opened project");

        Ok(Self {
            snapshot_path,
            log_path,
            version: tokio::sync::Mutex::new(version),
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub async fn version(&self) -> u64 {
        *self.version.lock().await
    }

    async fn read_snapshot(&self) -> PersistenceResult<ProjectSnapshot> {
        let text = match tokio::fs::read_to_string(&self.snapshot_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProjectSnapshot::default())
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|source| PersistenceError::Json {
            path: self.snapshot_path.clone(),
            source,
        })
    }

    /// Read every log entry, oldest first
    pub async fn read_log(&self) -> PersistenceResult<Vec<LogEntry>> {
        let text = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|source| PersistenceError::Json {
                    path: self.log_path.clone(),
                    source,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn load(&self) -> PersistenceResult<ProjectSnapshot> {
        self.read_snapshot().await
    }

    #[instrument(skip(self, change_sets), fields(count = change_sets.len()))]
    async fn save(&self, change_sets: &[ChangeSet]) -> PersistenceResult<u64> {
        let mut version = self.version.lock().await;
        if change_sets.is_empty() {
            return Ok(*version);
        }

        // Patches are applied before anything is written
        let mut data = ProjectData::from_snapshot(self.read_snapshot().await?);
        apply_change_sets(&mut data, change_sets)?;

        let mut lines = String::new();
        let mut next = *version;
        for change_set in change_sets {
            next += 1;
            let entry = LogEntry {
                version: next,
                timestamp: chrono::Utc::now().timestamp_millis(),
                change_set: change_set.clone(),
            };
            lines.push_str(&serde_json::to_string(&entry)?);
            lines.push('\n');
        }

        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        log.write_all(lines.as_bytes()).await?;
        log.flush().await?;

        let temp_path = self.snapshot_path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, serde_json::to_vec_pretty(&data.to_snapshot())?).await?;
        tokio::fs::rename(&temp_path, &self.snapshot_path).await?;

        *version = next;
        info!(version = next, "Saved project");
        Ok(next)
    }
}

#[derive(Default)]
struct MemoryState {
    data: ProjectData,
    version: u64,
    saved: Vec<ChangeSet>,
    failures: usize,
}

/// In-memory persistence, mostly for tests
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<MemoryState>,
}

impl MemoryPersistence {
    pub fn new(data: ProjectData) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                data,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` saves fail
    pub fn fail_next_saves(&self, count: usize) {
        self.state().failures = count;
    }

    pub fn data(&self) -> ProjectData {
        self.state().data.clone()
    }

    pub fn version(&self) -> u64 {
        self.state().version
    }

    /// Ids of every saved change set, in save order
    pub fn saved_ids(&self) -> Vec<String> {
        self.state().saved.iter().map(|c| c.id.clone()).collect()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load(&self) -> PersistenceResult<ProjectSnapshot> {
        Ok(self.state().data.to_snapshot())
    }

    async fn save(&self, change_sets: &[ChangeSet]) -> PersistenceResult<u64> {
        let mut state = self.state();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(PersistenceError::Unavailable("save rejected".into()));
        }

        let mut data = state.data.clone();
        apply_change_sets(&mut data, change_sets)?;
        state.data = data;
        state.version += change_sets.len() as u64;
        state.saved.extend_from_slice(change_sets);
        Ok(state.version)
    }
}
