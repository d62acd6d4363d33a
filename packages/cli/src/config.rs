use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use trellis_resources::ResourceEngineConfig;

pub const DEFAULT_CONFIG_NAME: &str = "trellis.config.json";

/// Trellis configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Project snapshot used when a command is not given one
    pub snapshot_path: String,

    /// Endpoint that loads resource batches; requests are fetched directly when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader_url: Option<String>,

    pub resource_flush_delay_ms: u64,
    pub max_pending_resources: usize,

    /// Interval at which editing sessions save their changes
    pub sync_interval_ms: u64,

    /// Undo history kept by editing sessions
    pub undo_levels: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: "project.json".to_string(),
            loader_url: None,
            resource_flush_delay_ms: 1000,
            max_pending_resources: 5,
            sync_interval_ms: 5000,
            undo_levels: 100,
        }
    }
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Snapshot given on the command line, or the configured one
    pub fn resolve_snapshot(&self, cwd: &str, explicit: Option<&PathBuf>) -> PathBuf {
        match explicit {
            Some(path) => PathBuf::from(cwd).join(path),
            None => PathBuf::from(cwd).join(&self.snapshot_path),
        }
    }

    pub fn resource_engine_config(&self) -> ResourceEngineConfig {
        ResourceEngineConfig {
            flush_delay: Duration::from_millis(self.resource_flush_delay_ms),
            batch_size: self.max_pending_resources,
        }
    }
}
