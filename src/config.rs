//! Engine configuration
//!
//! Tunables for the query layer: file-handle pool size, per-query channel
//! fan-out, and an optional default deadline. Loadable from a TOML file;
//! every field has a default so an empty file is valid.

use crate::error::{ArchiveError, ArchiveResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Query engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum block-file handles open (and reads in flight) at once.
    /// Excess requests queue rather than fail.
    #[serde(default = "default_max_open_files")]
    pub max_open_files: usize,

    /// Maximum channels processed concurrently within one query
    #[serde(default = "default_channel_parallelism")]
    pub channel_parallelism: usize,

    /// Default per-query deadline in milliseconds; `None` means no deadline
    /// unless the caller supplies one in `QueryOptions`
    #[serde(default)]
    pub default_deadline_ms: Option<u64>,
}

fn default_max_open_files() -> usize {
    64
}

fn default_channel_parallelism() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_open_files: default_max_open_files(),
            channel_parallelism: default_channel_parallelism(),
            default_deadline_ms: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| ArchiveError::Config(e.to_string()))
    }

    /// Default deadline as a `Duration`, if configured
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }
}
