use crate::track::SessionTrackerOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Options of a [`Runner`](crate::Runner).
///
/// Durations are given in milliseconds; `0` means unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Application name; first component of every session key.
    pub app_name: String,
    /// Backend timeout applied to each run.
    pub timeout_ms: u64,
    /// Poll period of the messages snapshot follow loop.
    pub flush_interval_ms: u64,
    pub messages_snapshot_follow_enabled: bool,
    pub messages_snapshot_follow_max_duration_ms: u64,
    /// Propagate cancellation of the caller's context to the run.
    pub cancel_on_context_done_enabled: bool,
    pub graph_node_lifecycle_activity_enabled: bool,
    pub graph_node_interrupt_activity_enabled: bool,
    pub graph_node_interrupt_activity_top_level_only: bool,
    /// Merge consecutive text deltas before persisting them.
    pub track_aggregation_enabled: bool,
    /// Period of the background tracker flush; `0` disables it.
    pub track_flush_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            timeout_ms: 0,
            flush_interval_ms: 0,
            messages_snapshot_follow_enabled: false,
            messages_snapshot_follow_max_duration_ms: 0,
            cancel_on_context_done_enabled: false,
            graph_node_lifecycle_activity_enabled: false,
            graph_node_interrupt_activity_enabled: false,
            graph_node_interrupt_activity_top_level_only: false,
            track_aggregation_enabled: true,
            track_flush_interval_ms: 0,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl RunnerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        millis(self.timeout_ms)
    }

    pub fn flush_interval(&self) -> Option<Duration> {
        millis(self.flush_interval_ms)
    }

    pub fn follow_max_duration(&self) -> Option<Duration> {
        millis(self.messages_snapshot_follow_max_duration_ms)
    }

    pub fn track_flush_interval(&self) -> Option<Duration> {
        millis(self.track_flush_interval_ms)
    }

    /// Parse a JSON config document.
    pub fn from_json_slice(raw: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_slice(&raw)
    }

    /// Options for a [`SessionTracker`](crate::track::SessionTracker) built
    /// alongside this runner.
    pub fn tracker_options(&self) -> SessionTrackerOptions {
        SessionTrackerOptions {
            aggregation_enabled: self.track_aggregation_enabled,
            flush_interval: self.track_flush_interval(),
        }
    }
}
