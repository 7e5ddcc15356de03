//! Configuration System
//!
//! [`TrackConfig`] is the value object the tracker is constructed with. It can
//! be built in code or loaded through [`ConfigLoader`], which layers defaults,
//! an optional TOML file and `CONFTRACK_*` environment overrides.

use crate::error::TrackerError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

/// Tracker configuration. Immutable once handed to the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Files or directories to poll, in scan order. They need not exist yet.
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,

    /// Retention window in days (0 disables sweeps)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Commit automatically on every detected change
    #[serde(default = "default_true")]
    pub enable_auto_commit: bool,

    /// History root: object database plus working tree
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,

    /// Interval between full scans, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the queue between detection and the commit worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_retention_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".configtracker")
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            retention_days: default_retention_days(),
            enable_auto_commit: default_true(),
            repo_root: default_repo_root(),
            poll_interval_ms: default_poll_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl TrackConfig {
    pub fn new<I, P>(watch_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            watch_paths: watch_paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_repo_root<P: Into<PathBuf>>(mut self, repo_root: P) -> Self {
        self.repo_root = repo_root.into();
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.enable_auto_commit = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.repo_root.as_os_str().is_empty() {
            return Err(TrackerError::Config("repo_root cannot be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(TrackerError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TrackerError::Config(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(empty) = self.watch_paths.iter().position(|p| p.as_os_str().is_empty()) {
            return Err(TrackerError::Config(format!(
                "watch_paths[{}] is empty",
                empty
            )));
        }
        Ok(())
    }
}

/// Root of a configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tracker: TrackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn to_toml_string(&self) -> Result<String, TrackerError> {
        toml::to_string_pretty(self)
            .map_err(|e| TrackerError::Config(format!("Failed to serialize settings: {}", e)))
    }

    /// Write these settings as a TOML file loadable by [`ConfigLoader`]
    pub fn write_to(&self, path: &Path) -> Result<(), TrackerError> {
        let rendered = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Config(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
        std::fs::write(path, rendered)
            .map_err(|e| TrackerError::Config(format!("Failed to write {:?}: {}", path, e)))
    }
}

/// Layered settings loader
///
/// Precedence (highest first):
/// 1. Environment: `CONFTRACK_TRACKER__RETENTION_DAYS=3`,
///    `CONFTRACK_TRACKER__WATCH_PATHS=/etc/a,/etc/b`, ...
/// 2. The TOML file passed to [`ConfigLoader::load`], if any
/// 3. Defaults
pub struct ConfigLoader;

impl ConfigLoader {
    pub const ENV_PREFIX: &'static str = "CONFTRACK";

    pub fn load(config_file: Option<&Path>) -> Result<Settings, TrackerError> {
        let mut builder = merge::builder_with_defaults()?;
        if let Some(path) = config_file {
            builder = sources::add_file(builder, path)?;
        }
        builder = sources::add_environment(builder);

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.tracker.validate()?;
        Ok(settings)
    }
}
