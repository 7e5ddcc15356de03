//! Merge rules: defaults applied before any file or environment source.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("tracker.watch_paths", Vec::<String>::new())?
        .set_default("tracker.retention_days", 7)?
        .set_default("tracker.enable_auto_commit", true)?
        .set_default("tracker.repo_root", ".configtracker")?
        .set_default("tracker.poll_interval_ms", 2000)?
        .set_default("tracker.queue_capacity", 64)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stdout")
}
