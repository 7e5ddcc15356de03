//! Conftrack: Configuration Change Tracking
//!
//! Watches configuration files by polling, commits every detected change into
//! a local content-addressed history, and lets the working copy be restored to
//! any recorded commit.

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod tracker;
pub mod types;
pub mod watch;

pub use config::{ConfigLoader, Settings, TrackConfig};
pub use error::{StoreError, TrackerError, WatchError};
pub use store::{CommitRecord, RetentionReport, SledSnapshotStore, SnapshotStore};
pub use tracker::{TrackerCoordinator, TrackerStats};
pub use types::{CommitId, ObjectId};
pub use watch::{ChangeDetector, ChangeEvent, DetectorState};
