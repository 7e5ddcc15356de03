//! Error types for the configuration tracker.

use crate::types::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Snapshot store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Snapshot store not initialized")]
    NotInitialized,

    #[error("Failed to initialize history root {root:?}: {reason}")]
    InitFailure { root: PathBuf, reason: String },

    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Commit {message:?} failed: {reason}")]
    CommitFailure { message: String, reason: String },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: ObjectId, actual: ObjectId },

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(format!("sled: {}", err))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Backend(format!("encoding: {}", err))
    }
}

/// Change detector errors
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Detector is already watching")]
    AlreadyStarted,

    #[error("Detector has been stopped")]
    Stopped,

    #[error("Failed to spawn polling thread: {0}")]
    Spawn(std::io::Error),
}

/// Tracker-level errors
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Tracker has not been started")]
    NotStarted,

    #[error("Tracker is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

impl From<config::ConfigError> for TrackerError {
    fn from(err: config::ConfigError) -> Self {
        TrackerError::Config(err.to_string())
    }
}
