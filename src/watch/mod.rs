//! Change Detector
//!
//! Polls a set of watched files and directories on a fixed interval and turns
//! timestamp differences into [`ChangeEvent`]s. No OS-level event subscription
//! is used.
//!
//! The detector moves through `Idle -> Watching -> Stopped`. Exactly one
//! polling thread runs while watching; it owns the timestamp map, and the
//! detector talks to it only through a control channel.

pub mod scan;

pub use scan::PollState;

use crate::error::WatchError;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default interval between full scans of all watched paths
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Filesystem change notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created(_) => "created",
            ChangeEvent::Modified(_) => "modified",
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => path,
        }
    }
}

/// Detector lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Watching,
    Stopped,
}

enum Control {
    AddWatch(PathBuf),
    Stop,
}

/// Polling change detector
pub struct ChangeDetector {
    paths: Vec<PathBuf>,
    interval: Duration,
    state: DetectorState,
    control: Option<mpsc::Sender<Control>>,
    handle: Option<JoinHandle<()>>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            paths: Vec::new(),
            interval,
            state: DetectorState::Idle,
            control: None,
            handle: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Registered paths in registration order
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Register a path to watch. The path need not exist yet.
    ///
    /// Returns `false` if the path was already registered. Paths added while
    /// watching are picked up from the next cycle.
    pub fn add_watch<P: AsRef<Path>>(&mut self, path: P) -> Result<bool, WatchError> {
        if self.state == DetectorState::Stopped {
            return Err(WatchError::Stopped);
        }

        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if self.paths.contains(&path) {
            return Ok(false);
        }

        info!(path = %path.display(), "Watching path");
        self.paths.push(path.clone());

        if let Some(control) = &self.control {
            if control.send(Control::AddWatch(path)).is_err() {
                warn!("Polling thread is gone; watch registration not delivered");
            }
        }
        Ok(true)
    }

    /// Spawn the polling thread. `on_change` runs on that thread, synchronously,
    /// once per detected change; the scan does not advance until it returns.
    pub fn start_watching<F>(&mut self, on_change: F) -> Result<(), WatchError>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        match self.state {
            DetectorState::Idle => {}
            DetectorState::Watching => return Err(WatchError::AlreadyStarted),
            DetectorState::Stopped => return Err(WatchError::Stopped),
        }

        let (control_tx, control_rx) = mpsc::channel();
        let paths = self.paths.clone();
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("conftrack-poll".to_string())
            .spawn(move || poll_loop(paths, interval, control_rx, on_change))
            .map_err(WatchError::Spawn)?;

        info!(
            paths = self.paths.len(),
            interval_ms = interval.as_millis() as u64,
            "Start watching"
        );
        self.control = Some(control_tx);
        self.handle = Some(handle);
        self.state = DetectorState::Watching;
        Ok(())
    }

    /// Stop polling and block until the polling thread has exited.
    ///
    /// No callback runs after this returns. Stopping is terminal; calling it
    /// again is a no-op.
    pub fn stop(&mut self) {
        if self.state == DetectorState::Stopped {
            return;
        }

        if let Some(control) = self.control.take() {
            // A send error only means the thread already exited.
            let _ = control.send(Control::Stop);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Polling thread panicked");
            }
        }

        self.state = DetectorState::Stopped;
        info!("Stop watching");
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop<F>(
    mut paths: Vec<PathBuf>,
    interval: Duration,
    control: mpsc::Receiver<Control>,
    mut on_change: F,
) where
    F: FnMut(ChangeEvent),
{
    let mut state = PollState::new();

    loop {
        for path in &paths {
            state.check_path(path, &mut on_change);
        }

        let deadline = Instant::now() + interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match control.recv_timeout(remaining) {
                Ok(Control::AddWatch(path)) => {
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    debug!(observed = state.len(), "Polling loop exiting");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => break,
            }
        }
    }
}
