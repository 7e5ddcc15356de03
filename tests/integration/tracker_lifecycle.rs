//! End-to-end tests for the tracker: detection, auto-commit, restore, restart

use crate::integration::test_utils::{later, replace_file, settle, wait_until, FAST_POLL};
use chrono::{Duration as ChronoDuration, Utc};
use conftrack::error::{StoreError, TrackerError};
use conftrack::store::{SledSnapshotStore, SnapshotStore};
use conftrack::tracker::{TrackerCoordinator, MANUAL_COMMIT_MESSAGE};
use conftrack::TrackConfig;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    _temp_dir: TempDir,
    watched: PathBuf,
    history: PathBuf,
}

fn fixture() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("watched");
    fs::create_dir_all(&watched).unwrap();
    let history = temp_dir.path().join("history");
    Fixture {
        watched,
        history,
        _temp_dir: temp_dir,
    }
}

fn config_for(fixture: &Fixture) -> TrackConfig {
    TrackConfig::new([fixture.watched.clone()])
        .with_repo_root(&fixture.history)
        .with_poll_interval(FAST_POLL)
}

fn commit_count(tracker: &TrackerCoordinator) -> usize {
    tracker.list_commits().unwrap().len()
}

/// Create a file, then append to it: one commit per change, chained.
#[test]
fn test_create_then_modify_produces_chained_commits() {
    let fixture = fixture();
    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();
    tracker.start().unwrap();
    assert!(tracker.list_commits().unwrap().is_empty());

    let conf = fixture.watched.join("a.conf");
    replace_file(&conf, "x=1", None);
    assert!(wait_until(|| commit_count(&tracker) == 1));
    settle();
    assert_eq!(commit_count(&tracker), 1);

    replace_file(&conf, "x=1\ny=2", Some(later(5)));
    assert!(wait_until(|| commit_count(&tracker) == 2));
    settle();
    assert_eq!(commit_count(&tracker), 2);

    let log = tracker.log().unwrap();
    assert_eq!(log[0].parent, Some(log[1].id));
    assert_eq!(log[1].parent, None);
    assert!(log[0].timestamp >= log[1].timestamp);
    assert_eq!(
        tracker.file_at(&log[1].id, "a.conf").unwrap().unwrap(),
        b"x=1".to_vec()
    );
    assert_eq!(
        tracker.file_at(&log[0].id, "a.conf").unwrap().unwrap(),
        b"x=1\ny=2".to_vec()
    );
    for record in &log {
        assert!(record.message.starts_with("Auto commit: "));
        assert!(record.message.ends_with("a.conf changed"));
    }

    let stats = tracker.stats();
    assert_eq!(stats.auto_commits, 2);
    assert_eq!(stats.auto_commit_failures, 0);
    tracker.stop();
}

#[test]
fn test_no_commits_after_stop() {
    let fixture = fixture();
    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();
    tracker.start().unwrap();
    tracker.stop();
    assert!(!tracker.is_running());

    replace_file(&fixture.watched.join("late.conf"), "x=1", None);
    settle();
    assert!(tracker.list_commits().unwrap().is_empty());
}

#[test]
fn test_stop_drains_observed_changes() {
    let fixture = fixture();
    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();
    tracker.start().unwrap();

    replace_file(&fixture.watched.join("a.conf"), "x=1", None);
    assert!(wait_until(|| tracker.stats().events_observed >= 1));
    tracker.stop();

    assert_eq!(commit_count(&tracker), 1);
}

#[test]
fn test_auto_commit_disabled_observes_without_committing() {
    let fixture = fixture();
    let mut tracker =
        TrackerCoordinator::new(config_for(&fixture).with_auto_commit(false)).unwrap();
    tracker.start().unwrap();

    replace_file(&fixture.watched.join("a.conf"), "x=1", None);
    assert!(wait_until(|| tracker.stats().events_observed >= 1));
    settle();
    assert!(tracker.list_commits().unwrap().is_empty());

    let id = tracker.manual_commit().unwrap();
    assert_eq!(tracker.log().unwrap()[0].message, MANUAL_COMMIT_MESSAGE);
    assert_eq!(tracker.latest_commit().unwrap(), Some(id));
    tracker.stop();
}

#[test]
fn test_watch_path_created_after_start() {
    let fixture = fixture();
    let conf = fixture.watched.join("later.conf");
    let config = TrackConfig::new([conf.clone()])
        .with_repo_root(&fixture.history)
        .with_poll_interval(FAST_POLL);
    let mut tracker = TrackerCoordinator::new(config).unwrap();
    tracker.start().unwrap();
    settle();
    assert!(tracker.list_commits().unwrap().is_empty());

    replace_file(&conf, "port=80", None);
    assert!(wait_until(|| commit_count(&tracker) == 1));
    tracker.stop();
}

#[test]
fn test_restore_rewrites_history_working_tree() {
    let fixture = fixture();
    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();
    tracker.start().unwrap();

    let conf = fixture.watched.join("a.conf");
    replace_file(&conf, "x=1", None);
    assert!(wait_until(|| commit_count(&tracker) == 1));
    replace_file(&conf, "x=2", Some(later(5)));
    assert!(wait_until(|| commit_count(&tracker) == 2));
    tracker.stop();

    let first = tracker.log().unwrap()[1].id;
    let restored = tracker.restore_to(&first.to_hex()).unwrap();
    assert_eq!(restored, first);
    assert_eq!(tracker.latest_commit().unwrap(), Some(first));
    assert_eq!(
        fs::read_to_string(fixture.history.join("a.conf")).unwrap(),
        "x=1"
    );
    // The watched original is left alone.
    assert_eq!(fs::read_to_string(&conf).unwrap(), "x=2");
}

#[test]
fn test_restore_unknown_hash() {
    let fixture = fixture();
    let mut tracker =
        TrackerCoordinator::new(config_for(&fixture).with_auto_commit(false)).unwrap();
    tracker.start().unwrap();

    let result = tracker.restore_to(&"ab".repeat(32));
    assert!(matches!(
        result,
        Err(TrackerError::Store(StoreError::InvalidReference(_)))
    ));
    let result = tracker.restore_to("not-a-hash");
    assert!(matches!(
        result,
        Err(TrackerError::Store(StoreError::InvalidReference(_)))
    ));
    tracker.stop();
}

#[test]
fn test_restart_reuses_history() {
    let fixture = fixture();
    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();

    tracker.start().unwrap();
    let first = tracker.manual_commit().unwrap();
    tracker.stop();

    tracker.start().unwrap();
    assert_eq!(tracker.latest_commit().unwrap(), Some(first));
    let second = tracker.manual_commit().unwrap();
    let log = tracker.log().unwrap();
    assert_eq!(log[0].id, second);
    assert_eq!(log[0].parent, Some(first));
    tracker.stop();

    drop(tracker);
    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();
    tracker.start().unwrap();
    assert_eq!(tracker.list_commits().unwrap(), vec![second, first]);
    tracker.stop();
}

#[test]
fn test_start_sweeps_existing_history() {
    let fixture = fixture();
    {
        let mut store = SledSnapshotStore::open(&fixture.history).unwrap();
        store
            .commit_at("old", Utc::now() - ChronoDuration::days(30))
            .unwrap();
        store.commit("recent").unwrap();
    }

    let mut tracker =
        TrackerCoordinator::new(config_for(&fixture).with_retention_days(7)).unwrap();
    tracker.start().unwrap();

    let report = tracker.clean_old().unwrap();
    assert_eq!(report.window_days, 7);
    assert_eq!(report.examined, 2);
    assert_eq!(report.eligible_count(), 1);
    // Reporting only: nothing is removed.
    assert_eq!(commit_count(&tracker), 2);
    tracker.stop();
}

#[test]
fn test_start_fails_when_history_root_is_a_file() {
    let fixture = fixture();
    fs::write(&fixture.history, "not a directory").unwrap();

    let mut tracker = TrackerCoordinator::new(config_for(&fixture)).unwrap();
    let result = tracker.start();
    assert!(matches!(
        result,
        Err(TrackerError::Store(StoreError::InitFailure { .. }))
    ));
    assert!(!tracker.is_running());
}
