//! Integration tests for the polling change detector

use crate::integration::test_utils::{later, replace_file, settle, wait_until, FAST_POLL};
use conftrack::watch::{ChangeDetector, ChangeEvent, DetectorState};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn recording_detector() -> (ChangeDetector, Arc<Mutex<Vec<ChangeEvent>>>) {
    (
        ChangeDetector::with_interval(FAST_POLL),
        Arc::new(Mutex::new(Vec::new())),
    )
}

#[test]
fn test_existing_files_reported_once_then_modifications() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("etc");
    fs::create_dir_all(&watched).unwrap();
    fs::write(watched.join("b.conf"), "b").unwrap();
    fs::write(watched.join("a.conf"), "a").unwrap();

    let (mut detector, events) = recording_detector();
    detector.add_watch(&watched).unwrap();
    let sink = Arc::clone(&events);
    detector
        .start_watching(move |event| sink.lock().unwrap().push(event))
        .unwrap();

    assert!(wait_until(|| events.lock().unwrap().len() == 2));
    settle();
    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        // Directory entries are scanned in sorted order.
        assert!(events[0].path().ends_with("a.conf"));
        assert!(events[1].path().ends_with("b.conf"));
        assert!(events.iter().all(|e| matches!(e, ChangeEvent::Created(_))));
    }

    replace_file(&watched.join("b.conf"), "b=2", Some(later(5)));
    assert!(wait_until(|| events.lock().unwrap().len() == 3));
    detector.stop();

    let events = events.lock().unwrap();
    assert!(matches!(&events[2], ChangeEvent::Modified(p) if p.ends_with("b.conf")));
}

#[test]
fn test_single_file_watch_ignores_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("etc");
    fs::create_dir_all(&watched).unwrap();
    let target = watched.join("target.conf");
    fs::write(&target, "t").unwrap();

    let (mut detector, events) = recording_detector();
    detector.add_watch(&target).unwrap();
    let sink = Arc::clone(&events);
    detector
        .start_watching(move |event| sink.lock().unwrap().push(event))
        .unwrap();

    assert!(wait_until(|| events.lock().unwrap().len() == 1));
    replace_file(&watched.join("sibling.conf"), "s", None);
    settle();
    detector.stop();

    assert_eq!(events.lock().unwrap().len(), 1);
}

#[test]
fn test_deleted_file_is_silent() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("etc");
    fs::create_dir_all(&watched).unwrap();
    fs::write(watched.join("gone.conf"), "x").unwrap();

    let (mut detector, events) = recording_detector();
    detector.add_watch(&watched).unwrap();
    let sink = Arc::clone(&events);
    detector
        .start_watching(move |event| sink.lock().unwrap().push(event))
        .unwrap();

    assert!(wait_until(|| events.lock().unwrap().len() == 1));
    fs::remove_file(watched.join("gone.conf")).unwrap();
    settle();
    detector.stop();

    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(detector.state(), DetectorState::Stopped);
}

#[test]
fn test_drop_stops_polling() {
    let temp_dir = TempDir::new().unwrap();
    let (mut detector, events) = recording_detector();
    detector.add_watch(temp_dir.path()).unwrap();
    let sink = Arc::clone(&events);
    detector
        .start_watching(move |event| sink.lock().unwrap().push(event))
        .unwrap();
    drop(detector);

    replace_file(&temp_dir.path().join("after.conf"), "x", None);
    settle();
    assert!(events.lock().unwrap().is_empty());
}
