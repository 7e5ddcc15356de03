//! Configuration loading feeding a live tracker

use crate::integration::test_utils::{replace_file, wait_until};
use conftrack::config::{ConfigLoader, Settings};
use conftrack::error::TrackerError;
use conftrack::tracker::TrackerCoordinator;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_tracker_runs_from_loaded_file() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("etc");
    fs::create_dir_all(&watched).unwrap();
    let config_file = temp_dir.path().join("conftrack.toml");
    fs::write(
        &config_file,
        format!(
            "[tracker]\nwatch_paths = [{:?}]\nrepo_root = {:?}\npoll_interval_ms = 50\nretention_days = 0\n",
            watched.display().to_string(),
            temp_dir.path().join("history").display().to_string(),
        ),
    )
    .unwrap();

    let settings = ConfigLoader::load(Some(&config_file)).unwrap();
    assert_eq!(settings.tracker.retention_days, 0);
    assert!(settings.tracker.enable_auto_commit);

    let mut tracker = TrackerCoordinator::new(settings.tracker).unwrap();
    tracker.start().unwrap();
    replace_file(&watched.join("app.conf"), "debug=false", None);
    assert!(wait_until(|| tracker.list_commits().unwrap().len() == 1));
    tracker.stop();
}

#[test]
fn test_invalid_values_rejected_at_load() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("conftrack.toml");
    fs::write(&config_file, "[tracker]\npoll_interval_ms = 0\n").unwrap();

    let result = ConfigLoader::load(Some(&config_file));
    assert!(matches!(result, Err(TrackerError::Config(_))));
}

#[test]
fn test_malformed_toml_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("conftrack.toml");
    fs::write(&config_file, "[tracker\nretention_days = ").unwrap();

    assert!(matches!(
        ConfigLoader::load(Some(&config_file)),
        Err(TrackerError::Config(_))
    ));
}

#[test]
fn test_default_settings_render_as_loadable_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("conftrack.toml");
    Settings::default().write_to(&config_file).unwrap();

    let rendered = fs::read_to_string(&config_file).unwrap();
    assert!(rendered.contains("[tracker]"));
    assert!(rendered.contains("[logging]"));

    let loaded = ConfigLoader::load(Some(&config_file)).unwrap();
    assert_eq!(loaded.tracker, Settings::default().tracker);
}
