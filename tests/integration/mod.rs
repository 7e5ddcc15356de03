//! Integration tests for the configuration change tracker

mod change_detector;
mod config_loading;
mod tracker_lifecycle;
