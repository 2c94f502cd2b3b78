// tests/config_tests.rs
// Loading the waypoint document and the settings file from disk.

use rstest::rstest;
use std::io::Write;
use tempfile::NamedTempFile;

use waypoint_mission::core::{ConfigError, MissionSettings, WaypointSet};

fn file_with(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const VALID: &str = r#"
map_frame: map
home: {x: 0.0, y: 0.0, qz: 0.0, qw: 1.0}
waypoints:
  - {id: dock, x: 1.5, y: -0.5, qz: 0.7071, qw: 0.7071}
  - {x: 3.0, y: 2.0, qz: 0.0, qw: 1.0, frame_id: map}
"#;

#[test]
fn loads_a_recorded_patrol() {
    let file = file_with(VALID);
    let set = WaypointSet::load(file.path()).unwrap();

    assert_eq!(set.frame(), "map");
    assert_eq!(set.len(), 2);
    assert_eq!(set.home().id, "home");
    assert_eq!(set.targets()[0].id, "dock");
    assert_eq!(set.targets()[1].id, "wp1");
    assert!((set.targets()[0].yaw() - std::f64::consts::FRAC_PI_2).abs() < 1e-3);
}

#[rstest]
#[case::empty_list("home: {x: 0, y: 0, qz: 0, qw: 1}\nwaypoints: []\n")]
#[case::no_list("home: {x: 0, y: 0, qz: 0, qw: 1}\n")]
fn rejects_missing_waypoints(#[case] doc: &str) {
    let file = file_with(doc);
    assert!(matches!(
        WaypointSet::load(file.path()),
        Err(ConfigError::MissingWaypoints)
    ));
}

#[test]
fn rejects_home_recorded_in_another_frame() {
    let file = file_with(
        "map_frame: map\n\
         home: {x: 0, y: 0, qz: 0, qw: 1, frame_id: odom}\n\
         waypoints:\n  - {x: 1, y: 0, qz: 0, qw: 1}\n",
    );
    match WaypointSet::load(file.path()) {
        Err(ConfigError::FrameMismatch { pose, frame, map_frame }) => {
            assert_eq!(pose, "home");
            assert_eq!(frame, "odom");
            assert_eq!(map_frame, "map");
        }
        other => panic!("expected frame mismatch, got {:?}", other),
    }
}

#[test]
fn rejects_missing_home() {
    let file = file_with("waypoints:\n  - {x: 1, y: 0, qz: 0, qw: 1}\n");
    assert!(matches!(
        WaypointSet::load(file.path()),
        Err(ConfigError::MissingHome)
    ));
}

#[test]
fn absent_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waypoints.yaml");
    assert!(matches!(
        WaypointSet::load(&path),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn partial_settings_keep_defaults() {
    let file = file_with(
        "server_base: http://10.0.0.5:5000\n\
         max_waypoint_retries: 5\n\
         localization:\n  timeout_sec: 10.0\n",
    );
    let settings = MissionSettings::load(file.path()).unwrap();

    assert_eq!(settings.server_base, "http://10.0.0.5:5000");
    assert_eq!(settings.max_waypoint_retries, 5);
    assert_eq!(settings.localization.timeout().as_secs(), 10);
    assert_eq!(settings.localization.max_pos_jump_m, 0.08);
    assert_eq!(settings.settle_ticks, 10);
    assert!(settings.seed_initial_pose_from_home);
}

#[test]
fn malformed_settings_are_rejected() {
    let file = file_with("max_waypoint_retries: [not, a, number]\n");
    assert!(matches!(
        MissionSettings::load(file.path()),
        Err(ConfigError::Malformed(_))
    ));
}

#[rstest]
#[case::negative_motion_tick("motion_poll_sec: -0.1\nhttp_timeout_sec: -1\n", "http_timeout_sec")]
#[case::negative_http_timeout("http_timeout_sec: -1\n", "http_timeout_sec")]
#[case::zero_idle_tick("idle_poll_sec: 0\n", "idle_poll_sec")]
#[case::nan_motion_tick("motion_poll_sec: .nan\n", "motion_poll_sec")]
#[case::zero_retries("max_waypoint_retries: 0\n", "max_waypoint_retries")]
#[case::negative_window("localization:\n  stable_window_sec: -2.5\n", "localization.stable_window_sec")]
#[case::infinite_timeout("localization:\n  timeout_sec: .inf\n", "localization.timeout_sec")]
#[case::huge_timeout("localization:\n  timeout_sec: 1.0e30\n", "localization.timeout_sec")]
fn out_of_range_settings_fail_to_load(#[case] doc: &str, #[case] expected: &str) {
    let file = file_with(doc);
    match MissionSettings::load(file.path()) {
        Err(ConfigError::InvalidSetting { field, .. }) => assert_eq!(field, expected),
        other => panic!("expected invalid setting, got {:?}", other),
    }
}

#[test]
fn zero_localization_timeout_loads() {
    let file = file_with("localization:\n  timeout_sec: 0\n");
    let settings = MissionSettings::load(file.path()).unwrap();
    assert!(settings.localization.timeout().is_zero());
}
