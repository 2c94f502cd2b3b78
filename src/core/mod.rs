// core/mod.rs

// Value types, configuration and localization gating shared by the navigation and
// control layers. Nothing in here talks to the network or the motion stack.

/// Time source for every wait in the loop
pub mod clock;
/// Settings file and configuration errors
pub mod config;
/// Stability gate, pose hand-off and initial pose seeding
pub mod localization;
/// Planar pose value type and heading helpers
pub mod pose;
/// Mission phases and operator commands
pub mod state;
/// Waypoint document loading and validation
pub mod waypoints;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GateSettings, MissionSettings};
pub use localization::{
    InitialPosePublisher, InitialPoseSeed, LocalizationError, LocalizationTracker, PoseFeed,
    Stability, StabilityGate, StabilityWindow,
};
pub use pose::{Pose, dist, quat_to_yaw, yaw_diff};
pub use state::{ControlCommand, HomeReturnMode, MissionState};
pub use waypoints::WaypointSet;
