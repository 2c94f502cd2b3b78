//! Waypoint mission controller for mobile robots
//!
//! This library runs a fixed patrol of waypoints on a robot driven by an external
//! motion stack, including localization gating, bounded per-waypoint retries, image
//! capture hooks and operator abort / return-home from a remote control plane.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod control;
/// Value types, configuration and localization gating
pub mod core;
pub mod navigation;
#[cfg(feature = "ros")]
pub mod ros_interface;

// Re-export commonly used items for easier access
pub use crate::control::{HttpControlChannel, LocalPeer, RemoteControlChannel, Status, StatusEvent};
pub use crate::core::{
    Clock, ConfigError, ControlCommand, HomeReturnMode, MissionSettings, MissionState, Pose,
    PoseFeed, SystemClock, WaypointSet,
};
pub use crate::navigation::{
    CycleOutcome, HomeOutcome, MissionController, MotionExecutor, SimulatedExecutor,
};

use thiserror::Error;

/// Errors that stop the controller from starting
#[derive(Debug, Error)]
pub enum MissionError {
    /// Waypoint file or settings could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Control-plane client could not be built
    #[error("control channel error: {0}")]
    Channel(#[from] control::ChannelError),

    /// Ctrl+C handler could not be installed
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// ROS 2 node, topic or client setup failed
    #[cfg(feature = "ros")]
    #[error("ROS error: {0}")]
    Ros(#[from] ros_interface::RosError),

    /// Requested backend is not compiled in
    #[error("{0} is not available in this build")]
    Unsupported(&'static str),
}
