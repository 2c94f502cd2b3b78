//! Navigation for waypoint missions
//!
//! This module drives the motion stack through a mission:
//! - `MotionExecutor`: the goal interface of the underlying planner/controller
//! - `WaypointRunner`: one waypoint with bounded retries and operator preemption
//! - `MissionController`: the idle / localize / execute / return-home state machine
//! - `SimulatedExecutor`: a scripted motion stack for dry runs and tests
//!
//! Calls into the motion stack that only prepare or tidy up (clearing costmaps,
//! cancelling a goal) are best-effort: a failure is logged through [`best_effort`] and
//! the mission carries on.

mod controller;
mod runner;
mod simulated;

pub use controller::{CycleOutcome, HomeOutcome, MissionController};
pub use runner::{WaypointOutcome, WaypointRunner};
pub use simulated::{SimulatedExecutor, SimulatedLocalization};

use log::warn;
use std::fmt;
use thiserror::Error;

use crate::core::Pose;

/// Opaque identifier of a submitted goal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GoalHandle(pub u64);

impl fmt::Display for GoalHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "goal#{}", self.0)
    }
}

/// Final result of a completed goal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalResult {
    /// Goal reached
    Succeeded,
    /// Aborted, cancelled or otherwise not reached
    Failed,
}

/// Snapshot of a goal while polling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalStatus {
    /// Still running
    Pending,
    /// Completed and reached
    Succeeded,
    /// Completed without reaching the goal
    Failed,
}

/// Motion stack errors
#[derive(Debug, Error)]
pub enum MotionError {
    /// Motion stack refused the request
    #[error("goal rejected: {0}")]
    Rejected(String),

    /// Handle not issued by this executor
    #[error("unknown goal {0}")]
    UnknownGoal(GoalHandle),

    /// Server absent or silent past the response timeout
    #[error("motion stack unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous goal interface of the motion stack
#[cfg_attr(test, mockall::automock)]
pub trait MotionExecutor {
    /// Sends a goal and returns immediately
    fn submit(&mut self, goal: &Pose) -> Result<GoalHandle, MotionError>;

    /// Non-blocking; true once the goal has a final result
    fn is_complete(&mut self, handle: GoalHandle) -> bool;

    /// Only meaningful once `is_complete` returned true
    fn result(&mut self, handle: GoalHandle) -> GoalResult;

    /// Requests cancellation of a goal in flight
    fn cancel(&mut self, handle: GoalHandle) -> Result<(), MotionError>;

    /// Clears stale cost/occupancy state before a new goal
    fn clear_transient_state(&mut self) -> Result<(), MotionError>;
}

/// Non-blocking completion check combining `is_complete` and `result`
pub fn poll_goal<E: MotionExecutor + ?Sized>(executor: &mut E, handle: GoalHandle) -> GoalStatus {
    if !executor.is_complete(handle) {
        return GoalStatus::Pending;
    }
    match executor.result(handle) {
        GoalResult::Succeeded => GoalStatus::Succeeded,
        GoalResult::Failed => GoalStatus::Failed,
    }
}

/// Image capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera produced nothing in time
    #[error("no camera frame within timeout")]
    NoFrame,

    /// Frames captured but not delivered
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Capture/upload collaborator triggered at every reached waypoint
#[cfg_attr(test, mockall::automock)]
pub trait ImageCapture {
    /// Returns the number of frames delivered
    fn capture(&mut self, index: usize, waypoint_id: &str, frames: u32) -> Result<u32, CaptureError>;
}

/// Capture port for deployments without a camera pipeline: logs and delivers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCapture;

impl ImageCapture for NoCapture {
    fn capture(&mut self, index: usize, waypoint_id: &str, frames: u32) -> Result<u32, CaptureError> {
        log::info!(
            "[IMG] waypoint {} ({}) reached, {} frame(s) requested, no capture pipeline",
            index,
            waypoint_id,
            frames
        );
        Ok(0)
    }
}

/// Logs and swallows the error of a best-effort call
pub fn best_effort<T, E: fmt::Display>(what: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("[NAV] {} failed (ignored): {}", what, e);
            None
        }
    }
}
