//! Remote control plane
//!
//! The operator side of a mission lives on a peer server. This module defines the
//! contract the controller polls (one-shot start signal, one-shot command) and pushes
//! status events to, plus:
//! - `HttpControlChannel`: the HTTP implementation used on the robot
//! - `LocalPeer`: an in-process peer for simulation and tests
//! - `MissionLedger`: reconstruction of mission runs from the status stream
//!
//! Every channel operation is infallible from the caller's point of view. Transport
//! failures degrade to "not started" / `ControlCommand::None` / a dropped event and are
//! logged where they happen.

mod http;
mod ledger;
mod local;

pub use http::{ChannelError, HttpControlChannel};
pub use ledger::{MissionLedger, MissionRun, RunPhase};
pub use local::LocalPeer;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::core::ControlCommand;

/// Status vocabulary understood by the control-plane peer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for start or go-home
    MissionIdle,
    /// Start received
    MissionStarted,
    /// Localization wait began
    WaitingForLocalization,
    /// Gate settled
    LocalizationOk,
    /// Gate did not settle in time; mission proceeds
    LocalizationTimeout,
    /// Attempt at a waypoint began
    MovingToWaypoint,
    /// Waypoint reached
    WaypointReached,
    /// One attempt failed
    WaypointFailedAttempt,
    /// Retry budget spent
    WaypointUnreachable,
    /// Home goal about to be sent
    ReturningHome,
    /// Home reached after a normal run
    MissionComplete,
    /// Home reached after an abort or forced return
    MissionCompleteAfterAbort,
    /// Home goal failed
    HomeUnreachableDuringMission,
    /// Operator abort took effect
    MissionAbortedByOperator,
    /// Operator go-home took effect
    ReturnHomeRequested,
    /// Localization seeded from home
    InitialposePublishedFromHome,
    /// Waypoint document or settings unusable
    PoseFileError,
}

impl Status {
    /// Wire name posted to the peer
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::MissionIdle => "mission_idle",
            Status::MissionStarted => "mission_started",
            Status::WaitingForLocalization => "waiting_for_localization",
            Status::LocalizationOk => "localization_ok",
            Status::LocalizationTimeout => "localization_timeout",
            Status::MovingToWaypoint => "moving_to_waypoint",
            Status::WaypointReached => "waypoint_reached",
            Status::WaypointFailedAttempt => "waypoint_failed_attempt",
            Status::WaypointUnreachable => "waypoint_unreachable",
            Status::ReturningHome => "returning_home",
            Status::MissionComplete => "mission_complete",
            Status::MissionCompleteAfterAbort => "mission_complete_after_abort",
            Status::HomeUnreachableDuringMission => "home_unreachable_during_mission",
            Status::MissionAbortedByOperator => "mission_aborted_by_operator",
            Status::ReturnHomeRequested => "return_home_requested",
            Status::InitialposePublishedFromHome => "initialpose_published_from_home",
            Status::PoseFileError => "pose_file_error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status report: a vocabulary entry plus free-form fields
#[derive(Clone, Debug, PartialEq)]
pub struct StatusEvent {
    /// Vocabulary entry
    pub status: Status,
    /// Extra fields such as `index`, `id`, `attempt` or `mode`
    pub fields: Map<String, Value>,
}

impl StatusEvent {
    /// Event with no extra fields
    pub fn new(status: Status) -> Self {
        StatusEvent {
            status,
            fields: Map::new(),
        }
    }

    /// Adds a field, replacing any previous value under the same key
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Field by name
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// `index` field as an integer, if present
    pub fn index(&self) -> Option<usize> {
        self.field("index").and_then(Value::as_u64).map(|i| i as usize)
    }

    /// JSON body posted to the peer: `{"status": ..., <fields>}`
    pub fn to_payload(&self) -> Value {
        let mut body = self.fields.clone();
        body.insert("status".to_string(), Value::from(self.status.as_str()));
        Value::Object(body)
    }
}

impl From<Status> for StatusEvent {
    fn from(status: Status) -> Self {
        StatusEvent::new(status)
    }
}

/// Polling contract with the control-plane peer.
///
/// `poll_mission_start` and `poll_command` consume what they return: the peer resets
/// the start flag and the pending command after one delivery. `emit_status` is
/// fire-and-forget and must not fail the caller.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteControlChannel {
    /// True once per start request
    fn poll_mission_start(&mut self) -> bool;
    /// Pending operator command, `None` when there is nothing new
    fn poll_command(&mut self) -> ControlCommand;
    /// Reports one status event
    fn emit_status(&mut self, event: &StatusEvent);
}

impl<T: RemoteControlChannel + ?Sized> RemoteControlChannel for &mut T {
    fn poll_mission_start(&mut self) -> bool {
        (**self).poll_mission_start()
    }

    fn poll_command(&mut self) -> ControlCommand {
        (**self).poll_command()
    }

    fn emit_status(&mut self, event: &StatusEvent) {
        (**self).emit_status(event)
    }
}
