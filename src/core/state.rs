// core/state.rs

// Mission lifecycle states and the operator command vocabulary. The controller owns the
// transitions; these types only name where it is and what the operator asked for.

// Dependencies
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator command delivered once by the control-plane peer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Nothing pending
    #[default]
    None,
    /// Stop the current goal and stay put
    Abort,
    /// Stop the current goal and drive home
    GoHome,
}

impl ControlCommand {
    /// Parses the peer's wire value; anything unrecognised reads as `None`
    pub fn from_wire(value: &str) -> Self {
        match value {
            "abort" => ControlCommand::Abort,
            "go_home" => ControlCommand::GoHome,
            _ => ControlCommand::None,
        }
    }

    /// Wire value the peer uses for this command
    pub fn as_wire(&self) -> &'static str {
        match self {
            ControlCommand::None => "none",
            ControlCommand::Abort => "abort",
            ControlCommand::GoHome => "go_home",
        }
    }
}

/// Why the robot is heading home
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeReturnMode {
    /// Every waypoint was attempted
    Normal,
    /// Operator requested go-home during a mission
    Forced,
    /// Operator requested go-home while no mission was running
    IdleGoHome,
}

impl HomeReturnMode {
    /// Value reported in the `mode` field of status events
    pub fn label(&self) -> &'static str {
        match self {
            HomeReturnMode::Normal => "normal",
            HomeReturnMode::Forced => "forced",
            HomeReturnMode::IdleGoHome => "idle_go_home",
        }
    }
}

impl fmt::Display for HomeReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Controller state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionState {
    /// Waiting for start or go-home
    Idle,
    /// Gate not settled yet
    AwaitingLocalization,
    /// Driving to the waypoint at this index
    ExecutingWaypoints(usize),
    /// Driving home
    ReturningHome(HomeReturnMode),
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MissionState::Idle => write!(f, "idle"),
            MissionState::AwaitingLocalization => write!(f, "awaiting_localization"),
            MissionState::ExecutingWaypoints(i) => write!(f, "executing_waypoint[{i}]"),
            MissionState::ReturningHome(mode) => write!(f, "returning_home({mode})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("none", ControlCommand::None)]
    #[case("abort", ControlCommand::Abort)]
    #[case("go_home", ControlCommand::GoHome)]
    #[case("GO_HOME", ControlCommand::None)]
    #[case("", ControlCommand::None)]
    fn wire_values(#[case] wire: &str, #[case] expected: ControlCommand) {
        assert_eq!(ControlCommand::from_wire(wire), expected);
    }
}
