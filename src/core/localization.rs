// core/localization.rs

// Decides when the localization estimate can be trusted before a mission moves the
// robot. Samples arrive out-of-band from the localization pipeline through a single-slot
// hand-off (PoseFeed); the control loop drains it every tick and feeds the stability
// gate, which compares the newest sample against a time-anchored reference sample.

// Dependencies
use log::debug;
use nalgebra::{Matrix6, Vector6};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::config::GateSettings;
use super::pose::Pose;

/// Position variance (x and y) of the initial-pose prior, m²
pub const SEED_POSITION_VARIANCE: f64 = 0.25;
/// Yaw variance of the initial-pose prior, rad²
pub const SEED_YAW_VARIANCE: f64 = 0.30;

/// Errors from the initial-pose output
#[derive(Debug, Error)]
pub enum LocalizationError {
    /// The seed could not be delivered
    #[error("initial pose publish failed: {0}")]
    Publish(String),
}

/// Reference sample the gate measures drift against
#[derive(Clone, Debug, Default)]
pub struct StabilityWindow {
    /// Newest sample seen
    pub last_sample: Option<Pose>,
    /// Sample the open window is anchored on
    pub window_start: Option<Pose>,
    /// When the anchor arrived
    pub window_start_time: Option<Instant>,
}

/// Verdict of a stability check
#[derive(Clone, Debug, PartialEq)]
pub enum Stability {
    /// Drift since the window anchor is within both thresholds
    Stable {
        /// Metres from the anchor
        distance: f64,
        /// Degrees from the anchor heading
        yaw_deg: f64,
    },
    /// No sample since the window was (re)opened
    NoSampleYet,
    /// Window is open but younger than the required duration
    WarmingUp {
        /// Age of the window
        elapsed: Duration,
        /// Required age
        window: Duration,
    },
    /// Drift exceeded a threshold; the caller must reset the window
    Unstable {
        /// Metres from the anchor
        distance: f64,
        /// Degrees from the anchor heading
        yaw_deg: f64,
    },
}

impl Stability {
    /// Whether this verdict lets the mission start
    pub fn is_stable(&self) -> bool {
        matches!(self, Stability::Stable { .. })
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stability::Stable { distance, yaw_deg } => {
                write!(f, "stable d={distance:.3}m dyaw={yaw_deg:.1}deg")
            }
            Stability::NoSampleYet => write!(f, "no localization pose yet"),
            Stability::WarmingUp { elapsed, window } => write!(
                f,
                "warming_up {:.1}/{:.1}s",
                elapsed.as_secs_f64(),
                window.as_secs_f64()
            ),
            Stability::Unstable { distance, yaw_deg } => {
                write!(f, "unstable d={distance:.3}m dyaw={yaw_deg:.1}deg")
            }
        }
    }
}

/// Time-windowed drift check over incoming pose samples
#[derive(Clone, Debug)]
pub struct StabilityGate {
    window: StabilityWindow,
    stable_window: Duration,
    max_pos_jump_m: f64,
    max_yaw_jump_deg: f64,
}

impl StabilityGate {
    /// Gate with no window open
    pub fn new(settings: &GateSettings) -> Self {
        StabilityGate {
            window: StabilityWindow::default(),
            stable_window: settings.stable_window(),
            max_pos_jump_m: settings.max_pos_jump_m,
            max_yaw_jump_deg: settings.max_yaw_jump_deg,
        }
    }

    /// Records a sample and anchors a new window on it if none is open
    pub fn update(&mut self, sample: Pose, now: Instant) {
        if self.window.window_start.is_none() {
            self.window.window_start = Some(sample.clone());
            self.window.window_start_time = Some(now);
        }
        self.window.last_sample = Some(sample);
    }

    /// Closes the current window; the next sample re-anchors it
    pub fn reset_window(&mut self) {
        self.window.window_start = None;
        self.window.window_start_time = None;
    }

    /// Judges the open window as of `now`
    pub fn is_stable(&self, now: Instant) -> Stability {
        let (Some(last), Some(start), Some(start_time)) = (
            &self.window.last_sample,
            &self.window.window_start,
            self.window.window_start_time,
        ) else {
            return Stability::NoSampleYet;
        };

        let elapsed = now.saturating_duration_since(start_time);
        if elapsed < self.stable_window {
            return Stability::WarmingUp {
                elapsed,
                window: self.stable_window,
            };
        }

        let distance = last.distance_to(start);
        let yaw_deg = last.yaw_delta_to(start).to_degrees();
        if distance <= self.max_pos_jump_m && yaw_deg <= self.max_yaw_jump_deg {
            Stability::Stable { distance, yaw_deg }
        } else {
            Stability::Unstable { distance, yaw_deg }
        }
    }

    /// Most recent sample, if any has arrived
    pub fn last_sample(&self) -> Option<&Pose> {
        self.window.last_sample.as_ref()
    }

    /// Current window, for diagnostics
    pub fn window(&self) -> &StabilityWindow {
        &self.window
    }
}

/// Single-slot, most-recent-wins hand-off from the localization producer to the loop
#[derive(Clone, Debug, Default)]
pub struct PoseFeed {
    slot: Arc<Mutex<Option<Pose>>>,
}

impl PoseFeed {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any sample the loop has not drained yet
    pub fn publish(&self, sample: Pose) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    /// Drains the slot
    pub fn take(&self) -> Option<Pose> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Gate plus the feed it drains; owned by the controller
#[derive(Debug)]
pub struct LocalizationTracker {
    gate: StabilityGate,
    feed: PoseFeed,
}

impl LocalizationTracker {
    /// Tracker draining `feed` into a fresh gate
    pub fn new(settings: &GateSettings, feed: PoseFeed) -> Self {
        LocalizationTracker {
            gate: StabilityGate::new(settings),
            feed,
        }
    }

    /// Moves the pending sample, if any, into the gate
    pub fn service(&mut self, now: Instant) {
        if let Some(sample) = self.feed.take() {
            debug!("[LOC] sample {}", sample);
            self.gate.update(sample, now);
        }
    }

    /// The gate
    pub fn gate(&self) -> &StabilityGate {
        &self.gate
    }

    /// The gate, for resets
    pub fn gate_mut(&mut self) -> &mut StabilityGate {
        &mut self.gate
    }

    /// Newest sample the gate has seen
    pub fn last_sample(&self) -> Option<&Pose> {
        self.gate.last_sample()
    }
}

/// Home pose with the covariance prior used to re-seed localization
#[derive(Clone, Debug, PartialEq)]
pub struct InitialPoseSeed {
    /// Pose to seed, normally home
    pub pose: Pose,
    /// [x, y, z, roll, pitch, yaw] covariance
    pub covariance: Matrix6<f64>,
}

impl InitialPoseSeed {
    /// Seed at `home` with the default prior
    pub fn from_home(home: &Pose) -> Self {
        InitialPoseSeed {
            pose: home.clone(),
            covariance: Matrix6::from_diagonal(&Vector6::new(
                SEED_POSITION_VARIANCE,
                SEED_POSITION_VARIANCE,
                0.0,
                0.0,
                0.0,
                SEED_YAW_VARIANCE,
            )),
        }
    }

    /// Row-major flattening, the layout of a ROS covariance field
    pub fn covariance_row_major(&self) -> [f64; 36] {
        let mut out = [0.0; 36];
        for r in 0..6 {
            for c in 0..6 {
                out[r * 6 + c] = self.covariance[(r, c)];
            }
        }
        out
    }
}

/// Output that re-seeds the localization pipeline
pub trait InitialPosePublisher {
    /// Sends `seed` to localization
    fn publish(&mut self, seed: &InitialPoseSeed) -> Result<(), LocalizationError>;
}
