// core/config.rs
// Tunables for the mission loop and the errors raised while loading configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading the waypoint document or the settings file.
/// All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The waypoint document does not exist
    #[error("waypoints file not found: {0}")]
    NotFound(String),

    /// A file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// YAML did not parse or did not match the expected shape
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_yaml::Error),

    /// Top level of the waypoint document is not a mapping
    #[error("waypoints document must be a mapping")]
    NotAMapping,

    /// No home pose
    #[error("missing 'home:' mapping")]
    MissingHome,

    /// Waypoint list absent or empty
    #[error("missing 'waypoints:' list (need >=1)")]
    MissingWaypoints,

    /// A pose lacks one of `x`, `y`, `qz`, `qw`
    #[error("pose '{pose}' missing '{field}'")]
    MissingField {
        /// Id of the pose
        pose: String,
        /// Name of the absent coordinate
        field: &'static str,
    },

    /// A pose was recorded in a frame other than the map frame
    #[error(
        "pose '{pose}' frame_id='{frame}' != map_frame='{map_frame}'; record everything in '{map_frame}'"
    )]
    FrameMismatch {
        /// Id of the pose
        pose: String,
        /// Frame the pose declares
        frame: String,
        /// Frame the document declares
        map_frame: String,
    },

    /// Two waypoints share an id
    #[error("duplicate waypoint id '{0}'")]
    DuplicateId(String),

    /// A numeric setting is negative, zero where it must be positive, or not finite
    #[error("setting '{field}' has out-of-range value {value}")]
    InvalidSetting {
        /// Settings key, dotted for nested sections
        field: &'static str,
        /// Value found in the file
        value: f64,
    },
}

/// Mission loop settings. Every field has a default so a partial file is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionSettings {
    /// Base URL of the control-plane peer
    pub server_base: String,
    /// Per-request timeout for the peer (seconds)
    pub http_timeout_sec: f64,
    /// Attempts per waypoint before it is declared unreachable
    pub max_waypoint_retries: u32,
    /// Poll tick while a goal is in flight (seconds)
    pub motion_poll_sec: f64,
    /// Poll tick while idle (seconds)
    pub idle_poll_sec: f64,
    /// Publish home as the initial pose when a mission starts
    pub seed_initial_pose_from_home: bool,
    /// Ticks serviced after seeding before the localization wait
    pub settle_ticks: u32,
    /// Frames requested from the capture collaborator per reached waypoint
    pub images_per_waypoint: u32,
    /// Log the latest localization sample and distance to home before each attempt
    pub debug_pose_diagnostics: bool,
    /// Stability gate tuning
    pub localization: GateSettings,
}

/// Localization stability thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Span the samples must cover before the pose counts as stable (seconds)
    pub stable_window_sec: f64,
    /// Largest position change between consecutive samples (metres)
    pub max_pos_jump_m: f64,
    /// Largest heading change between consecutive samples (degrees)
    pub max_yaw_jump_deg: f64,
    /// Give up waiting for stability after this long (seconds)
    pub timeout_sec: f64,
}

impl Default for MissionSettings {
    fn default() -> Self {
        MissionSettings {
            server_base: "http://127.0.0.1:5000".to_string(),
            http_timeout_sec: 1.5,
            max_waypoint_retries: 3,
            motion_poll_sec: 0.1,
            idle_poll_sec: 1.0,
            seed_initial_pose_from_home: true,
            settle_ticks: 10,
            images_per_waypoint: 3,
            debug_pose_diagnostics: true,
            localization: GateSettings::default(),
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        GateSettings {
            stable_window_sec: 2.5,
            max_pos_jump_m: 0.08,
            max_yaw_jump_deg: 8.0,
            timeout_sec: 25.0,
        }
    }
}

impl MissionSettings {
    /// Loads settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings: MissionSettings = serde_yaml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every numeric setting is usable as a duration, count or threshold
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_secs("http_timeout_sec", self.http_timeout_sec)?;
        positive_secs("motion_poll_sec", self.motion_poll_sec)?;
        positive_secs("idle_poll_sec", self.idle_poll_sec)?;
        if self.max_waypoint_retries == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_waypoint_retries",
                value: 0.0,
            });
        }
        self.localization.validate()
    }

    /// Poll tick while a goal is in flight
    pub fn motion_tick(&self) -> Duration {
        secs_or(self.motion_poll_sec, Self::default().motion_poll_sec)
    }

    /// Poll tick while idle
    pub fn idle_tick(&self) -> Duration {
        secs_or(self.idle_poll_sec, Self::default().idle_poll_sec)
    }

    /// Per-request timeout for the control-plane peer
    pub fn http_timeout(&self) -> Duration {
        secs_or(self.http_timeout_sec, Self::default().http_timeout_sec)
    }
}

impl GateSettings {
    /// Checks the window, thresholds and timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_secs("localization.stable_window_sec", self.stable_window_sec)?;
        non_negative("localization.max_pos_jump_m", self.max_pos_jump_m)?;
        non_negative("localization.max_yaw_jump_deg", self.max_yaw_jump_deg)?;
        non_negative("localization.timeout_sec", self.timeout_sec)?;
        Duration::try_from_secs_f64(self.timeout_sec).map_err(|_| ConfigError::InvalidSetting {
            field: "localization.timeout_sec",
            value: self.timeout_sec,
        })?;
        Ok(())
    }

    /// How long samples must agree before the pose counts as stable
    pub fn stable_window(&self) -> Duration {
        secs_or(self.stable_window_sec, Self::default().stable_window_sec)
    }

    /// Upper bound on the localization wait
    pub fn timeout(&self) -> Duration {
        secs_or(self.timeout_sec, Self::default().timeout_sec)
    }
}

fn positive_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if !d.is_zero() => Ok(()),
        _ => Err(ConfigError::InvalidSetting { field, value }),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting { field, value })
    }
}

// Settings built in code skip `validate`; an unusable value falls back to the default.
fn secs_or(value: f64, default: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(default))
}
