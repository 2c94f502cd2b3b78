// core/waypoints.rs

// Loads the waypoint document recorded on the map: a home pose plus the ordered list
// of targets to visit. Everything is validated once at startup so the control loop only
// ever sees a consistent set of poses in a single frame.

// Dependencies
use log::info;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use super::config::ConfigError;
use super::pose::Pose;

const DEFAULT_MAP_FRAME: &str = "map";

/// Validated home pose and targets, all in one reference frame
#[derive(Clone, Debug, PartialEq)]
pub struct WaypointSet {
    frame: String,
    home: Pose,
    targets: Vec<Pose>,
}

// Document shape before validation. Coordinates are optional here so a missing key
// produces a message naming the pose instead of a bare serde error.
#[derive(Deserialize, Debug)]
struct RawDocument {
    map_frame: Option<String>,
    home: Option<serde_yaml::Value>,
    waypoints: Option<serde_yaml::Value>,
}

#[derive(Deserialize, Debug)]
struct RawPose {
    x: Option<f64>,
    y: Option<f64>,
    qz: Option<f64>,
    qw: Option<f64>,
    frame_id: Option<String>,
    id: Option<serde_yaml::Value>,
}

impl WaypointSet {
    /// Reads and validates a waypoint document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::from_yaml_str(&text)?;
        info!(
            "[POSE] Loaded {} waypoint(s) from {} in frame '{}'",
            set.targets.len(),
            path.display(),
            set.frame
        );
        Ok(set)
    }

    /// Parses and validates a waypoint document held in memory
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if !value.is_mapping() {
            return Err(ConfigError::NotAMapping);
        }
        let doc: RawDocument = serde_yaml::from_value(value)?;
        let frame = doc.map_frame.unwrap_or_else(|| DEFAULT_MAP_FRAME.to_string());

        let home = match doc.home {
            Some(value) if value.is_mapping() => parse_pose(value, "home", &frame)?,
            _ => return Err(ConfigError::MissingHome),
        };

        let entries = match doc.waypoints {
            Some(serde_yaml::Value::Sequence(entries)) if !entries.is_empty() => entries,
            _ => return Err(ConfigError::MissingWaypoints),
        };
        let targets = entries
            .into_iter()
            .enumerate()
            .map(|(i, value)| parse_pose(value, &format!("wp{i}"), &frame))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(frame, home, targets)
    }

    /// Builds a set from already-constructed poses, enforcing the same invariants as loading
    pub fn new(frame: impl Into<String>, home: Pose, targets: Vec<Pose>) -> Result<Self, ConfigError> {
        let frame = frame.into();
        if targets.is_empty() {
            return Err(ConfigError::MissingWaypoints);
        }
        for pose in std::iter::once(&home).chain(targets.iter()) {
            if pose.frame_id != frame {
                return Err(ConfigError::FrameMismatch {
                    pose: pose.id.clone(),
                    frame: pose.frame_id.clone(),
                    map_frame: frame.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::DuplicateId(target.id.clone()));
            }
        }
        Ok(WaypointSet { frame, home, targets })
    }

    /// Reference frame shared by every pose
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// Return pose, also used as the initial-pose seed
    pub fn home(&self) -> &Pose {
        &self.home
    }

    /// Targets in visiting order
    pub fn targets(&self) -> &[Pose] {
        &self.targets
    }

    /// Number of targets, home excluded
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Never true for a loaded document
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

fn parse_pose(value: serde_yaml::Value, default_id: &str, map_frame: &str) -> Result<Pose, ConfigError> {
    let raw: RawPose = serde_yaml::from_value(value)?;
    let id = match raw.id {
        Some(serde_yaml::Value::String(s)) => s,
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(serde_yaml::Value::Bool(b)) => b.to_string(),
        _ => default_id.to_string(),
    };
    let field = |v: Option<f64>, name: &'static str| {
        v.ok_or_else(|| ConfigError::MissingField {
            pose: id.clone(),
            field: name,
        })
    };
    Ok(Pose {
        x: field(raw.x, "x")?,
        y: field(raw.y, "y")?,
        qz: field(raw.qz, "qz")?,
        qw: field(raw.qw, "qw")?,
        frame_id: raw.frame_id.unwrap_or_else(|| map_frame.to_string()),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
map_frame: map
home: {x: 0.0, y: 0.0, qz: 0.0, qw: 1.0}
waypoints:
  - {x: 1.5, y: 0.2, qz: 0.0, qw: 1.0}
  - {x: 2, y: -1, qz: 0.707, qw: 0.707, id: dock, frame_id: map}
"#;

    #[test]
    fn parses_document_with_defaults() {
        let set = WaypointSet::from_yaml_str(DOC).unwrap();
        assert_eq!(set.frame(), "map");
        assert_eq!(set.home().id, "home");
        assert_eq!(set.len(), 2);
        assert_eq!(set.targets()[0].id, "wp0");
        assert_eq!(set.targets()[1].id, "dock");
        assert_eq!(set.targets()[1].x, 2.0);
    }

    #[test]
    fn map_frame_defaults_to_map() {
        let doc = "home: {x: 0, y: 0, qz: 0, qw: 1}\nwaypoints:\n  - {x: 1, y: 1, qz: 0, qw: 1}\n";
        let set = WaypointSet::from_yaml_str(doc).unwrap();
        assert_eq!(set.frame(), "map");
        assert_eq!(set.targets()[0].frame_id, "map");
    }

    #[test]
    fn missing_coordinate_names_the_pose() {
        let doc = "home: {x: 0, y: 0, qz: 0, qw: 1}\nwaypoints:\n  - {x: 1, qz: 0, qw: 1}\n";
        let err = WaypointSet::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "y", .. }));
        assert!(err.to_string().contains("wp0"));
    }

    #[test]
    fn rejects_non_mapping_document() {
        let err = WaypointSet::from_yaml_str("- 1\n- 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let doc = "home: {x: 0, y: 0, qz: 0, qw: 1}\nwaypoints:\n  - {x: 1, y: 1, qz: 0, qw: 1, id: a}\n  - {x: 2, y: 1, qz: 0, qw: 1, id: a}\n";
        let err = WaypointSet::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId(ref id) if id == "a"));
    }

    #[test]
    fn load_reports_absent_file() {
        let err = WaypointSet::load("/definitely/not/here/waypoints.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
