// core/pose.rs

// Planar pose value type shared by the waypoint file, the localization intake and the
// motion stack. Heading is carried as the (z, w) pair of a rotation about the vertical
// axis, which is what the map tools record and what the navigation stack consumes.

// Dependencies
use nalgebra::{UnitComplex, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pose in a named reference frame: position plus heading as a quaternion (z, w) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X position (meters)
    pub x: f64,
    /// Y position (meters)
    pub y: f64,
    /// Z component of the heading quaternion
    pub qz: f64,
    /// W component of the heading quaternion
    pub qw: f64,
    /// Reference frame the pose is expressed in (usually "map")
    pub frame_id: String,
    /// Stable identifier ("home", "wp0", ...)
    pub id: String,
}

impl Pose {
    /// Builds a pose from its raw quaternion components
    pub fn new(
        x: f64,
        y: f64,
        qz: f64,
        qw: f64,
        frame_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Pose {
            x,
            y,
            qz,
            qw,
            frame_id: frame_id.into(),
            id: id.into(),
        }
    }

    /// Builds a pose from a heading angle in radians
    pub fn from_yaw(
        x: f64,
        y: f64,
        yaw: f64,
        frame_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let half = yaw / 2.0;
        Pose::new(x, y, half.sin(), half.cos(), frame_id, id)
    }

    /// Heading in radians
    pub fn yaw(&self) -> f64 {
        quat_to_yaw(self.qz, self.qw)
    }

    /// Planar position as a vector
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Euclidean distance between the two positions, ignoring heading
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.position() - other.position()).norm()
    }

    /// Absolute heading difference in radians, wrapped into [0, π]
    pub fn yaw_delta_to(&self, other: &Pose) -> f64 {
        yaw_diff(self.yaw(), other.yaw())
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({}): x={:.3} y={:.3} qz={:.3} qw={:.3}",
            self.id, self.frame_id, self.x, self.y, self.qz, self.qw
        )
    }
}

/// Extracts the heading angle from the (z, w) quaternion components
pub fn quat_to_yaw(qz: f64, qw: f64) -> f64 {
    2.0 * qz.atan2(qw)
}

/// Absolute difference of two headings after wrapping into [-π, π]
pub fn yaw_diff(a: f64, b: f64) -> f64 {
    UnitComplex::new(b).angle_to(&UnitComplex::new(a)).abs()
}

/// Planar distance between two points
pub fn dist(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    (Vector2::new(ax, ay) - Vector2::new(bx, by)).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    #[rstest]
    #[case(0.0)]
    #[case(0.3)]
    #[case(-2.9)]
    #[case(FRAC_PI_2)]
    fn yaw_survives_quaternion_round_trip(#[case] yaw: f64) {
        let pose = Pose::from_yaw(1.0, 2.0, yaw, "map", "p");
        assert!((pose.yaw() - yaw).abs() < EPS);
    }

    #[rstest]
    #[case(0.4, 0.1)]
    #[case(3.0, -3.0)]
    #[case(-1.2, 2.5)]
    fn yaw_diff_is_invariant_under_full_turns(#[case] a: f64, #[case] b: f64) {
        let reference = yaw_diff(a, b);
        assert!((0.0..=PI).contains(&reference));
        for k in -3..=3 {
            let shifted = yaw_diff(a + 2.0 * PI * k as f64, b);
            assert!((shifted - reference).abs() < 1e-6, "k={k}: {shifted} vs {reference}");
        }
    }

    #[test]
    fn yaw_diff_wraps_across_the_seam() {
        // 179° vs -179° are 2° apart, not 358°
        let a = 179f64.to_radians();
        let b = (-179f64).to_radians();
        assert!((yaw_diff(a, b).to_degrees() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn distance_ignores_heading() {
        let a = Pose::from_yaw(0.0, 0.0, 0.0, "map", "a");
        let b = Pose::from_yaw(3.0, 4.0, 1.0, "map", "b");
        assert!((a.distance_to(&b) - 5.0).abs() < EPS);
        assert!((dist(0.0, 0.0, 3.0, 4.0) - 5.0).abs() < EPS);
    }
}
