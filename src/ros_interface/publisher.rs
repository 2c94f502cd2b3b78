use log::info;
use r2r::QosProfile;
use r2r::geometry_msgs::msg::{PoseWithCovariance, PoseWithCovarianceStamped};
use r2r::std_msgs::msg::Header;

use super::{INITIALPOSE_TOPIC, RosError, stamp_now, to_ros_pose};
use crate::core::{InitialPosePublisher, InitialPoseSeed, LocalizationError};

/// Publishes the home seed on /initialpose
pub struct InitialPoseOutput {
    inner: r2r::Publisher<PoseWithCovarianceStamped>,
    clock: r2r::Clock,
}

impl InitialPoseOutput {
    /// Creates the publisher on `node`
    pub fn new(node: &mut r2r::Node) -> Result<Self, RosError> {
        let inner = node.create_publisher(INITIALPOSE_TOPIC, QosProfile::default())?;
        let clock = r2r::Clock::create(r2r::ClockType::RosTime)?;
        Ok(InitialPoseOutput { inner, clock })
    }
}

impl InitialPosePublisher for InitialPoseOutput {
    fn publish(&mut self, seed: &InitialPoseSeed) -> Result<(), LocalizationError> {
        let msg = PoseWithCovarianceStamped {
            header: Header {
                stamp: stamp_now(&mut self.clock),
                frame_id: seed.pose.frame_id.clone(),
            },
            pose: PoseWithCovariance {
                pose: to_ros_pose(&seed.pose),
                covariance: seed.covariance_row_major().to_vec(),
            },
        };
        self.inner
            .publish(&msg)
            .map_err(|e| LocalizationError::Publish(e.to_string()))?;
        info!("[INITPOSE] {} published on {}", seed.pose, INITIALPOSE_TOPIC);
        Ok(())
    }
}
