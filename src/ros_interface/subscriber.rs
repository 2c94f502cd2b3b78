// src/ros_interface/subscriber.rs
// AMCL pose intake. Runs on the spin thread and only ever overwrites the single-slot
// feed, so the controller sees the most recent estimate and nothing older.

use futures::{Stream, StreamExt};
use log::{debug, warn};
use r2r::geometry_msgs::msg::PoseWithCovarianceStamped;

use super::from_ros_pose;
use crate::core::PoseFeed;

/// Forwards every AMCL message in `map_frame` to `feed`.
/// Messages stamped with another frame are dropped.
pub async fn pose_intake<S>(stream: S, map_frame: String, feed: PoseFeed)
where
    S: Stream<Item = PoseWithCovarianceStamped> + Unpin,
{
    stream
        .for_each(move |msg| {
            let frame = msg.header.frame_id.as_str();
            if frame.is_empty() || frame == map_frame {
                let pose = from_ros_pose(&msg.pose.pose, &map_frame, "amcl");
                debug!("[LOC] amcl {}", pose);
                feed.publish(pose);
            } else {
                warn!("[LOC] amcl pose in frame '{}' ignored (map is '{}')", frame, map_frame);
            }
            futures::future::ready(())
        })
        .await
}
