//! ROS 2 interface for waypoint missions
//!
//! This module connects the mission controller to a Nav2 robot:
//! - Subscribing to AMCL poses for the localization intake
//! - Publishing the home seed on `/initialpose`
//! - Driving `NavigateToPose` goals and clearing costmaps
//!
//! The node is spun on its own thread. Subscription callbacks run there; everything
//! the controller calls waits, for a bounded time, on futures completed by that thread.

mod navigator;
mod publisher;
mod subscriber;

pub use navigator::{Nav2Executor, RESPONSE_TIMEOUT};
pub use publisher::InitialPoseOutput;
pub use subscriber::pose_intake;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use futures::FutureExt;
use log::{info, warn};
use r2r::geometry_msgs::msg::PoseWithCovarianceStamped;
use r2r::{Context, Node, QosProfile};
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::{Pose, PoseFeed};

/// Localization estimates from AMCL
pub const AMCL_TOPIC: &str = "/amcl_pose";
/// Initial pose seed consumed by AMCL
pub const INITIALPOSE_TOPIC: &str = "/initialpose";
/// Nav2 goal action
pub const NAVIGATE_ACTION: &str = "navigate_to_pose";
/// Global costmap clear service
pub const GLOBAL_COSTMAP_CLEAR: &str = "/global_costmap/clear_entirely_global_costmap";
/// Local costmap clear service
pub const LOCAL_COSTMAP_CLEAR: &str = "/local_costmap/clear_entirely_local_costmap";

const SPIN_PERIOD: Duration = Duration::from_millis(50);
const WAIT_POLL: Duration = Duration::from_millis(10);

/// ROS error types
#[derive(Debug, Error)]
pub enum RosError {
    /// Error reported by r2r
    #[error("ROS error: {0}")]
    Ros(#[from] r2r::Error),

    /// A required ROS entity is missing
    #[error("{0} not available")]
    Unavailable(&'static str),
}

/// Owns the node and its spin thread
pub struct RosBridge {
    node: Arc<Mutex<Node>>,
    running: Arc<AtomicBool>,
    spinner: Option<JoinHandle<()>>,
}

impl RosBridge {
    /// Creates the node, attaches the AMCL intake to `feed` and starts spinning
    pub fn start(node_name: &str, map_frame: &str, feed: PoseFeed) -> Result<Self, RosError> {
        let ctx = Context::create()?;
        let mut node = Node::create(ctx, node_name, "")?;
        info!("[BOOT] ROS 2 node '{}' created", node_name);

        let intake = node.subscribe::<PoseWithCovarianceStamped>(AMCL_TOPIC, QosProfile::default())?;
        let map_frame = map_frame.to_string();

        let node = Arc::new(Mutex::new(node));
        let running = Arc::new(AtomicBool::new(true));

        let spin_node = node.clone();
        let spin_running = running.clone();
        let spinner = std::thread::spawn(move || {
            let mut pool = LocalPool::new();
            if let Err(e) = pool
                .spawner()
                .spawn_local(pose_intake(intake, map_frame, feed))
            {
                warn!("[BOOT] pose intake not started: {}", e);
            }
            while spin_running.load(Ordering::SeqCst) {
                spin_node
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .spin_once(SPIN_PERIOD);
                pool.run_until_stalled();
            }
        });

        Ok(RosBridge {
            node,
            running,
            spinner: Some(spinner),
        })
    }

    /// Runs `f` with the node locked; used to create publishers and clients
    pub fn with_node<T>(&self, f: impl FnOnce(&mut Node) -> T) -> T {
        let mut node = self.node.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut node)
    }

    /// Publisher for the initial pose seed
    pub fn initial_pose_output(&self) -> Result<InitialPoseOutput, RosError> {
        self.with_node(InitialPoseOutput::new)
    }

    /// Nav2 motion executor on this node
    pub fn executor(&self) -> Result<Nav2Executor, RosError> {
        self.with_node(Nav2Executor::new)
    }
}

impl Drop for RosBridge {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(spinner) = self.spinner.take() {
            let _ = spinner.join();
        }
        info!("[MAIN] ROS 2 node stopped");
    }
}

pub(crate) fn to_ros_pose(pose: &Pose) -> r2r::geometry_msgs::msg::Pose {
    r2r::geometry_msgs::msg::Pose {
        position: r2r::geometry_msgs::msg::Point {
            x: pose.x,
            y: pose.y,
            z: 0.0,
        },
        orientation: r2r::geometry_msgs::msg::Quaternion {
            x: 0.0,
            y: 0.0,
            z: pose.qz,
            w: pose.qw,
        },
    }
}

pub(crate) fn from_ros_pose(pose: &r2r::geometry_msgs::msg::Pose, frame_id: &str, id: &str) -> Pose {
    Pose::new(
        pose.position.x,
        pose.position.y,
        pose.orientation.z,
        pose.orientation.w,
        frame_id,
        id,
    )
}

/// Polls `fut` until it resolves or `limit` has passed; `None` on timeout. A zero
/// limit polls exactly once.
pub(crate) fn wait_bounded<F: Future>(fut: F, limit: Duration) -> Option<F::Output> {
    let mut fut = std::pin::pin!(fut);
    let deadline = Instant::now() + limit;
    loop {
        if let Some(out) = fut.as_mut().now_or_never() {
            return Some(out);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(WAIT_POLL);
    }
}

/// Current ROS time as a message stamp
pub(crate) fn stamp_now(clock: &mut r2r::Clock) -> r2r::builtin_interfaces::msg::Time {
    match clock.get_now() {
        Ok(now) => r2r::Clock::to_builtin_time(&now),
        Err(e) => {
            warn!("[ROS] clock unavailable, zero stamp: {}", e);
            r2r::builtin_interfaces::msg::Time::default()
        }
    }
}
