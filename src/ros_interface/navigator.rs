// src/ros_interface/navigator.rs
// Nav2 as the motion stack: NavigateToPose goals through the action client, costmap
// clearing through the two ClearEntireCostmap services. Every wait on Nav2 is bounded
// by RESPONSE_TIMEOUT so the control loop keeps polling the operator.

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use log::{info, warn};
use r2r::geometry_msgs::msg::PoseStamped;
use r2r::nav2_msgs::action::NavigateToPose;
use r2r::nav2_msgs::srv::ClearEntireCostmap;
use r2r::std_msgs::msg::Header;
use std::collections::HashMap;
use std::time::Duration;

use super::{
    GLOBAL_COSTMAP_CLEAR, LOCAL_COSTMAP_CLEAR, NAVIGATE_ACTION, RosError, stamp_now,
    to_ros_pose, wait_bounded,
};
use crate::core::Pose;
use crate::navigation::{GoalHandle, GoalResult, MotionError, MotionExecutor};

/// Longest a single call waits on an answer from Nav2
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

type ResultFuture =
    LocalBoxFuture<'static, Result<(r2r::GoalStatus, NavigateToPose::Result), r2r::Error>>;

struct ActiveGoal {
    goal: r2r::ClientGoal<NavigateToPose::Action>,
    result: ResultFuture,
    outcome: Option<GoalResult>,
}

/// Server discovery that survives across calls: each call waits at most `limit`
/// and a later call picks up the same pending check
struct Availability {
    name: &'static str,
    pending: Option<LocalBoxFuture<'static, Result<(), r2r::Error>>>,
}

impl Availability {
    fn new(name: &'static str, check: LocalBoxFuture<'static, Result<(), r2r::Error>>) -> Self {
        Availability {
            name,
            pending: Some(check),
        }
    }

    fn wait(&mut self, limit: Duration) -> Result<(), MotionError> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(());
        };
        match wait_bounded(pending, limit) {
            Some(Ok(())) => info!("[NAV] {} is up", self.name),
            Some(Err(e)) => warn!("[NAV] {} availability check failed: {}", self.name, e),
            None => {
                return Err(MotionError::Unavailable(format!(
                    "{}: no server after {:?}",
                    self.name, limit
                )));
            }
        }
        self.pending = None;
        Ok(())
    }
}

struct ClearService {
    name: &'static str,
    client: r2r::Client<ClearEntireCostmap::Service>,
    availability: Availability,
}

impl ClearService {
    fn new(node: &mut r2r::Node, name: &'static str) -> Result<Self, RosError> {
        let client = node.create_client::<ClearEntireCostmap::Service>(name)?;
        let check = r2r::Node::is_available(&client)?.boxed_local();
        Ok(ClearService {
            name,
            client,
            availability: Availability::new(name, check),
        })
    }

    fn clear(&mut self) -> Result<(), MotionError> {
        // polled once, never waited on
        self.availability.wait(Duration::ZERO)?;
        let request = self
            .client
            .request(&ClearEntireCostmap::Request::default())
            .map_err(|e| MotionError::Unavailable(format!("{}: {}", self.name, e)))?;
        match wait_bounded(request, RESPONSE_TIMEOUT) {
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(MotionError::Unavailable(format!("{}: {}", self.name, e))),
            None => Err(MotionError::Unavailable(format!(
                "{}: no answer after {:?}",
                self.name, RESPONSE_TIMEOUT
            ))),
        }
    }
}

/// `MotionExecutor` backed by Nav2's `navigate_to_pose` action
pub struct Nav2Executor {
    client: r2r::ActionClient<NavigateToPose::Action>,
    server: Availability,
    clock: r2r::Clock,
    goals: HashMap<GoalHandle, ActiveGoal>,
    next_id: u64,
    global_costmap: ClearService,
    local_costmap: ClearService,
}

impl Nav2Executor {
    /// Creates the action client and both costmap clients on `node`
    pub fn new(node: &mut r2r::Node) -> Result<Self, RosError> {
        let client = node.create_action_client::<NavigateToPose::Action>(NAVIGATE_ACTION)?;
        let check = r2r::Node::is_available(&client)?.boxed_local();
        Ok(Nav2Executor {
            client,
            server: Availability::new(NAVIGATE_ACTION, check),
            clock: r2r::Clock::create(r2r::ClockType::RosTime)?,
            goals: HashMap::new(),
            next_id: 1,
            global_costmap: ClearService::new(node, GLOBAL_COSTMAP_CLEAR)?,
            local_costmap: ClearService::new(node, LOCAL_COSTMAP_CLEAR)?,
        })
    }

    fn goal_message(&mut self, pose: &Pose) -> NavigateToPose::Goal {
        NavigateToPose::Goal {
            pose: PoseStamped {
                header: Header {
                    stamp: stamp_now(&mut self.clock),
                    frame_id: pose.frame_id.clone(),
                },
                pose: to_ros_pose(pose),
            },
            ..Default::default()
        }
    }
}

impl MotionExecutor for Nav2Executor {
    fn submit(&mut self, goal: &Pose) -> Result<GoalHandle, MotionError> {
        self.server.wait(RESPONSE_TIMEOUT)?;
        // only the goal in flight is worth keeping
        self.goals.retain(|_, g| g.outcome.is_none());

        let msg = self.goal_message(goal);
        let request = self
            .client
            .send_goal_request(msg)
            .map_err(|e| MotionError::Unavailable(e.to_string()))?;
        let (client_goal, result, _feedback) = match wait_bounded(request, RESPONSE_TIMEOUT) {
            Some(Ok(accepted)) => accepted,
            Some(Err(e)) => return Err(MotionError::Rejected(e.to_string())),
            None => {
                warn!("[NAV] goal for {} not acknowledged within {:?}", goal.id, RESPONSE_TIMEOUT);
                return Err(MotionError::Unavailable(format!(
                    "{}: goal not acknowledged",
                    NAVIGATE_ACTION
                )));
            }
        };

        let handle = GoalHandle(self.next_id);
        self.next_id += 1;
        self.goals.insert(
            handle,
            ActiveGoal {
                goal: client_goal,
                result: result.boxed_local(),
                outcome: None,
            },
        );
        Ok(handle)
    }

    fn is_complete(&mut self, handle: GoalHandle) -> bool {
        let Some(active) = self.goals.get_mut(&handle) else {
            return true;
        };
        if active.outcome.is_some() {
            return true;
        }
        let outcome = match active.result.as_mut().now_or_never() {
            None => return false,
            Some(Ok((r2r::GoalStatus::Succeeded, _))) => GoalResult::Succeeded,
            Some(Ok((status, _))) => {
                info!("[NAV] {} ended with {:?}", handle, status);
                GoalResult::Failed
            }
            Some(Err(e)) => {
                warn!("[NAV] {} result unavailable: {}", handle, e);
                GoalResult::Failed
            }
        };
        active.outcome = Some(outcome);
        true
    }

    fn result(&mut self, handle: GoalHandle) -> GoalResult {
        self.goals
            .get(&handle)
            .and_then(|g| g.outcome)
            .unwrap_or(GoalResult::Failed)
    }

    fn cancel(&mut self, handle: GoalHandle) -> Result<(), MotionError> {
        let active = self
            .goals
            .get_mut(&handle)
            .ok_or(MotionError::UnknownGoal(handle))?;
        // the goal is dropped from our side whatever Nav2 answers
        active.outcome = Some(GoalResult::Failed);
        let cancel = active
            .goal
            .cancel()
            .map_err(|e| MotionError::Unavailable(e.to_string()))?;
        match wait_bounded(cancel, RESPONSE_TIMEOUT) {
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(MotionError::Rejected(e.to_string())),
            None => Err(MotionError::Unavailable(format!(
                "cancel of {} not acknowledged within {:?}",
                handle, RESPONSE_TIMEOUT
            ))),
        }
    }

    fn clear_transient_state(&mut self) -> Result<(), MotionError> {
        let global = self.global_costmap.clear();
        let local = self.local_costmap.clear();
        global.and(local)
    }
}
