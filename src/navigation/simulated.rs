// navigation/simulated.rs
// Scripted motion stack for dry runs without ROS. Goals complete after a fixed number
// of polls; the result per target id follows a script, then falls back to a default.
// SimulatedLocalization stands in for the localization node.

use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{GoalHandle, GoalResult, MotionError, MotionExecutor};
use crate::core::{InitialPosePublisher, InitialPoseSeed, LocalizationError, Pose, PoseFeed};

/// Simulated robot pose, re-published into a `PoseFeed` the way a localization node
/// streams its estimate
#[derive(Clone, Debug)]
pub struct SimulatedLocalization {
    pose: Arc<Mutex<Pose>>,
    feed: PoseFeed,
}

impl SimulatedLocalization {
    /// Robot standing at `start`, publishing into `feed`
    pub fn new(start: Pose, feed: PoseFeed) -> Self {
        SimulatedLocalization {
            pose: Arc::new(Mutex::new(start)),
            feed,
        }
    }

    /// Where the simulated robot is
    pub fn pose(&self) -> Pose {
        self.pose.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Teleports the robot and publishes the new estimate
    pub fn set(&self, pose: Pose) {
        *self.pose.lock().unwrap_or_else(PoisonError::into_inner) = pose;
        self.publish_now();
    }

    /// Publishes the current pose once
    pub fn publish_now(&self) {
        self.feed.publish(self.pose());
    }

    /// Publishes every `period` until `running` is cleared
    pub fn spawn(self, period: Duration, running: Arc<AtomicBool>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                self.publish_now();
                std::thread::sleep(period);
            }
            debug!("[SIM] localization stream stopped");
        })
    }
}

impl InitialPosePublisher for SimulatedLocalization {
    fn publish(&mut self, seed: &InitialPoseSeed) -> Result<(), LocalizationError> {
        info!("[SIM] initial pose {}", seed.pose);
        self.set(seed.pose.clone());
        Ok(())
    }
}

#[derive(Debug)]
struct SimGoal {
    target: Pose,
    remaining_polls: u32,
    result: GoalResult,
    cancelled: bool,
}

/// Motion executor that pretends to drive
#[derive(Debug)]
pub struct SimulatedExecutor {
    polls_to_complete: u32,
    default_result: GoalResult,
    scripts: HashMap<String, VecDeque<GoalResult>>,
    goals: HashMap<GoalHandle, SimGoal>,
    next_id: u64,
    submitted: Vec<Pose>,
    cancelled: Vec<GoalHandle>,
    clears: u32,
    localization: Option<SimulatedLocalization>,
}

impl SimulatedExecutor {
    /// Executor whose goals complete after `polls_to_complete` polls and succeed by default
    pub fn new(polls_to_complete: u32) -> Self {
        SimulatedExecutor {
            polls_to_complete,
            default_result: GoalResult::Succeeded,
            scripts: HashMap::new(),
            goals: HashMap::new(),
            next_id: 1,
            submitted: Vec::new(),
            cancelled: Vec::new(),
            clears: 0,
            localization: None,
        }
    }

    /// Results for successive goals sent to the pose with this id
    pub fn with_results(mut self, id: &str, results: impl IntoIterator<Item = GoalResult>) -> Self {
        self.scripts
            .entry(id.to_string())
            .or_default()
            .extend(results);
        self
    }

    /// Result once a pose's script is exhausted
    pub fn with_default(mut self, result: GoalResult) -> Self {
        self.default_result = result;
        self
    }

    /// Moves the simulated robot to the goal pose whenever a goal succeeds
    pub fn with_localization(mut self, localization: SimulatedLocalization) -> Self {
        self.localization = Some(localization);
        self
    }

    /// Every goal submitted, in order
    pub fn submitted(&self) -> &[Pose] {
        &self.submitted
    }

    /// Number of goals sent to the pose with this id
    pub fn submissions_to(&self, id: &str) -> usize {
        self.submitted.iter().filter(|p| p.id == id).count()
    }

    /// Every handle cancelled, in order
    pub fn cancelled(&self) -> &[GoalHandle] {
        &self.cancelled
    }

    /// Number of costmap clears requested
    pub fn clears(&self) -> u32 {
        self.clears
    }
}

impl MotionExecutor for SimulatedExecutor {
    fn submit(&mut self, goal: &Pose) -> Result<GoalHandle, MotionError> {
        let handle = GoalHandle(self.next_id);
        self.next_id += 1;
        let result = self
            .scripts
            .get_mut(&goal.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.default_result);
        info!("[SIM] {} -> {} (will be {:?})", handle, goal, result);
        self.submitted.push(goal.clone());
        self.goals.insert(
            handle,
            SimGoal {
                target: goal.clone(),
                remaining_polls: self.polls_to_complete,
                result,
                cancelled: false,
            },
        );
        Ok(handle)
    }

    fn is_complete(&mut self, handle: GoalHandle) -> bool {
        let Some(goal) = self.goals.get_mut(&handle) else {
            return true;
        };
        if goal.cancelled {
            return true;
        }
        if goal.remaining_polls > 0 {
            goal.remaining_polls -= 1;
            return false;
        }
        if goal.result == GoalResult::Succeeded {
            if let Some(localization) = &self.localization {
                localization.set(goal.target.clone());
            }
        }
        true
    }

    fn result(&mut self, handle: GoalHandle) -> GoalResult {
        match self.goals.get(&handle) {
            Some(goal) if !goal.cancelled => goal.result,
            _ => GoalResult::Failed,
        }
    }

    fn cancel(&mut self, handle: GoalHandle) -> Result<(), MotionError> {
        let goal = self
            .goals
            .get_mut(&handle)
            .ok_or(MotionError::UnknownGoal(handle))?;
        goal.cancelled = true;
        self.cancelled.push(handle);
        Ok(())
    }

    fn clear_transient_state(&mut self) -> Result<(), MotionError> {
        self.clears += 1;
        Ok(())
    }
}
