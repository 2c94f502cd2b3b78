// src/navigation/controller.rs
// Top-level mission state machine: idle -> localize -> execute waypoints -> return home.
// Owns the control loop and every collaborator the loop talks to.

use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::runner::{GoalWait, WaypointOutcome, WaypointRunner};
use super::{best_effort, GoalResult, ImageCapture, MotionExecutor, NoCapture};
use crate::control::{RemoteControlChannel, Status, StatusEvent};
use crate::core::{
    Clock, ControlCommand, HomeReturnMode, InitialPosePublisher, InitialPoseSeed,
    LocalizationTracker, MissionSettings, MissionState, PoseFeed, Stability, WaypointSet,
};

/// How a return-home ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeOutcome {
    /// Home goal succeeded
    Reached,
    /// Home goal failed or was refused
    Unreachable,
    /// Operator abort during the return
    Aborted,
    /// Process shutdown during the return
    Interrupted,
}

/// What one pass through the idle loop produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Go-home requested while idle
    IdleReturn(HomeOutcome),
    /// Operator aborted during waypoint execution; the robot stays where it is
    Aborted {
        /// Indices reached before the abort
        reached: Vec<usize>,
        /// Indices given up on before the abort
        unreachable: Vec<usize>,
    },
    /// Shutdown requested mid-mission; the goal in flight was cancelled
    Interrupted {
        /// Indices reached before the shutdown
        reached: Vec<usize>,
        /// Indices given up on before the shutdown
        unreachable: Vec<usize>,
    },
    /// Waypoints done (or go-home forced), home return attempted
    Finished {
        /// Why the robot went home
        mode: HomeReturnMode,
        /// How the home return ended
        home: HomeOutcome,
        /// Indices reached
        reached: Vec<usize>,
        /// Indices given up on
        unreachable: Vec<usize>,
    },
}

enum Trigger {
    Start,
    GoHome,
}

/// Mission controller owning the motion executor, control channel and clock
pub struct MissionController<E, C, K> {
    executor: E,
    channel: C,
    clock: K,
    waypoints: WaypointSet,
    settings: MissionSettings,
    tracker: LocalizationTracker,
    capture: Box<dyn ImageCapture>,
    seeder: Option<Box<dyn InitialPosePublisher>>,
    state: MissionState,
    last_mission_aborted: bool,
    running: Arc<AtomicBool>,
}

impl<E, C, K> MissionController<E, C, K>
where
    E: MotionExecutor,
    C: RemoteControlChannel,
    K: Clock,
{
    /// Creates a controller in `Idle`. `feed` is the hand-off the localization
    /// producer writes samples into.
    pub fn new(
        executor: E,
        channel: C,
        clock: K,
        waypoints: WaypointSet,
        settings: MissionSettings,
        feed: PoseFeed,
    ) -> Self {
        let tracker = LocalizationTracker::new(&settings.localization, feed);
        MissionController {
            executor,
            channel,
            clock,
            waypoints,
            settings,
            tracker,
            capture: Box::new(NoCapture),
            seeder: None,
            state: MissionState::Idle,
            last_mission_aborted: false,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Replaces the default `NoCapture` collaborator
    pub fn with_capture(mut self, capture: Box<dyn ImageCapture>) -> Self {
        self.capture = capture;
        self
    }

    /// Output used to seed localization from home when a mission starts
    pub fn with_initial_pose_publisher(mut self, seeder: Box<dyn InitialPosePublisher>) -> Self {
        self.seeder = Some(seeder);
        self
    }

    /// Shares an existing running flag, e.g. one a signal handler already holds
    pub fn with_shutdown_handle(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Current phase
    pub fn state(&self) -> MissionState {
        self.state
    }

    /// Motion executor, for inspection
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Control channel, for inspection
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Loaded waypoint document
    pub fn waypoints(&self) -> &WaypointSet {
        &self.waypoints
    }

    /// Running flag. Clearing it cancels the goal in flight, cuts the localization
    /// wait short and makes `run` return.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Runs mission cycles until the shutdown flag is cleared
    pub fn run(&mut self) {
        while self.run_cycle().is_some() {}
        info!("[MAIN] control loop stopped");
    }

    /// Waits in `Idle` for a trigger and handles it; `None` once shut down
    pub fn run_cycle(&mut self) -> Option<CycleOutcome> {
        let outcome = match self.wait_for_trigger()? {
            Trigger::GoHome => {
                CycleOutcome::IdleReturn(self.return_home(HomeReturnMode::IdleGoHome))
            }
            Trigger::Start => self.run_mission(),
        };
        self.state = MissionState::Idle;
        Some(outcome)
    }

    fn wait_for_trigger(&mut self) -> Option<Trigger> {
        self.state = MissionState::Idle;
        if !self.is_running() {
            return None;
        }
        info!("[IDLE] Waiting for START or GO_HOME...");
        self.emit(StatusEvent::new(Status::MissionIdle));

        while self.is_running() {
            match self.channel.poll_command() {
                ControlCommand::GoHome => {
                    info!("[IDLE] go_home requested.");
                    self.emit(StatusEvent::new(Status::ReturnHomeRequested).with("phase", "idle"));
                    return Some(Trigger::GoHome);
                }
                ControlCommand::Abort => info!("[IDLE] abort while idle, nothing to stop"),
                ControlCommand::None => {}
            }

            if self.channel.poll_mission_start() {
                info!("[IDLE] start received.");
                self.emit(StatusEvent::new(Status::MissionStarted));
                return Some(Trigger::Start);
            }

            self.clock.sleep(self.settings.idle_tick());
            self.tracker.service(self.clock.now());
        }
        None
    }

    fn run_mission(&mut self) -> CycleOutcome {
        self.last_mission_aborted = false;

        if self.settings.seed_initial_pose_from_home {
            self.seed_initial_pose();
        }

        self.state = MissionState::AwaitingLocalization;
        self.wait_for_localization();

        let mut reached = Vec::new();
        let mut unreachable = Vec::new();
        let mut forced_home = false;
        if !self.is_running() {
            info!("[MAIN] shutdown before the first waypoint");
            return CycleOutcome::Interrupted {
                reached,
                unreachable,
            };
        }

        for index in 0..self.waypoints.len() {
            self.state = MissionState::ExecutingWaypoints(index);
            let target = &self.waypoints.targets()[index];
            let mut runner = WaypointRunner::new(
                &mut self.executor,
                &mut self.channel,
                &self.clock,
                self.settings.motion_tick(),
            )
            .with_tracker(&mut self.tracker)
            .with_running_flag(&self.running);
            if self.settings.debug_pose_diagnostics {
                runner = runner.with_diagnostics(self.waypoints.home());
            }
            let outcome = runner.run(index, target, self.settings.max_waypoint_retries);

            match outcome {
                WaypointOutcome::Success => {
                    reached.push(index);
                    self.capture_images(index);
                }
                WaypointOutcome::Unreachable => unreachable.push(index),
                WaypointOutcome::Abort => {
                    warn!("[MISSION] Aborted by operator. Staying idle (Go Home still works).");
                    self.last_mission_aborted = true;
                    return CycleOutcome::Aborted {
                        reached,
                        unreachable,
                    };
                }
                WaypointOutcome::GoHome => {
                    forced_home = true;
                    break;
                }
                WaypointOutcome::Interrupted => {
                    return CycleOutcome::Interrupted {
                        reached,
                        unreachable,
                    };
                }
            }
        }

        let mode = if forced_home {
            HomeReturnMode::Forced
        } else {
            HomeReturnMode::Normal
        };
        let home = self.return_home(mode);
        CycleOutcome::Finished {
            mode,
            home,
            reached,
            unreachable,
        }
    }

    fn seed_initial_pose(&mut self) {
        let Some(seeder) = self.seeder.as_mut() else {
            warn!("[INITPOSE] seeding requested but no initial pose output is configured");
            return;
        };
        let seed = InitialPoseSeed::from_home(self.waypoints.home());
        if best_effort("publish initial pose", seeder.publish(&seed)).is_none() {
            return;
        }
        warn!("[INITPOSE] Published initial pose from HOME. (Robot must physically be at HOME!)");
        self.emit(StatusEvent::new(Status::InitialposePublishedFromHome));

        // give localization a moment to take the seed
        for _ in 0..self.settings.settle_ticks {
            self.tick();
        }
    }

    /// Waits for the gate to settle or time out. Returns whether it settled; a timeout
    /// is not fatal, the mission proceeds either way.
    fn wait_for_localization(&mut self) -> bool {
        info!("[LOC] Waiting for stable localization...");
        self.emit(StatusEvent::new(Status::WaitingForLocalization));
        self.tracker.gate_mut().reset_window();

        let timeout = self.settings.localization.timeout();
        let start = self.clock.now();
        while self.is_running() {
            self.tick();
            let now = self.clock.now();

            let verdict = self.tracker.gate().is_stable(now);
            info!("[LOC] {}", verdict);
            if verdict.is_stable() {
                self.emit(StatusEvent::new(Status::LocalizationOk));
                return true;
            }
            if matches!(verdict, Stability::Unstable { .. }) {
                self.tracker.gate_mut().reset_window();
            }
            if now.saturating_duration_since(start) > timeout {
                warn!("[LOC] Timeout: continuing anyway (not ideal).");
                self.emit(StatusEvent::new(Status::LocalizationTimeout));
                return false;
            }
        }
        info!("[LOC] wait cut short by shutdown");
        false
    }

    fn return_home(&mut self, mode: HomeReturnMode) -> HomeOutcome {
        self.state = MissionState::ReturningHome(mode);
        let home = self.waypoints.home();
        let mut runner = WaypointRunner::new(
            &mut self.executor,
            &mut self.channel,
            &self.clock,
            self.settings.motion_tick(),
        )
        .with_tracker(&mut self.tracker)
        .with_running_flag(&self.running);

        runner.emit(StatusEvent::new(Status::ReturningHome).with("mode", mode.label()));
        best_effort("clear costmaps", runner.executor().clear_transient_state());
        info!(
            "[NAV] HOME({}): x={:.3}, y={:.3}, qz={:.3}, qw={:.3}",
            home.frame_id, home.x, home.y, home.qz, home.qw
        );

        let wait = match runner.executor().submit(home) {
            Ok(handle) => runner.drive_goal(handle, false),
            Err(e) => {
                warn!("[HOME] submit failed: {}", e);
                GoalWait::Completed(GoalResult::Failed)
            }
        };

        let outcome = match wait {
            GoalWait::Preempted(_) => {
                runner.emit(
                    StatusEvent::new(Status::MissionAbortedByOperator)
                        .with("phase", "return_home")
                        .with("mode", mode.label()),
                );
                HomeOutcome::Aborted
            }
            GoalWait::Interrupted => HomeOutcome::Interrupted,
            GoalWait::Completed(GoalResult::Succeeded) => {
                // go-home from idle only counts as after-abort when the last mission was aborted
                let status = match mode {
                    HomeReturnMode::Normal => Status::MissionComplete,
                    HomeReturnMode::Forced => Status::MissionCompleteAfterAbort,
                    HomeReturnMode::IdleGoHome if self.last_mission_aborted => {
                        Status::MissionCompleteAfterAbort
                    }
                    HomeReturnMode::IdleGoHome => Status::MissionComplete,
                };
                runner.emit(StatusEvent::new(status).with("mode", mode.label()));
                HomeOutcome::Reached
            }
            GoalWait::Completed(GoalResult::Failed) => {
                warn!("[HOME] home unreachable ({})", mode);
                runner.emit(
                    StatusEvent::new(Status::HomeUnreachableDuringMission).with("mode", mode.label()),
                );
                HomeOutcome::Unreachable
            }
        };

        match outcome {
            HomeOutcome::Aborted => self.last_mission_aborted = true,
            HomeOutcome::Reached => self.last_mission_aborted = false,
            HomeOutcome::Unreachable | HomeOutcome::Interrupted => {}
        }
        outcome
    }

    fn capture_images(&mut self, index: usize) {
        let id = &self.waypoints.targets()[index].id;
        let frames = self.settings.images_per_waypoint;
        match self.capture.capture(index, id, frames) {
            Ok(delivered) => info!("[IMG] waypoint {} ({}): {} frame(s) delivered", index, id, delivered),
            Err(e) => warn!("[IMG] waypoint {} ({}) capture failed: {}", index, id, e),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn tick(&mut self) {
        self.clock.sleep(self.settings.motion_tick());
        self.tracker.service(self.clock.now());
    }

    fn emit(&mut self, event: StatusEvent) {
        self.channel.emit_status(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::LocalPeer;
    use crate::core::{ManualClock, Pose};
    use crate::navigation::{MockImageCapture, SimulatedExecutor};
    use std::time::Duration;

    fn waypoints() -> WaypointSet {
        let home = Pose::new(0.0, 0.0, 0.0, 1.0, "map", "home");
        let targets = vec![
            Pose::new(1.0, 0.0, 0.0, 1.0, "map", "wp0"),
            Pose::new(2.0, 0.0, 0.0, 1.0, "map", "wp1"),
        ];
        WaypointSet::new("map", home, targets).unwrap()
    }

    fn settings() -> MissionSettings {
        MissionSettings {
            seed_initial_pose_from_home: false,
            ..MissionSettings::default()
        }
    }

    #[test]
    fn localization_timeout_does_not_block_the_mission() {
        let peer = LocalPeer::new();
        peer.request_start();
        let clock = ManualClock::new();
        let mut controller = MissionController::new(
            SimulatedExecutor::new(1),
            peer.clone(),
            &clock,
            waypoints(),
            settings(),
            PoseFeed::new(),
        );

        let outcome = controller.run_cycle().unwrap();

        assert!(matches!(outcome, CycleOutcome::Finished { home: HomeOutcome::Reached, .. }));
        assert_eq!(peer.count(Status::LocalizationTimeout), 1);
        assert_eq!(peer.count(Status::LocalizationOk), 0);
        assert!(clock.elapsed() > Duration::from_secs(25));
        assert_eq!(controller.state(), MissionState::Idle);
    }

    #[test]
    fn capture_failure_does_not_change_outcome() {
        let peer = LocalPeer::new();
        peer.request_start();
        let clock = ManualClock::new();
        let mut capture = MockImageCapture::new();
        capture
            .expect_capture()
            .times(2)
            .returning(|_, _, _| Err(crate::navigation::CaptureError::NoFrame));

        let mut controller = MissionController::new(
            SimulatedExecutor::new(0),
            peer.clone(),
            &clock,
            waypoints(),
            settings(),
            PoseFeed::new(),
        )
        .with_capture(Box::new(capture));

        let outcome = controller.run_cycle().unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Finished {
                mode: HomeReturnMode::Normal,
                home: HomeOutcome::Reached,
                reached: vec![0, 1],
                unreachable: vec![],
            }
        );
        assert_eq!(peer.count(Status::MissionComplete), 1);
    }

    /// Clears the running flag as soon as the localization wait is announced
    struct StopOnLocalizationWait {
        peer: LocalPeer,
        running: Arc<AtomicBool>,
    }

    impl RemoteControlChannel for StopOnLocalizationWait {
        fn poll_mission_start(&mut self) -> bool {
            self.peer.poll_mission_start()
        }

        fn poll_command(&mut self) -> ControlCommand {
            self.peer.poll_command()
        }

        fn emit_status(&mut self, event: &StatusEvent) {
            self.peer.emit_status(event);
            if event.status == Status::WaitingForLocalization {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn shutdown_during_localization_wait_skips_the_waypoints() {
        let peer = LocalPeer::new();
        peer.request_start();
        let running = Arc::new(AtomicBool::new(true));
        let clock = ManualClock::new();
        let channel = StopOnLocalizationWait {
            peer: peer.clone(),
            running: running.clone(),
        };
        let mut controller = MissionController::new(
            SimulatedExecutor::new(0),
            channel,
            &clock,
            waypoints(),
            settings(),
            PoseFeed::new(),
        )
        .with_shutdown_handle(running);

        let outcome = controller.run_cycle().unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Interrupted {
                reached: vec![],
                unreachable: vec![],
            }
        );
        assert!(controller.executor().submitted().is_empty());
        assert_eq!(peer.count(Status::LocalizationTimeout), 0);
        assert!(clock.elapsed() < Duration::from_secs(1));
        assert!(controller.run_cycle().is_none());
    }

    #[test]
    fn cleared_running_flag_ends_the_idle_wait() {
        let clock = ManualClock::new();
        let mut controller = MissionController::new(
            SimulatedExecutor::new(0),
            LocalPeer::new(),
            &clock,
            waypoints(),
            settings(),
            PoseFeed::new(),
        );
        controller.shutdown_handle().store(false, Ordering::SeqCst);
        assert!(controller.run_cycle().is_none());
    }
}
