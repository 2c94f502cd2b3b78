// navigation/runner.rs

// Drives the motion stack to one waypoint. Each attempt clears stale costmaps, submits
// the goal and then polls, one tick at a time, first the operator channel and then the
// goal. An abort or go-home cancels the goal in flight and ends the waypoint; a failed
// goal moves on to the next attempt until the retry budget is spent.

// Dependencies
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{best_effort, poll_goal, GoalHandle, GoalResult, GoalStatus, MotionExecutor};
use crate::control::{RemoteControlChannel, Status, StatusEvent};
use crate::core::{Clock, ControlCommand, LocalizationTracker, Pose};

/// How a waypoint ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointOutcome {
    /// Goal reached
    Success,
    /// Operator abort; the goal was cancelled
    Abort,
    /// Operator go-home; the goal was cancelled
    GoHome,
    /// Retry budget spent
    Unreachable,
    /// Process shutdown; the goal was cancelled
    Interrupted,
}

/// Result of waiting on one goal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GoalWait {
    Completed(GoalResult),
    Preempted(ControlCommand),
    Interrupted,
}

/// Borrows the mission's collaborators for the duration of one waypoint (or one
/// home return)
pub struct WaypointRunner<'a, E: ?Sized, C: ?Sized, K: ?Sized> {
    executor: &'a mut E,
    channel: &'a mut C,
    clock: &'a K,
    tick: Duration,
    tracker: Option<&'a mut LocalizationTracker>,
    diagnostics_home: Option<&'a Pose>,
    running: Option<&'a AtomicBool>,
}

impl<'a, E, C, K> WaypointRunner<'a, E, C, K>
where
    E: MotionExecutor + ?Sized,
    C: RemoteControlChannel + ?Sized,
    K: Clock + ?Sized,
{
    /// Creates a runner that sleeps `tick` between polls
    pub fn new(executor: &'a mut E, channel: &'a mut C, clock: &'a K, tick: Duration) -> Self {
        WaypointRunner {
            executor,
            channel,
            clock,
            tick,
            tracker: None,
            diagnostics_home: None,
            running: None,
        }
    }

    /// Stops the goal in flight once `running` is cleared
    pub fn with_running_flag(mut self, running: &'a AtomicBool) -> Self {
        self.running = Some(running);
        self
    }

    /// Keeps the localization intake serviced on every tick
    pub fn with_tracker(mut self, tracker: &'a mut LocalizationTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Logs the latest localization sample and its distance to `home` before each attempt
    pub fn with_diagnostics(mut self, home: &'a Pose) -> Self {
        self.diagnostics_home = Some(home);
        self
    }

    /// Runs up to `max_retries` attempts at `target`
    pub fn run(&mut self, index: usize, target: &Pose, max_retries: u32) -> WaypointOutcome {
        let id = target.id.as_str();

        for attempt in 1..=max_retries {
            if self.shutting_down() {
                info!("[NAV] shutdown before {} ({}) attempt {}", index, id, attempt);
                return WaypointOutcome::Interrupted;
            }
            self.emit(
                StatusEvent::new(Status::MovingToWaypoint)
                    .with("index", index)
                    .with("id", id)
                    .with("attempt", attempt),
            );
            info!("[NAV] Going to {} ({}) attempt {}", index, id, attempt);

            best_effort("clear costmaps", self.executor.clear_transient_state());
            self.log_diagnostics();
            info!(
                "[NAV] Goal({}): x={:.3}, y={:.3}, qz={:.3}, qw={:.3}",
                target.frame_id, target.x, target.y, target.qz, target.qw
            );

            let wait = match self.executor.submit(target) {
                Ok(handle) => self.drive_goal(handle, true),
                Err(e) => {
                    warn!("[NAV] submit for {} ({}) failed: {}", index, id, e);
                    GoalWait::Completed(GoalResult::Failed)
                }
            };

            match wait {
                GoalWait::Preempted(ControlCommand::GoHome) => {
                    self.emit(
                        StatusEvent::new(Status::ReturnHomeRequested)
                            .with("phase", "waypoint")
                            .with("index", index)
                            .with("id", id),
                    );
                    return WaypointOutcome::GoHome;
                }
                GoalWait::Preempted(_) => {
                    self.emit(
                        StatusEvent::new(Status::MissionAbortedByOperator)
                            .with("phase", "waypoint")
                            .with("index", index)
                            .with("id", id),
                    );
                    return WaypointOutcome::Abort;
                }
                GoalWait::Interrupted => return WaypointOutcome::Interrupted,
                GoalWait::Completed(GoalResult::Succeeded) => {
                    self.emit(
                        StatusEvent::new(Status::WaypointReached)
                            .with("index", index)
                            .with("id", id),
                    );
                    return WaypointOutcome::Success;
                }
                GoalWait::Completed(GoalResult::Failed) => {
                    warn!("[NAV] {} ({}) attempt {} failed", index, id, attempt);
                    self.emit(
                        StatusEvent::new(Status::WaypointFailedAttempt)
                            .with("index", index)
                            .with("id", id)
                            .with("attempt", attempt),
                    );
                }
            }
        }

        warn!("[NAV] {} ({}) unreachable after {} attempt(s)", index, id, max_retries);
        self.emit(
            StatusEvent::new(Status::WaypointUnreachable)
                .with("index", index)
                .with("id", id),
        );
        WaypointOutcome::Unreachable
    }

    /// Polls a submitted goal until it completes or the operator preempts it.
    /// Abort always preempts; go-home only when `honor_go_home` is set. A cleared
    /// running flag cancels the goal as well.
    pub(crate) fn drive_goal(&mut self, handle: GoalHandle, honor_go_home: bool) -> GoalWait {
        loop {
            if self.shutting_down() {
                info!("[MAIN] shutdown requested while {} in flight", handle);
                self.cancel(handle);
                return GoalWait::Interrupted;
            }

            match self.channel.poll_command() {
                ControlCommand::Abort => {
                    self.cancel(handle);
                    return GoalWait::Preempted(ControlCommand::Abort);
                }
                ControlCommand::GoHome if honor_go_home => {
                    self.cancel(handle);
                    return GoalWait::Preempted(ControlCommand::GoHome);
                }
                ControlCommand::GoHome => {
                    debug!("[HOME] go_home while already returning home, ignored");
                }
                ControlCommand::None => {}
            }

            match poll_goal(&mut *self.executor, handle) {
                GoalStatus::Pending => self.tick(),
                GoalStatus::Succeeded => return GoalWait::Completed(GoalResult::Succeeded),
                GoalStatus::Failed => return GoalWait::Completed(GoalResult::Failed),
            }
        }
    }

    pub(crate) fn emit(&mut self, event: StatusEvent) {
        self.channel.emit_status(&event);
    }

    pub(crate) fn executor(&mut self) -> &mut E {
        &mut *self.executor
    }

    fn shutting_down(&self) -> bool {
        self.running.is_some_and(|running| !running.load(Ordering::SeqCst))
    }

    fn cancel(&mut self, handle: GoalHandle) {
        info!("[NAV] Cancelling {}", handle);
        best_effort("cancel goal", self.executor.cancel(handle));
    }

    fn tick(&mut self) {
        self.clock.sleep(self.tick);
        if let Some(tracker) = self.tracker.as_deref_mut() {
            tracker.service(self.clock.now());
        }
    }

    fn log_diagnostics(&self) {
        let (Some(home), Some(tracker)) = (self.diagnostics_home, self.tracker.as_deref()) else {
            return;
        };
        if let Some(last) = tracker.last_sample() {
            info!(
                "[DBG] localization: x={:.3} y={:.3} qz={:.3} qw={:.3} | dist_to_HOME={:.3}m",
                last.x,
                last.y,
                last.qz,
                last.qw,
                last.distance_to(home)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{LocalPeer, MockRemoteControlChannel};
    use crate::core::ManualClock;
    use crate::navigation::{MockMotionExecutor, MotionError};
    use mockall::predicate::always;
    use mockall::Sequence;
    use rstest::rstest;

    const TICK: Duration = Duration::from_millis(100);

    fn target() -> Pose {
        Pose::new(1.0, 2.0, 0.0, 1.0, "map", "wp0")
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    fn always_failing_goal_is_unreachable_after_exact_budget(#[case] retries: u32) {
        let mut executor = MockMotionExecutor::new();
        executor.expect_clear_transient_state().returning(|| Ok(()));
        executor
            .expect_submit()
            .times(retries as usize)
            .returning(|_| Ok(GoalHandle(7)));
        executor.expect_is_complete().returning(|_| true);
        executor.expect_result().returning(|_| GoalResult::Failed);
        executor.expect_cancel().never();

        let mut peer = LocalPeer::new();
        let clock = ManualClock::new();
        let outcome =
            WaypointRunner::new(&mut executor, &mut peer, &clock, TICK).run(0, &target(), retries);

        assert_eq!(outcome, WaypointOutcome::Unreachable);
        assert_eq!(peer.count(Status::MovingToWaypoint), retries as usize);
        assert_eq!(peer.count(Status::WaypointFailedAttempt), retries as usize);
        assert_eq!(peer.count(Status::WaypointUnreachable), 1);
    }

    #[test]
    fn abort_mid_goal_cancels_exactly_once() {
        let mut executor = MockMotionExecutor::new();
        executor.expect_clear_transient_state().returning(|| Ok(()));
        executor.expect_submit().times(1).returning(|_| Ok(GoalHandle(1)));
        executor.expect_is_complete().returning(|_| false);
        executor
            .expect_cancel()
            .with(mockall::predicate::eq(GoalHandle(1)))
            .times(1)
            .returning(|_| Ok(()));

        let mut polls = 0;
        let mut channel = MockRemoteControlChannel::new();
        channel.expect_poll_command().returning(move || {
            polls += 1;
            if polls >= 4 {
                ControlCommand::Abort
            } else {
                ControlCommand::None
            }
        });
        channel.expect_emit_status().with(always()).returning(|_| ());

        let clock = ManualClock::new();
        let outcome =
            WaypointRunner::new(&mut executor, &mut channel, &clock, TICK).run(0, &target(), 3);

        assert_eq!(outcome, WaypointOutcome::Abort);
        // three pending polls, each followed by one tick
        assert_eq!(clock.elapsed(), TICK * 3);
    }

    #[test]
    fn cleared_running_flag_cancels_the_goal_without_operator_events() {
        let running = std::sync::Arc::new(AtomicBool::new(true));
        let stop = running.clone();
        let mut executor = MockMotionExecutor::new();
        executor.expect_clear_transient_state().returning(|| Ok(()));
        executor.expect_submit().times(1).returning(|_| Ok(GoalHandle(4)));
        executor.expect_is_complete().returning(move |_| {
            stop.store(false, Ordering::SeqCst);
            false
        });
        executor
            .expect_cancel()
            .with(mockall::predicate::eq(GoalHandle(4)))
            .times(1)
            .returning(|_| Ok(()));

        let mut peer = LocalPeer::new();
        let clock = ManualClock::new();
        let outcome = WaypointRunner::new(&mut executor, &mut peer, &clock, TICK)
            .with_running_flag(&running)
            .run(0, &target(), 3);

        assert_eq!(outcome, WaypointOutcome::Interrupted);
        assert_eq!(peer.count(Status::MovingToWaypoint), 1);
        assert_eq!(peer.count(Status::MissionAbortedByOperator), 0);
        assert_eq!(peer.count(Status::WaypointFailedAttempt), 0);
    }

    #[test]
    fn go_home_preempts_and_reports_request() {
        let mut executor = MockMotionExecutor::new();
        executor.expect_clear_transient_state().returning(|| Ok(()));
        executor.expect_submit().returning(|_| Ok(GoalHandle(2)));
        executor.expect_is_complete().returning(|_| false);
        executor.expect_cancel().times(1).returning(|_| Ok(()));

        let peer = LocalPeer::new();
        peer.request_go_home();
        let mut channel = peer.clone();
        let clock = ManualClock::new();
        let outcome =
            WaypointRunner::new(&mut executor, &mut channel, &clock, TICK).run(3, &target(), 3);

        assert_eq!(outcome, WaypointOutcome::GoHome);
        let last = peer.events().pop().unwrap();
        assert_eq!(last.status, Status::ReturnHomeRequested);
        assert_eq!(last.index(), Some(3));
    }

    #[test]
    fn succeeds_on_second_attempt_after_failure() {
        let mut seq = Sequence::new();
        let mut executor = MockMotionExecutor::new();
        executor.expect_clear_transient_state().returning(|| Ok(()));
        executor.expect_submit().times(2).returning(|_| Ok(GoalHandle(3)));
        executor.expect_is_complete().returning(|_| true);
        executor
            .expect_result()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| GoalResult::Failed);
        executor
            .expect_result()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| GoalResult::Succeeded);

        let mut peer = LocalPeer::new();
        let clock = ManualClock::new();
        let outcome =
            WaypointRunner::new(&mut executor, &mut peer, &clock, TICK).run(0, &target(), 3);

        assert_eq!(outcome, WaypointOutcome::Success);
        assert_eq!(peer.count(Status::WaypointFailedAttempt), 1);
        assert_eq!(peer.count(Status::WaypointReached), 1);
    }

    #[test]
    fn failing_side_calls_do_not_stop_the_attempt() {
        let mut executor = MockMotionExecutor::new();
        executor
            .expect_clear_transient_state()
            .returning(|| Err(MotionError::Unavailable("costmap service".into())));
        executor
            .expect_submit()
            .times(2)
            .returning(|_| Err(MotionError::Rejected("server busy".into())));

        let mut peer = LocalPeer::new();
        let clock = ManualClock::new();
        let outcome =
            WaypointRunner::new(&mut executor, &mut peer, &clock, TICK).run(1, &target(), 2);

        assert_eq!(outcome, WaypointOutcome::Unreachable);
        assert_eq!(peer.count(Status::WaypointFailedAttempt), 2);
    }
}
