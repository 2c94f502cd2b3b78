// control/ledger.rs

// Reconstructs mission runs from the status stream the controller emits. The robot
// never holds this record itself; a status sink (the peer, or LocalPeer in simulation)
// folds events into it.

// Dependencies
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Status, StatusEvent};

/// Lifecycle of one recorded run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Mission in progress
    Running,
    /// Robot made it home
    Complete,
    /// Home goal failed
    HomeUnreachable,
    /// Operator abort
    Aborted,
}

impl RunPhase {
    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunPhase::Running)
    }
}

/// One idle -> execute -> return cycle as seen by the status sink
#[derive(Clone, Debug, PartialEq)]
pub struct MissionRun {
    /// Run identifier, unique within the ledger
    pub id: String,
    /// When `mission_started` arrived
    pub started_at: SystemTime,
    /// When the terminal event arrived
    pub ended_at: Option<SystemTime>,
    /// Current phase
    pub phase: RunPhase,
    /// Ids of waypoints reached
    pub waypoints_reached: BTreeSet<String>,
    /// Ids of waypoints given up on
    pub waypoints_unreachable: BTreeSet<String>,
    /// Frames registered against this run
    pub images_count: u32,
}

/// Ordered history of runs, newest last
#[derive(Clone, Debug, Default)]
pub struct MissionLedger {
    runs: Vec<MissionRun>,
}

impl MissionLedger {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one status event into the history
    pub fn apply(&mut self, event: &StatusEvent) {
        let now = SystemTime::now();
        if event.status == Status::MissionStarted {
            if self.current_mut().is_none() {
                self.open(now);
            }
            return;
        }

        // Everything else only touches a run that is still open.
        let Some(run) = self.current_mut() else {
            return;
        };
        let waypoint = || {
            event
                .field("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| event.index().map(|i| format!("wp{i}")))
        };
        match event.status {
            Status::WaypointReached => {
                if let Some(id) = waypoint() {
                    run.waypoints_reached.insert(id);
                }
            }
            Status::WaypointUnreachable => {
                if let Some(id) = waypoint() {
                    run.waypoints_unreachable.insert(id);
                }
            }
            Status::MissionComplete | Status::MissionCompleteAfterAbort => {
                run.close(RunPhase::Complete, now)
            }
            Status::HomeUnreachableDuringMission => run.close(RunPhase::HomeUnreachable, now),
            Status::MissionAbortedByOperator => run.close(RunPhase::Aborted, now),
            _ => {}
        }
    }

    /// Counts frames uploaded for the open run
    pub fn register_images(&mut self, count: u32) {
        if let Some(run) = self.current_mut() {
            run.images_count += count;
        }
    }

    /// Run still in progress, if any
    pub fn current(&self) -> Option<&MissionRun> {
        self.runs.last().filter(|run| !run.phase.is_terminal())
    }

    /// All runs, oldest first
    pub fn runs(&self) -> &[MissionRun] {
        &self.runs
    }

    /// Most recent run, open or not
    pub fn last(&self) -> Option<&MissionRun> {
        self.runs.last()
    }

    fn current_mut(&mut self) -> Option<&mut MissionRun> {
        self.runs.last_mut().filter(|run| !run.phase.is_terminal())
    }

    fn open(&mut self, now: SystemTime) {
        let stamp = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        self.runs.push(MissionRun {
            id: format!("mission_{}_{:03}", stamp, self.runs.len() + 1),
            started_at: now,
            ended_at: None,
            phase: RunPhase::Running,
            waypoints_reached: BTreeSet::new(),
            waypoints_unreachable: BTreeSet::new(),
            images_count: 0,
        });
    }
}

impl MissionRun {
    fn close(&mut self, phase: RunPhase, now: SystemTime) {
        self.phase = phase;
        self.ended_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(status: Status) -> StatusEvent {
        StatusEvent::new(status)
    }

    #[test]
    fn events_before_start_are_ignored() {
        let mut ledger = MissionLedger::new();
        ledger.apply(&ev(Status::WaypointReached).with("index", 0).with("id", "wp0"));
        ledger.apply(&ev(Status::MissionComplete));
        assert!(ledger.runs().is_empty());
    }

    #[test]
    fn folds_a_full_run() {
        let mut ledger = MissionLedger::new();
        ledger.apply(&ev(Status::MissionStarted));
        ledger.apply(&ev(Status::WaypointReached).with("index", 0).with("id", "wp0"));
        ledger.register_images(3);
        ledger.apply(&ev(Status::WaypointUnreachable).with("index", 1));
        ledger.apply(&ev(Status::MissionComplete).with("mode", "normal"));

        let run = ledger.last().unwrap();
        assert_eq!(run.phase, RunPhase::Complete);
        assert!(run.ended_at.is_some());
        assert!(run.waypoints_reached.contains("wp0"));
        assert!(run.waypoints_unreachable.contains("wp1"));
        assert_eq!(run.images_count, 3);
        assert!(ledger.current().is_none());
    }

    #[test]
    fn abort_closes_and_next_start_opens_a_new_run() {
        let mut ledger = MissionLedger::new();
        ledger.apply(&ev(Status::MissionStarted));
        ledger.apply(&ev(Status::MissionAbortedByOperator));
        ledger.apply(&ev(Status::MissionCompleteAfterAbort));
        assert_eq!(ledger.last().unwrap().phase, RunPhase::Aborted);

        ledger.apply(&ev(Status::MissionStarted));
        assert_eq!(ledger.runs().len(), 2);
        assert_eq!(ledger.current().unwrap().phase, RunPhase::Running);
    }
}
