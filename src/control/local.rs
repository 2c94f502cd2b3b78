// control/local.rs
// In-process control-plane peer. Operator requests are one-shot flags consumed by the
// controller's polls; emitted events are kept and folded into a MissionLedger.

use log::info;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MissionLedger, RemoteControlChannel, Status, StatusEvent};
use crate::core::ControlCommand;

#[derive(Debug, Default)]
struct PeerState {
    start_requested: bool,
    pending_command: ControlCommand,
    events: Vec<StatusEvent>,
    ledger: MissionLedger,
}

/// Cloneable handle: the controller polls one clone, the operator side drives another
#[derive(Clone, Debug, Default)]
pub struct LocalPeer {
    state: Arc<Mutex<PeerState>>,
}

impl LocalPeer {
    /// Peer with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Operator presses start
    pub fn request_start(&self) {
        self.lock().start_requested = true;
    }

    /// Operator presses abort
    pub fn request_abort(&self) {
        self.lock().pending_command = ControlCommand::Abort;
    }

    /// Operator presses go-home
    pub fn request_go_home(&self) {
        self.lock().pending_command = ControlCommand::GoHome;
    }

    /// Wire value of the mission state, consuming a pending start
    pub fn mission_state(&self) -> &'static str {
        let mut state = self.lock();
        if std::mem::take(&mut state.start_requested) {
            "start"
        } else {
            "idle"
        }
    }

    /// Every event received so far
    pub fn events(&self) -> Vec<StatusEvent> {
        self.lock().events.clone()
    }

    /// Statuses of every event, in order
    pub fn statuses(&self) -> Vec<Status> {
        self.lock().events.iter().map(|e| e.status).collect()
    }

    /// How many events carried `status`
    pub fn count(&self, status: Status) -> usize {
        self.lock().events.iter().filter(|e| e.status == status).count()
    }

    /// Adds captured frames to the open run
    pub fn register_images(&self, count: u32) {
        self.lock().ledger.register_images(count);
    }

    /// Snapshot of the run history
    pub fn ledger(&self) -> MissionLedger {
        self.lock().ledger.clone()
    }
}

impl RemoteControlChannel for LocalPeer {
    fn poll_mission_start(&mut self) -> bool {
        self.mission_state() == "start"
    }

    fn poll_command(&mut self) -> ControlCommand {
        std::mem::take(&mut self.lock().pending_command)
    }

    fn emit_status(&mut self, event: &StatusEvent) {
        info!("[PEER] {}", event.to_payload());
        let mut state = self.lock();
        state.ledger.apply(event);
        state.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_delivered_once() {
        let mut peer = LocalPeer::new();
        peer.request_start();
        assert!(peer.poll_mission_start());
        assert!(!peer.poll_mission_start());
    }

    #[test]
    fn mission_state_reads_start_then_idle() {
        let peer = LocalPeer::new();
        peer.request_start();
        assert_eq!(peer.mission_state(), "start");
        assert_eq!(peer.mission_state(), "idle");
    }

    #[test]
    fn command_is_consumed_and_latest_wins() {
        let operator = LocalPeer::new();
        let mut controller_side = operator.clone();
        operator.request_abort();
        operator.request_go_home();
        assert_eq!(controller_side.poll_command(), ControlCommand::GoHome);
        assert_eq!(controller_side.poll_command(), ControlCommand::None);
    }

    #[test]
    fn events_feed_the_ledger() {
        let mut peer = LocalPeer::new();
        peer.emit_status(&StatusEvent::new(Status::MissionStarted));
        peer.register_images(2);
        assert_eq!(peer.count(Status::MissionStarted), 1);
        assert_eq!(peer.ledger().current().unwrap().images_count, 2);
    }
}
