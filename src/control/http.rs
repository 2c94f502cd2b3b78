// control/http.rs
// HTTP control channel: polls the peer's one-shot endpoints and posts status updates.

use log::{debug, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::{RemoteControlChannel, StatusEvent};
use crate::core::ControlCommand;

/// Transport failures talking to the peer. Only building the client reports one to
/// the caller; once running, the channel contract maps each to a safe default.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Client setup or the request itself failed
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Peer answered with a non-success status code
    #[error("peer answered HTTP {0}")]
    Status(u16),
}

#[derive(Deserialize, Debug, Default)]
struct MissionStateReply {
    #[serde(default)]
    mission_state: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct ControlStateReply {
    #[serde(default)]
    command: Option<String>,
}

/// Control channel backed by the peer's `mission_state`, `control_state` and
/// `status_update` endpoints
pub struct HttpControlChannel {
    client: Client,
    base: String,
}

impl HttpControlChannel {
    /// Builds the client; `timeout` bounds every request
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, ChannelError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpControlChannel {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Peer base URL without a trailing slash
    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base, endpoint)
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T, ChannelError> {
        let resp = self.client.get(self.url(endpoint)).send()?;
        if !resp.status().is_success() {
            return Err(ChannelError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<T>()?)
    }

    fn post_status(&self, event: &StatusEvent) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.url("status_update"))
            .json(&event.to_payload())
            .send()?;
        if !resp.status().is_success() {
            return Err(ChannelError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

impl RemoteControlChannel for HttpControlChannel {
    fn poll_mission_start(&mut self) -> bool {
        match self.get::<MissionStateReply>("mission_state") {
            Ok(reply) => reply.mission_state.as_deref() == Some("start"),
            Err(e) => {
                debug!("[HTTP] poll /mission_state failed: {}", e);
                false
            }
        }
    }

    fn poll_command(&mut self) -> ControlCommand {
        match self.get::<ControlStateReply>("control_state") {
            Ok(reply) => reply
                .command
                .as_deref()
                .map(ControlCommand::from_wire)
                .unwrap_or_default(),
            Err(e) => {
                warn!("[HTTP] poll /control_state failed: {}", e);
                ControlCommand::None
            }
        }
    }

    fn emit_status(&mut self, event: &StatusEvent) {
        if let Err(e) = self.post_status(event) {
            warn!("[HTTP] status '{}' failed: {}", event.status, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    // Serves one canned HTTP response per accepted connection, then exits.
    fn serve(responses: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for body in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn parses_one_shot_replies() {
        let base = serve(vec![
            r#"{"mission_state": "start"}"#,
            r#"{"mission_state": "idle"}"#,
            r#"{"command": "go_home"}"#,
            r#"{"command": "reboot"}"#,
        ]);
        let mut channel = HttpControlChannel::new(base, Duration::from_secs(2)).unwrap();
        assert!(channel.poll_mission_start());
        assert!(!channel.poll_mission_start());
        assert_eq!(channel.poll_command(), ControlCommand::GoHome);
        assert_eq!(channel.poll_command(), ControlCommand::None);
    }

    #[test]
    fn unreachable_peer_degrades_to_safe_defaults() {
        // Bind then drop so the port is closed.
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let mut channel =
            HttpControlChannel::new(format!("http://{addr}/"), Duration::from_millis(300)).unwrap();
        assert!(!channel.poll_mission_start());
        assert_eq!(channel.poll_command(), ControlCommand::None);
        channel.emit_status(&StatusEvent::new(crate::control::Status::MissionIdle));
    }
}
