//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::SessionEvent;
use crate::session::Phase;

/// Largest message either side accepts
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from a status display to the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request the current session status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Push every session event to this client from now on
    Subscribe,
}

/// Responses from the assistant to a status display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current session status
    Status(SessionStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    SessionEvent { event: SessionEvent },
}

/// What every display surface currently shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub version: String,

    pub phase: Phase,

    /// Busy indicator
    pub busy: bool,

    /// Video surface visible
    pub camera_open: bool,

    /// Status line text
    pub status_line: String,

    /// Result text area, `None` when cleared
    pub result_text: Option<String>,

    pub uptime_secs: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phase: Phase::default(),
            busy: false,
            camera_open: false,
            status_line: String::new(),
            result_text: None,
            uptime_secs: 0,
        }
    }
}

impl SessionStatus {
    /// Fold one session event into the snapshot
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::PhaseChanged { phase, busy } => {
                self.phase = *phase;
                self.busy = *busy;
            }
            SessionEvent::StatusChanged { text, .. } => self.status_line = text.clone(),
            SessionEvent::ResultShown { text } => self.result_text = Some(text.clone()),
            SessionEvent::ResultCleared => self.result_text = None,
            SessionEvent::VideoVisibility { visible } => self.camera_open = *visible,
            SessionEvent::CommandIgnored { .. } | SessionEvent::Spoke { .. } => {}
        }
    }
}
