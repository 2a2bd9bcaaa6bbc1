//! Session state owned by the state machine

use serde::{Deserialize, Serialize};

/// What the session is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not listening, nothing running
    #[default]
    Idle,
    /// Waiting for a spoken command
    Listening,
    /// Acquiring the camera stream
    OpeningCamera,
    /// Running warm-up detection passes
    Detecting,
    /// Waiting on the question-answering service
    Thinking,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Listening => write!(f, "Listening"),
            Phase::OpeningCamera => write!(f, "OpeningCamera"),
            Phase::Detecting => write!(f, "Detecting"),
            Phase::Thinking => write!(f, "Thinking"),
        }
    }
}

/// Process-wide session flags
///
/// `busy == true` means a command cycle is running and no other command
/// may be dispatched until it clears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub busy: bool,
    pub auto_listen: bool,
    pub phase: Phase,
}

impl SessionState {
    /// Whether listening may be (re)started right now
    pub fn may_listen(&self) -> bool {
        self.auto_listen && !self.busy
    }
}
