//! Events module for session updates
//!
//! Every display sink (status line, result text, busy indicator, video
//! surface) is driven by these events rather than by the state machine
//! writing to it directly.

use serde::{Deserialize, Serialize};

use crate::session::Phase;

/// Events emitted by the session state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Phase or busy flag changed
    PhaseChanged { phase: Phase, busy: bool },

    /// Status line text changed
    StatusChanged {
        text: String,
        /// Transient statuses (recognition errors) are replaced on retry
        transient: bool,
    },

    /// Result text area was filled
    ResultShown { text: String },

    /// Result text area was cleared
    ResultCleared,

    /// Video surface shown or hidden
    VideoVisibility { visible: bool },

    /// A transcript arrived while a command cycle was running
    CommandIgnored { transcript: String },

    /// An utterance was handed to speech synthesis
    Spoke { text: String },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::PhaseChanged { phase, busy } => {
                write!(f, "PHASE_CHANGED ({phase}, busy={busy})")
            }
            SessionEvent::StatusChanged { text, .. } => write!(f, "STATUS ({text})"),
            SessionEvent::ResultShown { text } => write!(f, "RESULT ({text})"),
            SessionEvent::ResultCleared => write!(f, "RESULT_CLEARED"),
            SessionEvent::VideoVisibility { visible } => {
                write!(f, "VIDEO_{}", if *visible { "SHOWN" } else { "HIDDEN" })
            }
            SessionEvent::CommandIgnored { transcript } => {
                write!(f, "COMMAND_IGNORED ({transcript})")
            }
            SessionEvent::Spoke { text } => write!(f, "SPOKE ({text})"),
        }
    }
}
