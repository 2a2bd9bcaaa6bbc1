//! Session module: the hub that owns busy/idle and auto-listen
//!
//! Phases:
//! - Idle: not listening, nothing running
//! - Listening: waiting for a spoken command
//! - OpeningCamera, Detecting, Thinking: a command cycle is in flight

mod cycle;
mod machine;
mod state;

pub use cycle::{Components, CycleError, CAMERA_OFF, CAMERA_ON, HELP_TEXT};
pub use machine::{SessionMachine, SessionTimings, RESULT_DWELL, RETRY_BACKOFF};
pub use state::{Phase, SessionState};
