//! Command cycles
//!
//! One cycle handles one classified intent from start to finish. Failures
//! are returned as [`CycleError`] and turned into a spoken message by the
//! state machine.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::camera::{CameraError, CameraSession};
use crate::detection::{describe, DetectionAggregator, DetectionError};
use crate::events::SessionEvent;
use crate::intent::Intent;
use crate::qa::{QaBridge, QaError};
use crate::speech::UtteranceSpeaker;

use super::state::{Phase, SessionState};

/// Spoken and displayed for the help intent
pub const HELP_TEXT: &str = "You can say: open camera, what do you see, close camera, \
     or ask me any question.";

pub const CAMERA_ON: &str = "The camera is on.";
pub const CAMERA_OFF: &str = "The camera is off.";

/// Everything a command cycle may drive
pub struct Components {
    pub camera: CameraSession,
    pub detector: DetectionAggregator,
    pub speaker: UtteranceSpeaker,
    pub qa: QaBridge,
}

/// A failure that aborts the current cycle but not the session
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Qa(#[from] QaError),
}

impl CycleError {
    /// Short sentence to speak and display
    pub fn user_message(&self) -> &'static str {
        match self {
            CycleError::Camera(e) => e.user_message(),
            CycleError::Detection(e) => e.user_message(),
            CycleError::Qa(e) => e.user_message(),
        }
    }
}

/// What a finished cycle asks of the state machine
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Start the result dwell timer that ends in a reset
    pub auto_reset: bool,
}

/// Clear the result area and release the camera
pub(super) fn clear_surfaces(camera: &mut CameraSession, event_tx: &broadcast::Sender<SessionEvent>) {
    camera.close();
    let _ = event_tx.send(SessionEvent::ResultCleared);
}

/// A single in-flight command cycle
pub(super) struct Cycle<'a> {
    pub components: &'a mut Components,
    pub state: &'a mut SessionState,
    pub event_tx: &'a broadcast::Sender<SessionEvent>,
}

impl Cycle<'_> {
    pub async fn run(mut self, intent: Intent) -> Result<CycleOutcome, CycleError> {
        match intent {
            Intent::Help => {
                self.present(HELP_TEXT);
                Ok(CycleOutcome::default())
            }
            Intent::OpenCamera => self.open_camera(false).await,
            Intent::CloseCamera => {
                clear_surfaces(&mut self.components.camera, self.event_tx);
                self.status("Camera closed");
                self.components.speaker.say(CAMERA_OFF);
                Ok(CycleOutcome::default())
            }
            Intent::Detect => self.open_camera(true).await,
            Intent::FreeFormQuestion(question) => self.answer(&question).await,
            Intent::NoMatch => Ok(CycleOutcome::default()),
        }
    }

    /// Open the camera, chaining into detection when `want_analysis`
    async fn open_camera(&mut self, want_analysis: bool) -> Result<CycleOutcome, CycleError> {
        if !self.components.camera.is_open() {
            self.set_phase(Phase::OpeningCamera);
            self.status("Opening camera...");
            self.components.camera.open().await?;
        }

        if want_analysis {
            return self.detect().await;
        }

        self.status("Camera ready");
        self.components.speaker.say(CAMERA_ON);
        Ok(CycleOutcome::default())
    }

    async fn detect(&mut self) -> Result<CycleOutcome, CycleError> {
        self.set_phase(Phase::Detecting);
        self.status("Looking...");

        let components = &mut *self.components;
        let found = components.detector.analyze(&mut components.camera).await?;
        info!(count = found.len(), "detection finished");

        self.present(&describe(&found));
        Ok(CycleOutcome { auto_reset: true })
    }

    async fn answer(&mut self, question: &str) -> Result<CycleOutcome, CycleError> {
        self.set_phase(Phase::Thinking);
        self.status("Thinking...");

        let answer = self.components.qa.ask(question).await?;
        self.present(&answer);
        Ok(CycleOutcome::default())
    }

    /// Display and speak a result
    fn present(&self, text: &str) {
        let _ = self.event_tx.send(SessionEvent::ResultShown {
            text: text.to_string(),
        });
        self.components.speaker.say(text);
    }

    fn status(&self, text: &str) {
        let _ = self.event_tx.send(SessionEvent::StatusChanged {
            text: text.to_string(),
            transient: false,
        });
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase == phase {
            return;
        }
        debug!(from = %self.state.phase, to = %phase, "cycle phase");
        self.state.phase = phase;
        let _ = self.event_tx.send(SessionEvent::PhaseChanged {
            phase,
            busy: self.state.busy,
        });
    }
}
