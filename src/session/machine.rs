//! Core state machine implementation
//!
//! Drives the listening loop: awaits one recognition event at a time,
//! dispatches commands behind the busy gate, and restarts the recognizer
//! after every session end, error backoff and finished cycle.

use std::future::pending;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::events::SessionEvent;
use crate::intent::{classify, Intent};
use crate::speech::{RecognitionError, RecognitionEvent, SpeechRecognizer, Transcript};

use super::cycle::{clear_surfaces, Components, Cycle, CycleError, CycleOutcome};
use super::state::{Phase, SessionState};

/// Delay before listening restarts after a recognition error
pub const RETRY_BACKOFF: Duration = Duration::from_millis(800);

/// How long detection results stay up before the session resets itself
pub const RESULT_DWELL: Duration = Duration::from_secs(8);

/// Session-level timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub retry_backoff: Duration,
    pub result_dwell: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            retry_backoff: RETRY_BACKOFF,
            result_dwell: RESULT_DWELL,
        }
    }
}

/// Sleep until `deadline`, or forever when there is none
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// The hub that owns the session state and sequences every component
pub struct SessionMachine {
    state: SessionState,
    /// A recognition session is armed
    listening: bool,
    recognizer: Box<dyn SpeechRecognizer>,
    components: Components,
    timings: SessionTimings,
    retry_at: Option<Instant>,
    reset_at: Option<Instant>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionMachine {
    /// Create a new state machine
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        components: Components,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: SessionState::default(),
            listening: false,
            recognizer,
            components,
            timings: SessionTimings::default(),
            retry_at: None,
            reset_at: None,
            event_tx,
        }
    }

    #[cfg(test)]
    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Get the current state
    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn camera_open(&self) -> bool {
        self.components.camera.is_open()
    }

    /// Turn on auto-listen and start the first recognition session
    pub fn start(&mut self) -> ControlFlow<()> {
        info!("session starting");
        self.state.auto_listen = true;
        self.ensure_listening()
    }

    /// Release the camera and stop restarting the recognizer
    pub fn shutdown(&mut self) {
        self.state.auto_listen = false;
        self.retry_at = None;
        self.reset_at = None;
        self.components.camera.close();
        self.set_phase(Phase::Idle);
        info!("session stopped");
    }

    /// Stop the stream, clear the display and go back to listening
    ///
    /// Calling it again with nothing to tear down changes nothing.
    pub fn reset(&mut self) -> ControlFlow<()> {
        debug!("session reset");
        self.reset_at = None;
        clear_surfaces(&mut self.components.camera, &self.event_tx);
        if !self.state.may_listen() {
            self.set_phase(Phase::Idle);
        }
        self.ensure_listening()
    }

    /// Run the listening loop until input closes
    pub async fn run(&mut self, mut events: mpsc::Receiver<RecognitionEvent>) {
        info!("state machine started");

        if self.start().is_continue() {
            loop {
                let flow = tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => self.handle_event(event, &mut events).await,
                        None => ControlFlow::Break(()),
                    },
                    _ = wait_for(self.retry_at) => {
                        self.retry_at = None;
                        debug!("retrying recognition");
                        self.ensure_listening()
                    }
                    _ = wait_for(self.reset_at) => {
                        info!("result dwell elapsed");
                        self.reset()
                    }
                };

                if flow.is_break() {
                    break;
                }
            }
        }

        info!("state machine stopped");
    }

    async fn handle_event(
        &mut self,
        event: RecognitionEvent,
        events: &mut mpsc::Receiver<RecognitionEvent>,
    ) -> ControlFlow<()> {
        match event {
            RecognitionEvent::Result(transcript) => self.dispatch(transcript, events).await,
            RecognitionEvent::End => {
                self.listening = false;
                self.ensure_listening()
            }
            RecognitionEvent::Error(RecognitionError::InputClosed) => {
                info!("speech input closed");
                ControlFlow::Break(())
            }
            RecognitionEvent::Error(e) => {
                self.listening = false;
                warn!(error = %e, "recognition error");
                announce_retry(&self.event_tx, &e);
                self.retry_at = Some(Instant::now() + self.timings.retry_backoff);
                self.set_phase(Phase::Idle);
                ControlFlow::Continue(())
            }
        }
    }

    async fn dispatch(
        &mut self,
        transcript: Transcript,
        events: &mut mpsc::Receiver<RecognitionEvent>,
    ) -> ControlFlow<()> {
        if self.state.busy {
            note_ignored(&self.event_tx, &transcript);
            return ControlFlow::Continue(());
        }

        let intent = classify(transcript.as_str());
        if !intent.starts_cycle() {
            debug!(%transcript, "no command matched");
            return self.ensure_listening();
        }

        info!(%transcript, ?intent, "command received");
        self.run_cycle(intent, events).await
    }

    /// Run one command cycle with the busy gate held
    ///
    /// Recognition events that arrive meanwhile are consumed here so no
    /// second cycle can start. `busy` is cleared whatever the outcome.
    async fn run_cycle(
        &mut self,
        intent: Intent,
        events: &mut mpsc::Receiver<RecognitionEvent>,
    ) -> ControlFlow<()> {
        self.reset_at = None;
        self.state.busy = true;
        let _ = self.event_tx.send(SessionEvent::PhaseChanged {
            phase: self.state.phase,
            busy: true,
        });

        let mut input_closed = false;
        let outcome = {
            let cycle = Cycle {
                components: &mut self.components,
                state: &mut self.state,
                event_tx: &self.event_tx,
            }
            .run(intent);
            tokio::pin!(cycle);

            loop {
                tokio::select! {
                    outcome = &mut cycle => break outcome,
                    event = events.recv(), if !input_closed => match event {
                        Some(RecognitionEvent::Result(transcript)) => {
                            note_ignored(&self.event_tx, &transcript);
                        }
                        Some(RecognitionEvent::End) => self.listening = false,
                        Some(RecognitionEvent::Error(RecognitionError::InputClosed)) | None => {
                            self.listening = false;
                            input_closed = true;
                        }
                        Some(RecognitionEvent::Error(e)) => {
                            warn!(error = %e, "recognition error during cycle");
                            self.listening = false;
                            announce_retry(&self.event_tx, &e);
                            self.retry_at = Some(Instant::now() + self.timings.retry_backoff);
                        }
                    },
                }
            }
        };

        self.finish_cycle(outcome);

        if input_closed {
            info!("speech input closed");
            return ControlFlow::Break(());
        }
        self.ensure_listening()
    }

    fn finish_cycle(&mut self, outcome: Result<CycleOutcome, CycleError>) {
        self.state.busy = false;

        match outcome {
            Ok(outcome) => {
                if outcome.auto_reset {
                    self.reset_at = Some(Instant::now() + self.timings.result_dwell);
                }
            }
            Err(e) => {
                warn!(error = %e, "command cycle failed");
                let message = e.user_message();
                let _ = self.event_tx.send(SessionEvent::StatusChanged {
                    text: message.to_string(),
                    transient: false,
                });
                let _ = self.event_tx.send(SessionEvent::ResultShown {
                    text: message.to_string(),
                });
                self.components.speaker.say(message);
            }
        }

        let phase = if self.state.auto_listen && self.retry_at.is_none() {
            Phase::Listening
        } else {
            Phase::Idle
        };
        self.state.phase = phase;
        let _ = self.event_tx.send(SessionEvent::PhaseChanged { phase, busy: false });
    }

    /// Arm the recognizer if auto-listen is on and the gate is open
    ///
    /// A pending retry wins; the backoff timer arms the recognizer instead.
    fn ensure_listening(&mut self) -> ControlFlow<()> {
        if !self.state.may_listen() || self.retry_at.is_some() {
            return ControlFlow::Continue(());
        }

        if !self.listening {
            match self.recognizer.start() {
                Ok(()) | Err(RecognitionError::AlreadyListening) => {
                    debug!("listening");
                    self.listening = true;
                }
                Err(RecognitionError::InputClosed) => {
                    info!("speech input closed");
                    return ControlFlow::Break(());
                }
                Err(e) => {
                    warn!(error = %e, "failed to start recognition");
                    self.retry_at = Some(Instant::now() + self.timings.retry_backoff);
                    self.set_phase(Phase::Idle);
                    return ControlFlow::Continue(());
                }
            }
        }

        self.set_phase(Phase::Listening);
        ControlFlow::Continue(())
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase == phase {
            return;
        }

        info!(from = %self.state.phase, to = %phase, "phase transition");
        self.state.phase = phase;
        let _ = self.event_tx.send(SessionEvent::PhaseChanged {
            phase,
            busy: self.state.busy,
        });
    }
}

fn announce_retry(event_tx: &broadcast::Sender<SessionEvent>, error: &RecognitionError) {
    let _ = event_tx.send(SessionEvent::StatusChanged {
        text: format!("Didn't catch that ({error}). Listening again shortly."),
        transient: true,
    });
}

fn note_ignored(event_tx: &broadcast::Sender<SessionEvent>, transcript: &Transcript) {
    debug!(%transcript, "command ignored while busy");
    let _ = event_tx.send(SessionEvent::CommandIgnored {
        transcript: transcript.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraError;
    use crate::detection::{describe, Detection, NOTHING_IDENTIFIED};
    use crate::qa::UNAVAILABLE;
    use crate::session::cycle::{CAMERA_OFF, CAMERA_ON, HELP_TEXT};
    use crate::testing::{
        components, next_matching, CameraProbe, ScriptedCamera, ScriptedLoader,
        ScriptedRecognizer,
    };

    use std::sync::Arc;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    struct Harness {
        tx: mpsc::Sender<RecognitionEvent>,
        events: broadcast::Receiver<SessionEvent>,
        recognizer: ScriptedRecognizer,
        handle: JoinHandle<SessionMachine>,
    }

    impl Harness {
        fn spawn(camera: ScriptedCamera, loader: ScriptedLoader) -> Self {
            Self::spawn_with(
                ScriptedRecognizer::default(),
                camera,
                loader,
                SessionTimings::default(),
            )
        }

        fn spawn_with(
            recognizer: ScriptedRecognizer,
            camera: ScriptedCamera,
            loader: ScriptedLoader,
            timings: SessionTimings,
        ) -> Self {
            let (event_tx, events) = broadcast::channel(256);
            let machine = SessionMachine::new(
                Box::new(recognizer.clone()),
                components(camera, loader, event_tx.clone()),
                event_tx,
            )
            .with_timings(timings);

            let (tx, rx) = mpsc::channel(16);
            let handle = tokio::spawn(async move {
                let mut machine = machine;
                machine.run(rx).await;
                machine
            });

            Self {
                tx,
                events,
                recognizer,
                handle,
            }
        }

        fn idle() -> Self {
            Self::spawn(
                ScriptedCamera::ready(CameraProbe::default()),
                ScriptedLoader::with_passes(vec![vec![]]),
            )
        }

        async fn say(&self, text: &str) {
            self.tx
                .send(RecognitionEvent::Result(Transcript::new(text)))
                .await
                .unwrap();
        }

        async fn spoken(&mut self) -> String {
            match next_matching(&mut self.events, |e| matches!(e, SessionEvent::Spoke { .. })).await
            {
                SessionEvent::Spoke { text } => text,
                _ => unreachable!(),
            }
        }

        async fn settle(&mut self) {
            next_matching(&mut self.events, |e| {
                matches!(e, SessionEvent::PhaseChanged { busy: false, .. })
            })
            .await;
        }

        async fn stop(self) -> (SessionMachine, broadcast::Receiver<SessionEvent>) {
            drop(self.tx);
            (self.handle.await.unwrap(), self.events)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_enters_listening() {
        let mut harness = Harness::idle();
        harness.recognizer.wait_started().await;

        let event = next_matching(&mut harness.events, |e| {
            matches!(e, SessionEvent::PhaseChanged { .. })
        })
        .await;
        assert_eq!(
            event,
            SessionEvent::PhaseChanged {
                phase: Phase::Listening,
                busy: false
            }
        );

        let (machine, _) = harness.stop().await;
        let state = machine.state();
        assert!(state.auto_listen);
        assert!(!state.busy);
        assert_eq!(state.phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_restarts_listening() {
        let harness = Harness::idle();
        harness.recognizer.wait_started().await;

        harness.tx.send(RecognitionEvent::End).await.unwrap();
        harness.recognizer.wait_started().await;
        assert_eq!(harness.recognizer.starts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_retries_after_backoff() {
        let mut harness = Harness::idle();
        harness.recognizer.wait_started().await;

        let failed_at = Instant::now();
        harness
            .tx
            .send(RecognitionEvent::Error(RecognitionError::NoSpeech))
            .await
            .unwrap();
        // Engines usually follow an error with an end event
        harness.tx.send(RecognitionEvent::End).await.unwrap();

        let status = next_matching(&mut harness.events, |e| {
            matches!(e, SessionEvent::StatusChanged { transient: true, .. })
        })
        .await;
        assert!(matches!(status, SessionEvent::StatusChanged { .. }));

        harness.recognizer.wait_started().await;
        assert!(failed_at.elapsed() >= RETRY_BACKOFF);
        assert_eq!(harness.recognizer.starts(), 2);

        let (machine, _) = harness.stop().await;
        assert!(machine.state().auto_listen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_help_cycle() {
        let mut harness = Harness::idle();
        harness.say("HELP please").await;

        assert_eq!(harness.spoken().await, HELP_TEXT);
        harness.settle().await;

        let (machine, _) = harness.stop().await;
        assert!(!machine.state().busy);
        assert_eq!(machine.state().phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_transcript_does_nothing() {
        let harness = Harness::idle();
        harness.say("   ").await;

        let (machine, mut events) = harness.stop().await;
        assert!(!machine.state().busy);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::Spoke { .. }));
            assert!(!matches!(event, SessionEvent::PhaseChanged { busy: true, .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_camera_cycle() {
        let probe = CameraProbe::default();
        let mut harness = Harness::spawn(
            ScriptedCamera::ready(probe.clone()),
            ScriptedLoader::with_passes(vec![vec![]]),
        );
        harness.say("open the camera").await;

        assert_eq!(harness.spoken().await, CAMERA_ON);
        let (machine, _) = harness.stop().await;
        assert!(machine.camera_open());
        assert_eq!(probe.acquired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_opens_camera_narrates_and_auto_resets() {
        let probe = CameraProbe::default();
        let found = vec![Detection::new("apple", 0.97)];
        let mut harness = Harness::spawn(
            ScriptedCamera::ready(probe.clone()),
            ScriptedLoader::with_passes(vec![found.clone()]),
        );
        harness.say("what do you see").await;

        assert_eq!(harness.spoken().await, describe(&found));
        let spoke_at = Instant::now();

        next_matching(&mut harness.events, |e| {
            *e == SessionEvent::VideoVisibility { visible: false }
        })
        .await;
        assert!(spoke_at.elapsed() >= RESULT_DWELL);
        assert_eq!(probe.acquired(), 1);
        assert_eq!(probe.stopped(), 1);

        let (machine, _) = harness.stop().await;
        assert!(!machine.camera_open());
        assert_eq!(machine.state().phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_found_is_spoken() {
        let mut harness = Harness::idle();
        harness.say("what is this").await;
        assert_eq!(harness.spoken().await, NOTHING_IDENTIFIED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_command_cancels_auto_reset() {
        let probe = CameraProbe::default();
        let mut harness = Harness::spawn(
            ScriptedCamera::ready(probe.clone()),
            ScriptedLoader::with_passes(vec![vec![]]),
        );
        harness.say("detect").await;
        assert_eq!(harness.spoken().await, NOTHING_IDENTIFIED);
        harness.settle().await;

        harness.say("open camera").await;
        assert_eq!(harness.spoken().await, CAMERA_ON);
        harness.settle().await;

        tokio::time::sleep(RESULT_DWELL * 2).await;
        let (machine, _) = harness.stop().await;
        assert!(machine.camera_open());
        assert_eq!(probe.stopped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_camera_resets() {
        let probe = CameraProbe::default();
        let mut harness = Harness::spawn(
            ScriptedCamera::ready(probe.clone()),
            ScriptedLoader::with_passes(vec![vec![]]),
        );
        harness.say("open camera").await;
        assert_eq!(harness.spoken().await, CAMERA_ON);

        harness.say("close the camera").await;
        assert_eq!(harness.spoken().await, CAMERA_OFF);
        harness.settle().await;

        let (machine, _) = harness.stop().await;
        assert!(!machine.camera_open());
        assert_eq!(probe.stopped(), 1);
        assert!(machine.state().auto_listen);
        assert_eq!(machine.state().phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_failure_is_spoken_and_session_continues() {
        let mut harness = Harness::spawn(
            ScriptedCamera::failing(CameraError::PermissionDenied),
            ScriptedLoader::with_passes(vec![vec![]]),
        );
        harness.say("open camera").await;
        assert_eq!(
            harness.spoken().await,
            CameraError::PermissionDenied.user_message()
        );
        harness.settle().await;

        harness.say("help").await;
        assert_eq!(harness.spoken().await, HELP_TEXT);

        let (machine, _) = harness.stop().await;
        let state = machine.state();
        assert!(state.auto_listen);
        assert!(!state.busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_load_failure_aborts_cycle_only() {
        let loader = ScriptedLoader::failing();
        let mut harness = Harness::spawn(ScriptedCamera::ready(CameraProbe::default()), loader);
        harness.say("identify").await;
        assert_eq!(
            harness.spoken().await,
            "The detection model could not be loaded."
        );
        harness.settle().await;

        let (machine, _) = harness.stop().await;
        assert!(!machine.state().busy);
        assert_eq!(machine.state().phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_question_without_credential() {
        let mut harness = Harness::idle();
        harness.say("how far away is the moon").await;
        assert_eq!(harness.spoken().await, UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_gate_ignores_second_command() {
        let probe = CameraProbe::default();
        let gate = Arc::new(Notify::new());
        let loader = ScriptedLoader::with_passes(vec![vec![Detection::new("cup", 0.9)]]);
        let mut harness = Harness::spawn(
            ScriptedCamera::gated(probe.clone(), Arc::clone(&gate)),
            loader.clone(),
        );

        harness.say("open camera").await;
        next_matching(&mut harness.events, |e| {
            matches!(
                e,
                SessionEvent::PhaseChanged {
                    phase: Phase::OpeningCamera,
                    ..
                }
            )
        })
        .await;

        harness.say("what do you see").await;
        let ignored = next_matching(&mut harness.events, |e| {
            matches!(e, SessionEvent::CommandIgnored { .. })
        })
        .await;
        assert_eq!(
            ignored,
            SessionEvent::CommandIgnored {
                transcript: "what do you see".to_string()
            }
        );

        gate.notify_one();
        assert_eq!(harness.spoken().await, CAMERA_ON);
        harness.settle().await;

        let (machine, mut events) = harness.stop().await;
        assert_eq!(probe.acquired(), 1);
        assert_eq!(loader.detect_calls(), 0);
        assert!(!machine.state().busy);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::Spoke { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_during_cycle_waits_for_backoff() {
        let gate = Arc::new(Notify::new());
        let mut harness = Harness::spawn(
            ScriptedCamera::gated(CameraProbe::default(), Arc::clone(&gate)),
            ScriptedLoader::with_passes(vec![vec![]]),
        );
        harness.recognizer.wait_started().await;

        harness.say("open camera").await;
        next_matching(&mut harness.events, |e| {
            matches!(
                e,
                SessionEvent::PhaseChanged {
                    phase: Phase::OpeningCamera,
                    ..
                }
            )
        })
        .await;

        let failed_at = Instant::now();
        harness
            .tx
            .send(RecognitionEvent::Error(RecognitionError::AudioCapture(
                "microphone unplugged".to_string(),
            )))
            .await
            .unwrap();
        harness.tx.send(RecognitionEvent::End).await.unwrap();

        match next_matching(&mut harness.events, |e| {
            matches!(e, SessionEvent::StatusChanged { transient: true, .. })
        })
        .await
        {
            SessionEvent::StatusChanged { text, .. } => {
                assert!(text.contains("microphone unplugged"))
            }
            _ => unreachable!(),
        }

        gate.notify_one();
        assert_eq!(harness.spoken().await, CAMERA_ON);
        let settled = next_matching(&mut harness.events, |e| {
            matches!(e, SessionEvent::PhaseChanged { busy: false, .. })
        })
        .await;
        // Not listening until the backoff runs out
        assert_eq!(
            settled,
            SessionEvent::PhaseChanged {
                phase: Phase::Idle,
                busy: false
            }
        );

        harness.recognizer.wait_started().await;
        assert!(failed_at.elapsed() >= RETRY_BACKOFF);
        assert_eq!(harness.recognizer.starts(), 2);

        let (machine, _) = harness.stop().await;
        assert_eq!(machine.state().phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_start_stays_idle_until_retry() {
        let mut harness = Harness::spawn_with(
            ScriptedRecognizer::failing_first(1),
            ScriptedCamera::ready(CameraProbe::default()),
            ScriptedLoader::with_passes(vec![vec![]]),
            SessionTimings::default(),
        );
        let began = Instant::now();
        harness.recognizer.wait_started().await;

        let event = next_matching(&mut harness.events, |e| {
            matches!(e, SessionEvent::PhaseChanged { .. })
        })
        .await;
        assert_eq!(
            event,
            SessionEvent::PhaseChanged {
                phase: Phase::Listening,
                busy: false
            }
        );
        assert!(began.elapsed() >= RETRY_BACKOFF);
        assert_eq!(harness.recognizer.starts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortened_timings() {
        let timings = SessionTimings {
            retry_backoff: Duration::from_millis(100),
            result_dwell: Duration::from_secs(1),
        };
        let mut harness = Harness::spawn_with(
            ScriptedRecognizer::default(),
            ScriptedCamera::ready(CameraProbe::default()),
            ScriptedLoader::with_passes(vec![vec![]]),
            timings,
        );
        harness.recognizer.wait_started().await;

        let failed_at = Instant::now();
        harness
            .tx
            .send(RecognitionEvent::Error(RecognitionError::NoSpeech))
            .await
            .unwrap();
        harness.recognizer.wait_started().await;
        let waited = failed_at.elapsed();
        assert!(waited >= timings.retry_backoff);
        assert!(waited < RETRY_BACKOFF);

        harness.say("what do you see").await;
        assert_eq!(harness.spoken().await, NOTHING_IDENTIFIED);
        let spoke_at = Instant::now();
        next_matching(&mut harness.events, |e| {
            *e == SessionEvent::VideoVisibility { visible: false }
        })
        .await;
        let dwelt = spoke_at.elapsed();
        assert!(dwelt >= timings.result_dwell);
        assert!(dwelt < RESULT_DWELL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_closed_ends_loop() {
        let harness = Harness::idle();
        harness
            .tx
            .send(RecognitionEvent::Error(RecognitionError::InputClosed))
            .await
            .unwrap();
        // The loop returns without the sender being dropped
        let machine = harness.handle.await.unwrap();
        assert!(!machine.state().busy);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (event_tx, _events) = broadcast::channel(64);
        let recognizer = ScriptedRecognizer::default();
        let mut machine = SessionMachine::new(
            Box::new(recognizer.clone()),
            components(
                ScriptedCamera::ready(CameraProbe::default()),
                ScriptedLoader::with_passes(vec![vec![]]),
                event_tx.clone(),
            ),
            event_tx,
        );
        assert!(machine.start().is_continue());

        assert!(machine.reset().is_continue());
        let once = machine.state();
        assert!(machine.reset().is_continue());

        assert_eq!(machine.state(), once);
        assert_eq!(once.phase, Phase::Listening);
        assert!(!machine.camera_open());
        assert_eq!(recognizer.starts(), 1);
    }

    #[test]
    fn test_reset_without_auto_listen_goes_idle() {
        let (event_tx, _events) = broadcast::channel(64);
        let mut machine = SessionMachine::new(
            Box::new(ScriptedRecognizer::default()),
            components(
                ScriptedCamera::ready(CameraProbe::default()),
                ScriptedLoader::with_passes(vec![vec![]]),
                event_tx.clone(),
            ),
            event_tx,
        );
        assert!(machine.start().is_continue());
        machine.shutdown();

        assert!(machine.reset().is_continue());
        assert_eq!(machine.state().phase, Phase::Idle);
        assert!(!machine.state().auto_listen);
    }
}
