//! Fakes shared by unit tests

use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::camera::{CameraDevice, CameraError, CameraSession, Frame, MediaStream, StreamConstraints};
use crate::config::QaSettings;
use crate::detection::{
    Detection, DetectionAggregator, DetectionError, DetectionModel, FrameSource, ModelLoadError,
    ModelLoader,
};
use crate::events::SessionEvent;
use crate::qa::QaBridge;
use crate::session::Components;
use crate::speech::{RecognitionError, SpeechError, SpeechRecognizer, SpeechSynth, UtteranceSpeaker};

fn blank_frame() -> Frame {
    Frame {
        width: 1280,
        height: 720,
        data: Vec::new(),
        origin: None,
    }
}

/// `n` confident detections
pub fn pass_with(n: usize) -> Vec<Detection> {
    (0..n)
        .map(|i| Detection::new(format!("object {i}"), 0.9))
        .collect()
}

/// Wait for the next event matching `pred`, skipping the rest
pub async fn next_matching(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    let wait = async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(600), wait)
        .await
        .expect("timed out waiting for session event")
}

/// Components wired to fakes, with question answering unconfigured
pub fn components(
    camera: ScriptedCamera,
    loader: ScriptedLoader,
    event_tx: broadcast::Sender<SessionEvent>,
) -> Components {
    Components {
        camera: CameraSession::new(Box::new(camera), event_tx.clone()),
        detector: DetectionAggregator::new(Box::new(loader)),
        speaker: UtteranceSpeaker::new(Box::new(SilentSynth), event_tx),
        qa: QaBridge::new(QaSettings::default()),
    }
}

pub struct SilentSynth;

impl SpeechSynth for SilentSynth {
    fn speak(&self, _text: &str) -> Result<(), SpeechError> {
        Ok(())
    }
}

/// Recognizer that only counts and reports starts
#[derive(Clone)]
pub struct ScriptedRecognizer {
    starts: Arc<AtomicUsize>,
    /// Starts left to refuse with an audio capture error
    failures: Arc<AtomicUsize>,
    started_tx: mpsc::UnboundedSender<()>,
    started_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>>,
}

impl Default for ScriptedRecognizer {
    fn default() -> Self {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        Self {
            starts: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
            started_tx,
            started_rx: Arc::new(tokio::sync::Mutex::new(started_rx)),
        }
    }
}

impl ScriptedRecognizer {
    /// Refuse the first `n` starts
    pub fn failing_first(n: usize) -> Self {
        let recognizer = Self::default();
        recognizer.failures.store(n, Ordering::SeqCst);
        recognizer
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Wait for the next `start()` call
    pub async fn wait_started(&self) {
        let mut rx = self.started_rx.lock().await;
        tokio::time::timeout(std::time::Duration::from_secs(600), rx.recv())
            .await
            .expect("recognizer never started");
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&mut self) -> Result<(), RecognitionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let _ = self.started_tx.send(());
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(RecognitionError::AudioCapture("scripted failure".to_string()));
        }
        Ok(())
    }
}

/// Counters shared between a scripted camera and the test
#[derive(Clone, Default)]
pub struct CameraProbe {
    acquired: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
}

impl CameraProbe {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

enum CameraScript {
    Ready,
    NeverReady,
    Fail(CameraError),
    Gated(Arc<Notify>),
}

pub struct ScriptedCamera {
    probe: CameraProbe,
    script: CameraScript,
}

impl ScriptedCamera {
    pub fn ready(probe: CameraProbe) -> Self {
        Self {
            probe,
            script: CameraScript::Ready,
        }
    }

    pub fn never_ready(probe: CameraProbe) -> Self {
        Self {
            probe,
            script: CameraScript::NeverReady,
        }
    }

    pub fn failing(error: CameraError) -> Self {
        Self {
            probe: CameraProbe::default(),
            script: CameraScript::Fail(error),
        }
    }

    /// Acquisition blocks until `gate` is notified
    pub fn gated(probe: CameraProbe, gate: Arc<Notify>) -> Self {
        Self {
            probe,
            script: CameraScript::Gated(gate),
        }
    }
}

#[async_trait]
impl CameraDevice for ScriptedCamera {
    async fn acquire(
        &self,
        _constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        match &self.script {
            CameraScript::Fail(error) => return Err(error.clone()),
            CameraScript::Gated(gate) => gate.notified().await,
            CameraScript::Ready | CameraScript::NeverReady => {}
        }

        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            probe: self.probe.clone(),
            ready: !matches!(self.script, CameraScript::NeverReady),
        }))
    }
}

struct ScriptedStream {
    probe: CameraProbe,
    ready: bool,
}

#[async_trait]
impl MediaStream for ScriptedStream {
    async fn wait_ready(&mut self) -> Result<(), CameraError> {
        if !self.ready {
            pending::<()>().await;
        }
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        Ok(blank_frame())
    }

    fn stop_tracks(&mut self) {
        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Frame source that never runs dry
pub struct StaticFrames;

#[async_trait]
impl FrameSource for StaticFrames {
    async fn next_frame(&mut self) -> Result<Frame, DetectionError> {
        Ok(blank_frame())
    }
}

/// Loader whose model replays canned passes in order, cycling
#[derive(Clone)]
pub struct ScriptedLoader {
    passes: Arc<Vec<Vec<Detection>>>,
    fail: bool,
    loads: Arc<AtomicUsize>,
    detect_calls: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn with_passes(passes: Vec<Vec<Detection>>) -> Self {
        Self {
            passes: Arc::new(passes),
            fail: false,
            loads: Arc::new(AtomicUsize::new(0)),
            detect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_passes(Vec::new())
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for ScriptedLoader {
    async fn load(&self) -> Result<Box<dyn DetectionModel>, ModelLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ModelLoadError("scripted failure".to_string()));
        }
        Ok(Box::new(ScriptedModel {
            passes: Arc::clone(&self.passes),
            calls: Arc::clone(&self.detect_calls),
        }))
    }
}

struct ScriptedModel {
    passes: Arc<Vec<Vec<Detection>>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DetectionModel for ScriptedModel {
    async fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.passes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.passes[call % self.passes.len()].clone())
    }
}
