//! Camera session manager

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::detection::{DetectionError, FrameSource};
use crate::events::SessionEvent;

/// How long a freshly acquired stream may take to become playable
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Which way the requested camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointing at the scene
    Environment,
}

/// What to ask the platform for when acquiring a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            width: 1280,
            height: 720,
        }
    }
}

/// A single captured video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// File the frame was read from, when there is one
    pub origin: Option<PathBuf>,
}

/// Camera failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    NoDevice,

    #[error("camera stream did not become ready in time")]
    Timeout,

    #[error("camera is not open")]
    NotOpen,

    #[error("camera stream error: {0}")]
    Stream(String),
}

impl CameraError {
    /// Short sentence to speak and display
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => "Camera permission was denied.",
            CameraError::NoDevice => "I could not find a camera.",
            CameraError::Timeout => "The camera took too long to start.",
            CameraError::NotOpen => "The camera is not open.",
            CameraError::Stream(_) => "The camera stopped working.",
        }
    }
}

/// A live video stream handed out by a camera device
#[async_trait]
pub trait MediaStream: Send {
    /// Resolve once the stream reports itself playable
    async fn wait_ready(&mut self) -> Result<(), CameraError>;

    /// Grab the current frame
    async fn capture_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop every track of the stream
    fn stop_tracks(&mut self);
}

/// Platform camera access
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// Owns the camera stream between `open` and `close`
pub struct CameraSession {
    device: Box<dyn CameraDevice>,
    stream: Option<Box<dyn MediaStream>>,
    constraints: StreamConstraints,
    ready_timeout: Duration,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CameraSession {
    pub fn new(device: Box<dyn CameraDevice>, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            device,
            stream: None,
            constraints: StreamConstraints::default(),
            ready_timeout: READY_TIMEOUT,
            event_tx,
        }
    }

    /// Override the readiness timeout
    #[cfg(test)]
    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Acquire the stream and show the video surface
    ///
    /// Opening an already open session keeps the existing stream.
    pub async fn open(&mut self) -> Result<(), CameraError> {
        if self.stream.is_some() {
            debug!("camera already open");
            return Ok(());
        }

        let mut stream = self.device.acquire(&self.constraints).await?;

        match tokio::time::timeout(self.ready_timeout, stream.wait_ready()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stream.stop_tracks();
                return Err(e);
            }
            Err(_) => {
                warn!(timeout_ms = self.ready_timeout.as_millis() as u64, "camera never became ready");
                stream.stop_tracks();
                return Err(CameraError::Timeout);
            }
        }

        self.stream = Some(stream);
        info!(
            width = self.constraints.width,
            height = self.constraints.height,
            "camera opened"
        );
        let _ = self.event_tx.send(SessionEvent::VideoVisibility { visible: true });

        Ok(())
    }

    /// Stop all tracks and hide the video surface. No-op when closed.
    pub fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        stream.stop_tracks();
        info!("camera closed");
        let _ = self.event_tx.send(SessionEvent::VideoVisibility { visible: false });
    }
}

#[async_trait]
impl FrameSource for CameraSession {
    async fn next_frame(&mut self) -> Result<Frame, DetectionError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(DetectionError::Frame(CameraError::NotOpen))?;
        stream.capture_frame().await.map_err(DetectionError::Frame)
    }
}
