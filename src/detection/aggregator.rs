//! Detection aggregator
//!
//! Runs a fixed number of warm-up passes over the frame source and keeps the
//! pass with the most confident detections. Ties keep the earliest pass.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::camera::{CameraError, Frame};

/// Number of inference passes per detect cycle
pub const WARM_UP_PASSES: usize = 3;

/// Pause between consecutive passes
pub const PASS_INTERVAL: Duration = Duration::from_millis(200);

/// Detections at or below this confidence are discarded
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// One labeled object found in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// In `[0, 1]`
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load detection model: {0}")]
pub struct ModelLoadError(pub String);

/// Failures that abort a detect cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("frame capture failed: {0}")]
    Frame(#[source] CameraError),
}

impl DetectionError {
    /// Short sentence to speak and display
    pub fn user_message(&self) -> &'static str {
        match self {
            DetectionError::ModelLoad(_) => "The detection model could not be loaded.",
            DetectionError::Inference(_) => "Something went wrong while looking.",
            DetectionError::Frame(e) => e.user_message(),
        }
    }
}

/// A loaded inference model
#[async_trait]
pub trait DetectionModel: Send {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}

/// Loads the inference model on first use
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn DetectionModel>, ModelLoadError>;
}

/// Anything that can hand out live frames
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Frame, DetectionError>;
}

/// Multi-pass detection over a live frame source
pub struct DetectionAggregator {
    loader: Box<dyn ModelLoader>,
    model: Option<Box<dyn DetectionModel>>,
    passes: usize,
    pass_interval: Duration,
}

impl DetectionAggregator {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: None,
            passes: WARM_UP_PASSES,
            pass_interval: PASS_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Run the warm-up passes and return the best confident set
    ///
    /// An empty result means nothing was confidently identified.
    pub async fn analyze(
        &mut self,
        frames: &mut dyn FrameSource,
    ) -> Result<Vec<Detection>, DetectionError> {
        let mut model = match self.model.take() {
            Some(model) => model,
            None => {
                info!("loading detection model");
                self.loader.load().await?
            }
        };

        let result = sample(model.as_mut(), frames, self.passes, self.pass_interval).await;
        self.model = Some(model);
        result
    }
}

async fn sample(
    model: &mut dyn DetectionModel,
    frames: &mut dyn FrameSource,
    passes: usize,
    pass_interval: Duration,
) -> Result<Vec<Detection>, DetectionError> {
    let mut best: Vec<Detection> = Vec::new();

    for pass in 0..passes {
        if pass > 0 {
            tokio::time::sleep(pass_interval).await;
        }

        let frame = frames.next_frame().await?;
        let confident: Vec<Detection> = model
            .detect(&frame)
            .await?
            .into_iter()
            .filter(|d| d.confidence > CONFIDENCE_THRESHOLD)
            .collect();

        debug!(pass, count = confident.len(), "warm-up pass");
        if confident.len() > best.len() {
            best = confident;
        }
    }

    Ok(best)
}
