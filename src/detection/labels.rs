//! Label model: detections recorded next to replayed frames
//!
//! The manifest names the model and the labels it knows. For a frame read
//! from `shot.png`, detections come from `shot.png.json`, a JSON list of
//! `{"label": ..., "confidence": ...}` objects.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::camera::Frame;

use super::aggregator::{Detection, DetectionError, DetectionModel, ModelLoadError, ModelLoader};

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    /// Empty accepts every label
    #[serde(default)]
    labels: Vec<String>,
}

/// Loads a [`LabelModel`] from its manifest file
pub struct LabelModelLoader {
    manifest_path: PathBuf,
}

impl LabelModelLoader {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for LabelModelLoader {
    async fn load(&self) -> Result<Box<dyn DetectionModel>, ModelLoadError> {
        let raw = tokio::fs::read_to_string(&self.manifest_path)
            .await
            .map_err(|e| ModelLoadError(format!("{}: {e}", self.manifest_path.display())))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .map_err(|e| ModelLoadError(format!("{}: {e}", self.manifest_path.display())))?;

        info!(model = %manifest.name, labels = manifest.labels.len(), "detection model loaded");

        Ok(Box::new(LabelModel {
            labels: manifest.labels.into_iter().collect(),
        }))
    }
}

struct LabelModel {
    labels: HashSet<String>,
}

fn sidecar_path(frame_path: &Path) -> PathBuf {
    let mut name = OsString::from(frame_path.as_os_str());
    name.push(".json");
    PathBuf::from(name)
}

#[async_trait]
impl DetectionModel for LabelModel {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let Some(origin) = frame.origin.as_deref() else {
            return Ok(Vec::new());
        };

        let sidecar = sidecar_path(origin);
        let raw = match tokio::fs::read_to_string(&sidecar).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(frame = ?origin, "no labels recorded for frame");
                return Ok(Vec::new());
            }
            Err(e) => return Err(DetectionError::Inference(e.to_string())),
        };

        let detections: Vec<Detection> = serde_json::from_str(&raw)
            .map_err(|e| DetectionError::Inference(format!("{}: {e}", sidecar.display())))?;

        Ok(detections
            .into_iter()
            .filter(|d| (0.0..=1.0).contains(&d.confidence))
            .filter(|d| self.labels.is_empty() || self.labels.contains(&d.label))
            .collect())
    }
}
