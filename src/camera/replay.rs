//! Replay camera backed by a directory of frame files
//!
//! Each non-hidden file in the directory that is not a `.json` sidecar is
//! one frame. Frames are served round-robin in file name order.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::session::{CameraDevice, CameraError, Frame, MediaStream, StreamConstraints};

/// Interval between directory scans while waiting for the first frame
const RESCAN_INTERVAL: Duration = Duration::from_millis(250);

/// Camera device whose "lens" is a directory
pub struct DirectoryCamera {
    dir: PathBuf,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn map_io(e: std::io::Error) -> CameraError {
    match e.kind() {
        ErrorKind::NotFound => CameraError::NoDevice,
        ErrorKind::PermissionDenied => CameraError::PermissionDenied,
        _ => CameraError::Stream(e.to_string()),
    }
}

async fn scan_frames(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(map_io)?;
    let mut frames = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(map_io)? {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(true, |name| name.starts_with('.'));
        let sidecar = path.extension().is_some_and(|ext| ext == "json");
        let is_file = entry.file_type().await.map_err(map_io)?.is_file();

        if is_file && !hidden && !sidecar {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

#[async_trait]
impl CameraDevice for DirectoryCamera {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        let frames = scan_frames(&self.dir).await?;
        debug!(dir = ?self.dir, frames = frames.len(), "replay camera acquired");

        Ok(Box::new(DirectoryStream {
            dir: self.dir.clone(),
            frames,
            next: 0,
            stopped: false,
            constraints: *constraints,
        }))
    }
}

struct DirectoryStream {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    next: usize,
    stopped: bool,
    constraints: StreamConstraints,
}

#[async_trait]
impl MediaStream for DirectoryStream {
    async fn wait_ready(&mut self) -> Result<(), CameraError> {
        while self.frames.is_empty() {
            tokio::time::sleep(RESCAN_INTERVAL).await;
            self.frames = scan_frames(&self.dir).await?;
        }
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stopped {
            return Err(CameraError::Stream("stream stopped".to_string()));
        }
        if self.frames.is_empty() {
            return Err(CameraError::Stream("no frames available".to_string()));
        }

        let path = self.frames[self.next % self.frames.len()].clone();
        self.next += 1;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        Ok(Frame {
            width: self.constraints.width,
            height: self.constraints.height,
            data,
            origin: Some(path),
        })
    }

    fn stop_tracks(&mut self) {
        self.stopped = true;
    }
}
