//! Speech recognizer seam and a line-based recognizer
//!
//! `LineRecognizer` treats each line on its input as one recognized
//! utterance. Lines are read on a dedicated thread and handed out one per
//! armed session.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// One recognized utterance, lowercased at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript(String);

impl Transcript {
    pub fn new(raw: &str) -> Self {
        Self(raw.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events delivered by a recognizer to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// A final transcript for the current session
    Result(Transcript),
    /// The current session ended and must be restarted to keep listening
    End,
    /// The current session failed
    Error(RecognitionError),
}

/// Errors reported by a recognizer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("no speech was detected")]
    NoSpeech,

    #[error("audio capture failed: {0}")]
    AudioCapture(String),

    #[error("recognizer is already listening")]
    AlreadyListening,

    /// The audio source is gone for good
    #[error("speech input closed")]
    InputClosed,
}

/// A speech-to-text engine that must be re-armed after every session
pub trait SpeechRecognizer: Send {
    /// Arm one recognition session
    fn start(&mut self) -> Result<(), RecognitionError>;
}

/// Recognizer fed by lines of text, one utterance per line
pub struct LineRecognizer {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
    event_tx: mpsc::Sender<RecognitionEvent>,
    armed: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl LineRecognizer {
    /// Create a recognizer over an existing line channel
    pub fn new(lines: mpsc::Receiver<String>, event_tx: mpsc::Sender<RecognitionEvent>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(lines)),
            event_tx,
            armed: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a recognizer reading from stdin
    ///
    /// Spawns a reader thread that forwards lines until stdin closes.
    pub fn stdin(event_tx: mpsc::Sender<RecognitionEvent>) -> Result<Self, RecognitionError> {
        let (line_tx, line_rx) = mpsc::channel(16);

        thread::Builder::new()
            .name("speech-input".to_string())
            .spawn(move || {
                info!("speech input thread started");
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if line_tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(?e, "failed to read speech input");
                            break;
                        }
                    }
                }
                info!("speech input thread stopped");
            })
            .map_err(|e| RecognitionError::AudioCapture(e.to_string()))?;

        Ok(Self::new(line_rx, event_tx))
    }

    /// Whether a session is currently armed
    #[cfg(test)]
    pub fn is_listening(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for LineRecognizer {
    fn start(&mut self) -> Result<(), RecognitionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RecognitionError::InputClosed);
        }
        if self.armed.swap(true, Ordering::SeqCst) {
            return Err(RecognitionError::AlreadyListening);
        }

        let lines = Arc::clone(&self.lines);
        let event_tx = self.event_tx.clone();
        let armed = Arc::clone(&self.armed);
        let closed = Arc::clone(&self.closed);

        tokio::spawn(async move {
            let line = lines.lock().await.recv().await;
            let event = match line {
                Some(line) if line.trim().is_empty() => {
                    debug!("blank utterance");
                    RecognitionEvent::Error(RecognitionError::NoSpeech)
                }
                Some(line) => {
                    debug!(%line, "utterance recognized");
                    RecognitionEvent::Result(Transcript::new(&line))
                }
                None => {
                    closed.store(true, Ordering::SeqCst);
                    RecognitionEvent::Error(RecognitionError::InputClosed)
                }
            };

            armed.store(false, Ordering::SeqCst);
            if event_tx.send(event).await.is_err() || closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = event_tx.send(RecognitionEvent::End).await;
        });

        Ok(())
    }
}
