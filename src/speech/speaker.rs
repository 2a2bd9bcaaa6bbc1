//! Utterance speaker
//!
//! Speech output is best effort: a synthesizer failure is logged and the
//! command cycle carries on as if the sentence had been spoken.

use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::events::SessionEvent;

/// Errors a synthesizer backend can report
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech command is empty")]
    EmptyCommand,

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Text-to-speech backend. Must return without waiting for playback.
pub trait SpeechSynth: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Fire-and-forget wrapper around a synthesizer
pub struct UtteranceSpeaker {
    synth: Box<dyn SpeechSynth>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl UtteranceSpeaker {
    pub fn new(synth: Box<dyn SpeechSynth>, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { synth, event_tx }
    }

    /// Speak `text`, swallowing any synthesizer failure
    pub fn say(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        match self.synth.speak(text) {
            Ok(()) => debug!(%text, "utterance queued"),
            Err(e) => warn!(error = %e, "speech synthesis failed"),
        }

        let _ = self.event_tx.send(SessionEvent::Spoke {
            text: text.to_string(),
        });
    }
}

/// Speaks by launching an external program with the text as last argument
pub struct CommandSynth {
    program: String,
    args: Vec<String>,
}

impl CommandSynth {
    /// Parse a command line such as `espeak -s 150`
    pub fn parse(command_line: &str) -> Result<Self, SpeechError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SpeechError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl SpeechSynth for CommandSynth {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| SpeechError::Launch {
                program: self.program.clone(),
                source,
            })
    }
}

/// Prints utterances to stdout
pub struct PrintSynth;

impl SpeechSynth for PrintSynth {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        println!("(speaking) {text}");
        Ok(())
    }
}
