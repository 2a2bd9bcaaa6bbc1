//! Speech module: continuous recognition in, synthesized utterances out
//!
//! The recognizer side is single-shot: each `start()` arms one session that
//! yields at most one result followed by an end event, so the state machine
//! has to restart it explicitly.

mod recognizer;
mod speaker;

pub use recognizer::{
    LineRecognizer, RecognitionError, RecognitionEvent, SpeechRecognizer, Transcript,
};
pub use speaker::{CommandSynth, PrintSynth, SpeechError, SpeechSynth, UtteranceSpeaker};
