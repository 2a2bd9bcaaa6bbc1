//! Command interpreter
//!
//! Classifies a transcript into an [`Intent`] by substring matching against
//! fixed trigger phrase sets. Categories are checked in priority order:
//! help, open camera, close camera, detect, then the question fallback.

/// Phrases asking what the assistant can do
pub const HELP_TRIGGERS: &[&str] = &["help", "what can you do", "list commands"];

/// Phrases that turn the camera on
pub const OPEN_CAMERA_TRIGGERS: &[&str] = &[
    "open camera",
    "open the camera",
    "start camera",
    "start the camera",
    "turn on camera",
    "turn on the camera",
    "camera on",
];

/// Phrases that turn the camera off
pub const CLOSE_CAMERA_TRIGGERS: &[&str] = &[
    "close camera",
    "close the camera",
    "stop camera",
    "stop the camera",
    "turn off camera",
    "turn off the camera",
    "camera off",
];

/// Phrases that request object detection
pub const DETECT_TRIGGERS: &[&str] = &[
    "what do you see",
    "what is in front of me",
    "what's in front of me",
    "what is this",
    "detect",
    "identify",
    "scan",
];

/// The classified purpose of a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Help,
    OpenCamera,
    CloseCamera,
    Detect,
    /// Anything else with content is forwarded to question answering
    FreeFormQuestion(String),
    NoMatch,
}

impl Intent {
    /// Whether handling this intent runs a command cycle
    pub fn starts_cycle(&self) -> bool {
        !matches!(self, Intent::NoMatch)
    }
}

/// Classify a transcript
pub fn classify(transcript: &str) -> Intent {
    let lowered = transcript.to_lowercase();
    if lowered.trim().is_empty() {
        return Intent::NoMatch;
    }

    let matches = |triggers: &[&str]| triggers.iter().any(|phrase| lowered.contains(phrase));

    if matches(HELP_TRIGGERS) {
        Intent::Help
    } else if matches(OPEN_CAMERA_TRIGGERS) {
        Intent::OpenCamera
    } else if matches(CLOSE_CAMERA_TRIGGERS) {
        Intent::CloseCamera
    } else if matches(DETECT_TRIGGERS) {
        Intent::Detect
    } else {
        Intent::FreeFormQuestion(lowered)
    }
}
