//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default chat completions endpoint for question answering
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model identifier for question answering
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Settings for the question-answering bridge
    pub qa: QaSettings,

    /// Directory of frame files served by the replay camera
    pub frames_dir: PathBuf,

    /// Manifest of the label model
    pub model_path: PathBuf,

    /// Program used to speak utterances; `None` prints them instead
    pub speech_command: Option<String>,
}

/// Question-answering settings record
#[derive(Clone, PartialEq, Eq)]
pub struct QaSettings {
    /// Bearer credential; empty disables question answering
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl QaSettings {
    /// Whether a credential has been configured
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

// The key never reaches the logs.
impl std::fmt::Debug for QaSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaSettings")
            .field("api_key", &if self.is_configured() { "<set>" } else { "<empty>" })
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

/// On-disk settings file, every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    frames_dir: Option<PathBuf>,
    model_path: Option<PathBuf>,
    speech_command: Option<String>,
}

impl Config {
    /// Load configuration from defaults, the settings file and environment
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("sight-assist");

        let settings_path = std::env::var_os("SIGHT_ASSIST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("settings.json"));

        let mut config = Self::with_data_dir(data_dir);
        if settings_path.exists() {
            config.apply_file(&settings_path)?;
        }
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Defaults rooted at the given data directory
    fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            socket_path: data_dir.join("assist.sock"),
            frames_dir: data_dir.join("frames"),
            model_path: data_dir.join("model.json"),
            data_dir,
            qa: QaSettings::default(),
            speech_command: None,
        }
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let file: SettingsFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;

        if let Some(api_key) = file.api_key {
            self.qa.api_key = api_key;
        }
        if let Some(endpoint) = file.endpoint {
            self.qa.endpoint = endpoint;
        }
        if let Some(model) = file.model {
            self.qa.model = model;
        }
        if let Some(dir) = file.frames_dir {
            self.frames_dir = dir;
        }
        if let Some(path) = file.model_path {
            self.model_path = path;
        }
        if file.speech_command.is_some() {
            self.speech_command = file.speech_command;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = var("SIGHT_ASSIST_API_KEY") {
            self.qa.api_key = api_key;
        }
        if let Some(endpoint) = var("SIGHT_ASSIST_ENDPOINT") {
            self.qa.endpoint = endpoint;
        }
        if let Some(model) = var("SIGHT_ASSIST_MODEL") {
            self.qa.model = model;
        }
        if let Some(dir) = var("SIGHT_ASSIST_FRAMES_DIR") {
            self.frames_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("SIGHT_ASSIST_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(command) = var("SIGHT_ASSIST_SPEECH_COMMAND") {
            let command = command.trim().to_string();
            self.speech_command = (!command.is_empty()).then_some(command);
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}
