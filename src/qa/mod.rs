//! Question-answering bridge
//!
//! Forwards free-form questions to an OpenAI-compatible chat completions
//! endpoint. Without a credential it answers with a fixed sentence and makes
//! no network call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::QaSettings;

/// Spoken when no credential is configured
pub const UNAVAILABLE: &str =
    "Question answering is not set up yet. Add an API key to turn it on.";

/// Spoken when the service answers without any content
pub const NO_ANSWER: &str = "I don't have an answer yet.";

/// Persona sent as the system message
pub const SYSTEM_PERSONA: &str = "You are a helpful assistant for a blind or low-vision user. \
     Answer in one or two short sentences that sound natural when read aloud.";

pub const TEMPERATURE: f64 = 0.7;
pub const MAX_TOKENS: u32 = 256;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Question-answering failures
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("question service returned HTTP {0}")]
    ServiceError(u16),

    #[error("question service unreachable: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl QaError {
    /// Short sentence to speak and display
    pub fn user_message(&self) -> &'static str {
        match self {
            QaError::ServiceError(_) => "The question service had a problem. Please try again.",
            QaError::NetworkError(_) => "I could not reach the question service.",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Extract `choices[0].message.content`, falling back to [`NO_ANSWER`]
fn answer_from_body(body: &str) -> String {
    let parsed: ChatCompletionResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "unreadable question service response");
            return NO_ANSWER.to_string();
        }
    };

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .unwrap_or_else(|| NO_ANSWER.to_string())
}

/// Client for the question service
pub struct QaBridge {
    client: reqwest::Client,
    settings: QaSettings,
}

impl QaBridge {
    pub fn new(settings: QaSettings) -> Self {
        Self::with_client(settings, reqwest::Client::new())
    }

    pub fn with_client(settings: QaSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Ask one question
    pub async fn ask(&self, prompt: &str) -> Result<String, QaError> {
        if !self.is_configured() {
            debug!("question answering unconfigured");
            return Ok(UNAVAILABLE.to_string());
        }

        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PERSONA,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        info!(endpoint = %self.settings.endpoint, model = %self.settings.model, "asking question service");

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(self.settings.api_key.trim())
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "question service error");
            return Err(QaError::ServiceError(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(answer_from_body(&body))
    }
}
