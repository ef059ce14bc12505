//! Request construction and transport to the inference proxy.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcript::{Message, Transcript};

/// Default proxy endpoint, overridable via config or `--endpoint`.
pub const DEFAULT_ENDPOINT: &str = "https://chatgpt.uraverageopdoge.workers.dev/chat";

/// Models the proxy accepts; anything else falls back to the default.
pub const ALLOWED_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
];

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Explain simply.";

pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

/// Current parameter selections for a request.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub provider: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub system: String,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            provider: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// JSON body POSTed to the proxy. Built fresh per request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub system: String,
    pub messages: Vec<Message>,
}

impl ChatPayload {
    /// Assemble the payload for one user submission, or `None` when the
    /// trimmed text is empty (a silent no-op, not an error).
    ///
    /// The transcript is copied, not mutated: the exchange only enters the
    /// history once the assistant reply is finalized.
    pub fn build(text: &str, params: &ChatParams, transcript: &Transcript) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let model = if ALLOWED_MODELS.contains(&params.model.as_str()) {
            params.model.clone()
        } else {
            DEFAULT_MODEL.to_string()
        };
        let system = if params.system.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            params.system.clone()
        };

        let mut messages = transcript.messages().to_vec();
        messages.push(Message::user(text));

        Some(Self {
            provider: params.provider.clone(),
            model,
            temperature: params.temperature.clamp(
                *TEMPERATURE_RANGE.start(),
                *TEMPERATURE_RANGE.end(),
            ),
            system,
            messages,
        })
    }
}

/// One response from the proxy, decided once at the transport boundary.
pub enum ChatOutcome {
    /// Single-shot reply: the full assistant text.
    Complete(String),
    /// Streamed reply: the response body yields SSE-framed chunks.
    Stream(Response),
}

/// Transport failures for a single request. Display strings are exactly
/// what the assistant slot shows.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx status; carries the response body text verbatim.
    #[error("Error: {0}")]
    Http(String),
    /// Connection or body-decoding failure.
    #[error("Request error.")]
    Network(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct CompleteResponse {
    text: String,
}

/// HTTP client for the inference proxy.
#[derive(Clone)]
pub struct WorkerClient {
    client: Client,
    endpoint: String,
}

impl WorkerClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue the request and classify the response.
    ///
    /// An SSE content type means a streamed reply; anything else is parsed
    /// as a single `{ "text": ... }` object.
    pub async fn send(&self, payload: &ChatPayload) -> Result<ChatOutcome, ClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http(body));
        }

        let streaming = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        if streaming {
            Ok(ChatOutcome::Stream(response))
        } else {
            let complete: CompleteResponse = response.json().await?;
            Ok(ChatOutcome::Complete(complete.text))
        }
    }
}
