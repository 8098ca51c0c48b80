// OpenAI-compatible chat-completions summarizer.

use std::time::Duration;

use async_trait::async_trait;
use clipnote_common::error::CaptureError;
use clipnote_common::settings::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{build_client, transport_error, Summarizer};

const CHAT_COMPLETIONS: &str = "/chat/completions";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Resolve the chat-completions URL from whatever the user configured:
/// a full endpoint, a base containing `/v1`, or a bare host.
pub fn full_api_url(base_url: &str, endpoint: &str) -> Result<String, CaptureError> {
    url::Url::parse(base_url).map_err(|error| {
        CaptureError::ValidationError(format!("Invalid URL format: {error}"))
    })?;

    if base_url.contains("/v1/chat/completions") {
        return Ok(base_url.to_string());
    }
    if let Some((prefix, _)) = base_url.split_once("/v1") {
        return Ok(format!("{prefix}/v1{endpoint}"));
    }
    Ok(format!("{}/v1{endpoint}", base_url.trim_end_matches('/')))
}

pub struct OpenAiSummarizer {
    client: Client,
}

impl OpenAiSummarizer {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: build_client(timeout)? })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, content: &str, settings: &Settings) -> Result<String, CaptureError> {
        if !settings.model_configured() {
            return Err(CaptureError::missing_model());
        }

        let url = full_api_url(&settings.model_url, CHAT_COMPLETIONS)?;
        let prompt = settings.render_prompt(content);
        debug!(model = %settings.model_name, prompt_len = prompt.len(), "requesting summary");

        let request = ChatCompletionRequest {
            model: &settings.model_name,
            messages: vec![ChatMessage { role: "user", content: &prompt }],
            temperature: settings.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorResponse = response.json().await.unwrap_or_default();
            let message = body
                .error
                .and_then(|error| error.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
            warn!(status = status.as_u16(), %message, "summary request rejected");
            return Err(CaptureError::transport(Some(status.as_u16()), message));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            CaptureError::ResponseFormatError(format!("API response error: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CaptureError::ResponseFormatError("API response error".into()))
    }
}
