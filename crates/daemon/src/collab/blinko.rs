// Blinko note-store client: note upsert, file upload and AI config lookup.

use std::time::Duration;

use async_trait::async_trait;
use clipnote_common::error::CaptureError;
use clipnote_common::settings::Settings;
use clipnote_common::types::Attachment;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{build_client, transport_error, Blob, FileStore, NoteStore};

/// Blinko's note type for plain notes.
const NOTE_TYPE_NOTE: u8 = 0;
const SUPPORTED_AI_PROVIDER: &str = "OpenAI";

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    content: &'a str,
    #[serde(rename = "type")]
    note_type: u8,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(rename = "type", default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigList {
    #[serde(default)]
    ai_model_provider: Option<String>,
    #[serde(default)]
    ai_api_endpoint: Option<String>,
    #[serde(default)]
    ai_api_key: Option<String>,
    #[serde(default)]
    ai_model: Option<String>,
}

pub struct BlinkoClient {
    client: Client,
}

impl BlinkoClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: build_client(timeout)? })
    }

    /// Pull the AI endpoint configured on the note server into `settings`.
    /// Only OpenAI-compatible providers are accepted.
    pub async fn fetch_ai_config(&self, settings: &Settings) -> Result<Settings, CaptureError> {
        ensure_configured(settings)?;
        let url = format!("{}/config/list", api_base(settings));

        let response = self
            .client
            .get(&url)
            .header("Authorization", &settings.auth_key)
            .send()
            .await
            .map_err(transport_error)?;
        let response = require_success(response).await?;

        let config: ConfigList = response.json().await.map_err(|error| {
            CaptureError::ResponseFormatError(format!("config response format error: {error}"))
        })?;

        let provider = config.ai_model_provider.unwrap_or_default();
        if provider != SUPPORTED_AI_PROVIDER {
            return Err(CaptureError::ValidationError(format!(
                "Currently unsupported AI provider: {provider}"
            )));
        }

        info!("fetched AI configuration from note server");
        Ok(Settings {
            model_url: config.ai_api_endpoint.unwrap_or_default(),
            api_key: config.ai_api_key.unwrap_or_default(),
            model_name: config.ai_model.unwrap_or_default(),
            ..settings.clone()
        }
        .normalized())
    }
}

#[async_trait]
impl NoteStore for BlinkoClient {
    async fn save_note(
        &self,
        body: &str,
        attachments: &[Attachment],
        settings: &Settings,
    ) -> Result<Value, CaptureError> {
        ensure_configured(settings)?;
        let url = format!("{}/note/upsert", api_base(settings));
        debug!(body_len = body.len(), attachments = attachments.len(), "saving note");

        let response = self
            .client
            .post(&url)
            .header("Authorization", &settings.auth_key)
            .json(&UpsertRequest { content: body, note_type: NOTE_TYPE_NOTE, attachments })
            .send()
            .await
            .map_err(transport_error)?;
        let response = require_success(response).await?;

        // Blinko answers with the stored note but no status field.
        response.json::<Value>().await.map_err(|error| {
            CaptureError::ResponseFormatError(format!("note response format error: {error}"))
        })
    }
}

#[async_trait]
impl FileStore for BlinkoClient {
    async fn upload_file(
        &self,
        file_name: &str,
        blob: Blob,
        settings: &Settings,
    ) -> Result<Attachment, CaptureError> {
        ensure_configured(settings)?;
        let url = format!("{}/file/upload", file_base(settings));

        let part = Part::bytes(blob.bytes).file_name(file_name.to_string());
        let part = if blob.mime_type.is_empty() {
            part
        } else {
            part.mime_str(&blob.mime_type).map_err(transport_error)?
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", &settings.auth_key)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(transport_error)?;
        let response = require_success(response).await?;

        let upload: UploadResponse = response.json().await.map_err(|_| upload_format_error())?;
        match (upload.status, upload.file_path) {
            (Some(200), Some(path)) if !path.is_empty() => Ok(Attachment {
                name: upload.file_name.unwrap_or_else(|| file_name.to_string()),
                remote_path: path,
                size: upload.size.unwrap_or_default(),
                mime_type: upload.mime_type.unwrap_or_default(),
                original_url: None,
            }),
            _ => Err(upload_format_error()),
        }
    }
}

fn ensure_configured(settings: &Settings) -> Result<(), CaptureError> {
    if settings.note_store_configured() {
        Ok(())
    } else {
        Err(CaptureError::missing_note_store())
    }
}

/// `targetUrl` without trailing slashes, e.g. `https://host/api/v1`.
fn api_base(settings: &Settings) -> &str {
    settings.target_url.trim_end_matches('/')
}

/// Uploads live one level above the versioned API root.
pub fn file_base(settings: &Settings) -> &str {
    let base = api_base(settings);
    base.strip_suffix("/v1").unwrap_or(base)
}

async fn require_success(response: Response) -> Result<Response, CaptureError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());
    warn!(status = status.as_u16(), %message, "note server rejected request");
    Err(CaptureError::transport(Some(status.as_u16()), message))
}

fn upload_format_error() -> CaptureError {
    CaptureError::ResponseFormatError("Image upload response format error".into())
}
