// Page extraction through a reader service (`https://r.jina.ai/<url>`).

use std::time::Duration;

use async_trait::async_trait;
use clipnote_common::error::CaptureError;
use clipnote_common::settings::Settings;
use clipnote_common::types::{ExtractedContent, TabInfo};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{build_client, transport_error, ContentExtractor};

pub const DEFAULT_READER_BASE: &str = "https://r.jina.ai";

#[derive(Debug, Deserialize)]
struct ReaderResponse {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    data: Option<ReaderPage>,
}

#[derive(Debug, Deserialize)]
struct ReaderPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

pub struct ReaderExtractor {
    client: Client,
    base_url: String,
}

impl ReaderExtractor {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(timeout, DEFAULT_READER_BASE)
    }

    pub fn with_base_url(timeout: Duration, base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self { client: build_client(timeout)?, base_url: base_url.into() })
    }
}

#[async_trait]
impl ContentExtractor for ReaderExtractor {
    async fn extract(&self, tab: &TabInfo, settings: &Settings) -> Result<ExtractedContent, CaptureError> {
        if tab.url.trim().is_empty() {
            return Err(CaptureError::ValidationError("Unable to get current tab".into()));
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), tab.url);
        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if !settings.save_web_images {
            request = request.header("X-Retain-Images", "none");
        }
        if settings.use_jina_api_key && !settings.jina_api_key.is_empty() {
            request = request.bearer_auth(&settings.jina_api_key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::transport(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or_default(),
            ));
        }

        let body: ReaderResponse = response
            .json()
            .await
            .map_err(|_| CaptureError::ResponseFormatError("API response format error".into()))?;
        let page = match (body.code, body.data) {
            (Some(200), Some(page)) => page,
            _ => return Err(CaptureError::ResponseFormatError("API response format error".into())),
        };

        debug!(url = %page.url, content_len = page.content.len(), "reader returned page");
        Ok(ExtractedContent {
            content: format!("# {}\n\n{}", page.title, page.content),
            url: if page.url.is_empty() { tab.url.clone() } else { page.url },
            title: page.title,
        })
    }
}
