// Plain HTTP GET for image sources and preview regeneration.

use std::time::Duration;

use async_trait::async_trait;
use clipnote_common::error::CaptureError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::{build_client, transport_error, Blob, BlobFetcher};

const FALLBACK_MIME: &str = "application/octet-stream";

pub struct HttpBlobFetcher {
    client: Client,
}

impl HttpBlobFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { client: build_client(timeout)? })
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<Blob, CaptureError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::transport(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or_default(),
            ));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(FALLBACK_MIME)
            .to_string();
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(Blob::new(bytes.to_vec(), mime_type))
    }
}
