// External collaborators: summarization, note storage, file upload, blob
// fetching, page extraction and user notification.
//
// Every fallible call returns `CaptureError`; callers at the coordinator
// boundary fold those into `SaveOutcome`/`Failed` drafts.

pub mod blinko;
pub mod fetch;
pub mod notify;
pub mod openai;
pub mod reader;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clipnote_common::error::CaptureError;
use clipnote_common::settings::Settings;
use clipnote_common::types::{Attachment, ExtractedContent, TabInfo};
use serde_json::Value;

pub use blinko::BlinkoClient;
pub use fetch::HttpBlobFetcher;
pub use notify::{RecordingNotifier, TracingNotifier};
pub use openai::OpenAiSummarizer;
pub use reader::ReaderExtractor;

/// Raw bytes plus their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), mime_type: mime_type.into() }
    }
}

/// Locally-owned reference to a cached blob. Only meaningful inside the
/// context whose `PreviewCache` created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle(pub String);

impl PreviewHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Run the configured prompt over `content` and return the model output.
    async fn summarize(&self, content: &str, settings: &Settings) -> Result<String, CaptureError>;
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Persist a finished note body. Returns the store's response payload.
    async fn save_note(
        &self,
        body: &str,
        attachments: &[Attachment],
        settings: &Settings,
    ) -> Result<Value, CaptureError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload a file. The returned attachment has no `original_url`.
    async fn upload_file(
        &self,
        file_name: &str,
        blob: Blob,
        settings: &Settings,
    ) -> Result<Attachment, CaptureError>;
}

#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Blob, CaptureError>;
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Raw page content for `tab`.
    async fn extract(&self, tab: &TabInfo, settings: &Settings) -> Result<ExtractedContent, CaptureError>;
}

/// Context-owned cache of preview blobs. Every handle returned by `create`
/// must eventually be passed to `release`.
pub trait PreviewCache: Send + Sync {
    fn create(&self, blob: Blob) -> PreviewHandle;
    fn release(&self, handle: &PreviewHandle);
}

/// User-facing notification surface (the system tray toast analogue).
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// The collaborators the background context needs, shared by reference.
#[derive(Clone)]
pub struct Collaborators {
    pub summarizer: Arc<dyn Summarizer>,
    pub note_store: Arc<dyn NoteStore>,
    pub file_store: Arc<dyn FileStore>,
    pub fetcher: Arc<dyn BlobFetcher>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// HTTP-backed collaborators sharing one timeout.
    pub fn http(timeout: Duration) -> anyhow::Result<Self> {
        let blinko = Arc::new(BlinkoClient::new(timeout)?);
        Ok(Self {
            summarizer: Arc::new(OpenAiSummarizer::new(timeout)?),
            note_store: blinko.clone(),
            file_store: blinko,
            fetcher: Arc::new(HttpBlobFetcher::new(timeout)?),
            notifier: Arc::new(TracingNotifier),
        })
    }
}

/// Map a reqwest send/read failure to a transport error.
pub(crate) fn transport_error(error: reqwest::Error) -> CaptureError {
    CaptureError::transport(error.status().map(|status| status.as_u16()), error.to_string())
}

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to create HTTP client")
}
