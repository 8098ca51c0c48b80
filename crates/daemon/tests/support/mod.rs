// Test doubles and fixtures shared by the daemon integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::messages::CaptureRequest;
use clipnote_common::settings::Settings;
use clipnote_common::types::{Attachment, ExtractedContent, TabInfo};
use clipnote_daemon::collab::{
    Blob, BlobFetcher, Collaborators, ContentExtractor, FileStore, NoteStore, RecordingNotifier, Summarizer,
};
use clipnote_daemon::config::ClipnoteConfig;
use clipnote_daemon::runtime::Runtime;
use clipnote_daemon::settings_store::SettingsStore;
use clipnote_daemon::store::KvStore;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};

pub const WAIT: Duration = Duration::from_secs(5);

/// Summarizer whose replies are scripted per input and whose completion
/// can be held back until the test opens a gate.
pub struct GatedSummarizer {
    replies: Mutex<HashMap<String, Result<String, CaptureError>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    started: watch::Sender<usize>,
}

impl GatedSummarizer {
    pub fn new() -> Self {
        let (started, _) = watch::channel(0);
        Self { replies: Mutex::new(HashMap::new()), gates: Mutex::new(HashMap::new()), started }
    }

    pub fn reply(&self, content: &str, summary: &str) {
        self.replies.lock().unwrap().insert(content.to_string(), Ok(summary.to_string()));
    }

    pub fn fail(&self, content: &str, error: CaptureError) {
        self.replies.lock().unwrap().insert(content.to_string(), Err(error));
    }

    /// Hold the summary of `content` until the returned sender fires.
    pub fn gate(&self, content: &str) -> oneshot::Sender<()> {
        let (open, gate) = oneshot::channel();
        self.gates.lock().unwrap().insert(content.to_string(), gate);
        open
    }

    /// Wait until `count` summaries have started.
    pub async fn wait_started(&self, count: usize) {
        let mut started = self.started.subscribe();
        tokio::time::timeout(WAIT, started.wait_for(|started| *started >= count))
            .await
            .expect("summaries should start in time")
            .expect("summarizer should stay alive");
    }
}

#[async_trait]
impl Summarizer for GatedSummarizer {
    async fn summarize(&self, content: &str, _settings: &Settings) -> Result<String, CaptureError> {
        let gate = self.gates.lock().unwrap().remove(content);
        self.started.send_modify(|started| *started += 1);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.replies
            .lock()
            .unwrap()
            .get(content)
            .cloned()
            .unwrap_or_else(|| Ok(format!("summary of {content}")))
    }
}

#[derive(Default)]
pub struct RecordingNoteStore {
    saved: Mutex<Vec<(String, Vec<Attachment>)>>,
    failing: AtomicBool,
}

impl RecordingNoteStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn bodies(&self) -> Vec<String> {
        self.saved.lock().unwrap().iter().map(|(body, _)| body.clone()).collect()
    }

    pub fn saved(&self) -> Vec<(String, Vec<Attachment>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoteStore for RecordingNoteStore {
    async fn save_note(&self, body: &str, attachments: &[Attachment], _: &Settings) -> Result<Value, CaptureError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::transport(Some(500), "Internal Server Error"));
        }
        let mut saved = self.saved.lock().unwrap();
        saved.push((body.to_string(), attachments.to_vec()));
        Ok(json!({ "id": saved.len() }))
    }
}

/// File store and blob fetcher in one; counts every network-shaped call.
#[derive(Default)]
pub struct FakeFiles {
    uploads: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeFiles {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileStore for FakeFiles {
    async fn upload_file(&self, file_name: &str, blob: Blob, _: &Settings) -> Result<Attachment, CaptureError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Attachment {
            name: file_name.to_string(),
            remote_path: format!("/api/file/{n}.png"),
            size: blob.bytes.len() as u64,
            mime_type: blob.mime_type,
            original_url: None,
        })
    }
}

#[async_trait]
impl BlobFetcher for FakeFiles {
    async fn fetch(&self, url: &str) -> Result<Blob, CaptureError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(CaptureError::transport(Some(404), "Not Found"));
        }
        Ok(Blob::new(url.as_bytes().to_vec(), "image/png"))
    }
}

/// Extractor returning a fixed page body for any tab.
pub struct FixedPage(pub &'static str);

#[async_trait]
impl ContentExtractor for FixedPage {
    async fn extract(&self, tab: &TabInfo, _: &Settings) -> Result<ExtractedContent, CaptureError> {
        Ok(ExtractedContent { content: self.0.to_string(), url: tab.url.clone(), title: tab.title.clone() })
    }
}

pub fn configured_settings() -> Settings {
    Settings {
        target_url: "https://notes.example/api/v1".into(),
        auth_key: "secret".into(),
        model_url: "https://model.example/v1".into(),
        api_key: "sk-test".into(),
        ..Settings::default()
    }
}

pub fn capture(content: &str, is_extract_only: bool) -> CaptureRequest {
    CaptureRequest {
        content: content.into(),
        url: Some("https://x.com".into()),
        title: Some("X".into()),
        is_extract_only,
        direct_save: false,
    }
}

pub fn page_tab(id: u32) -> TabInfo {
    TabInfo { id, url: "https://page.example".into(), title: "Page".into() }
}

pub struct Harness {
    pub runtime: Runtime,
    pub summarizer: Arc<GatedSummarizer>,
    pub notes: Arc<RecordingNoteStore>,
    pub files: Arc<FakeFiles>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn store(&self) -> &KvStore {
        self.runtime.store()
    }
}

pub fn harness() -> Harness {
    harness_with_store(KvStore::open_in_memory().expect("in-memory store should open"))
}

/// Build a runtime over `store` after writing configured settings to it.
pub fn harness_with_store(store: KvStore) -> Harness {
    SettingsStore::save(&store, &configured_settings()).expect("settings should save");
    let summarizer = Arc::new(GatedSummarizer::new());
    let notes = Arc::new(RecordingNoteStore::default());
    let files = Arc::new(FakeFiles::default());
    let notifier = Arc::new(RecordingNotifier::new());
    let collab = Collaborators {
        summarizer: summarizer.clone(),
        note_store: notes.clone(),
        file_store: files.clone(),
        fetcher: files.clone(),
        notifier: notifier.clone(),
    };
    let runtime = Runtime::assemble(ClipnoteConfig::default(), store, collab).expect("runtime should assemble");
    Harness { runtime, summarizer, notes, files, notifier }
}

/// Poll `check` until it holds or the shared timeout runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
