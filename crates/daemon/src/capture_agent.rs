// Capture context: one agent per tab, answering content requests and
// tracking the floating-ball state pushed to it.

use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Result;
use clipnote_common::protocol::messages::{CaptureRequest, ContentResponse, Reply, ToBackground, ToTab};
use clipnote_common::types::TabInfo;
use regex::Regex;
use tracing::{debug, warn};

use crate::bus::{ContextHandle, ContextId, Envelope, Message, MessageBus};
use crate::collab::ContentExtractor;
use crate::settings_store::SettingsStore;
use crate::store::KvStore;

/// Flatten page text to a single line and drop backlinks left by earlier
/// captures.
pub fn normalize_page_text(raw: &str) -> String {
    static NEWLINES: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    static BACKLINK: OnceLock<Regex> = OnceLock::new();

    let newlines = NEWLINES.get_or_init(|| Regex::new(r"[\n\r]+").expect("newline pattern should compile"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern should compile"));
    let backlink = BACKLINK
        .get_or_init(|| Regex::new(r"Original link：\[.*?\]\(.*?\)").expect("backlink pattern should compile"));

    let text = newlines.replace_all(raw, "\n");
    let text = whitespace.replace_all(&text, " ");
    let text = backlink.replace_all(&text, "");
    text.trim().to_string()
}

/// Last state the background pushed for this tab's floating ball.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingBallState {
    pub enabled: bool,
    pub last_success: Option<bool>,
    pub last_error: Option<String>,
}

impl Default for FloatingBallState {
    fn default() -> Self {
        Self { enabled: true, last_success: None, last_error: None }
    }
}

pub struct CaptureAgent {
    handle: ContextHandle,
    tab: TabInfo,
    ball: Arc<Mutex<FloatingBallState>>,
}

impl CaptureAgent {
    /// Attach as `Tab(tab.id)` and start answering `getContent`.
    pub fn attach(
        bus: &MessageBus,
        store: KvStore,
        tab: TabInfo,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Result<Self> {
        let handle = bus.attach(ContextId::Tab(tab.id))?;
        let enabled = SettingsStore::load(&store)?.enable_floating_ball;
        let ball = Arc::new(Mutex::new(FloatingBallState { enabled, ..FloatingBallState::default() }));

        let page = tab.clone();
        let state = ball.clone();
        handle.subscribe(
            |message| matches!(message, Message::Tab(_)),
            move |envelope| {
                let page = page.clone();
                let state = state.clone();
                let store = store.clone();
                let extractor = extractor.clone();
                async move { handle_tab_message(envelope, &page, &state, &store, extractor.as_ref()).await }
            },
        )?;

        debug!(tab = tab.id, url = %tab.url, "capture agent attached");
        Ok(Self { handle, tab, ball })
    }

    pub fn tab(&self) -> &TabInfo {
        &self.tab
    }

    pub fn floating_ball(&self) -> FloatingBallState {
        self.ball.lock().map(|state| state.clone()).unwrap_or_default()
    }

    /// Floating-ball click: hand `content` to the background for a direct
    /// save. The outcome arrives later as `updateFloatingBallState`.
    pub async fn send_to_background(&self, content: String, is_extract_only: bool) -> Reply {
        let request = CaptureRequest {
            content,
            url: Some(self.tab.url.clone()),
            title: Some(self.tab.title.clone()),
            is_extract_only,
            direct_save: true,
        };
        self.handle
            .send_and_await(ContextId::Background, ToBackground::ProcessAndSendContent(request))
            .await
    }
}

async fn handle_tab_message(
    mut envelope: Envelope,
    tab: &TabInfo,
    ball: &Mutex<FloatingBallState>,
    store: &KvStore,
    extractor: &dyn ContentExtractor,
) {
    let Message::Tab(message) = &envelope.message else {
        return;
    };

    match message.clone() {
        ToTab::GetContent => {
            let response = extract(tab, store, extractor).await;
            envelope.respond(Reply::Content(response));
        }
        ToTab::UpdateFloatingBallState { enabled, success, error } => {
            if let Ok(mut state) = ball.lock() {
                if let Some(enabled) = enabled {
                    state.enabled = enabled;
                }
                if success.is_some() {
                    state.last_success = success;
                    state.last_error = error;
                }
            }
            envelope.respond(Reply::Received);
        }
    }
}

async fn extract(tab: &TabInfo, store: &KvStore, extractor: &dyn ContentExtractor) -> ContentResponse {
    let settings = match SettingsStore::load(store) {
        Ok(settings) => settings,
        Err(error) => return failed_content(format!("failed to read settings: {error}")),
    };
    match extractor.extract(tab, &settings).await {
        Ok(page) => {
            let content = normalize_page_text(&page.content);
            debug!(tab = tab.id, content_len = content.len(), "extracted page content");
            ContentResponse {
                success: true,
                content: Some(content),
                url: Some(page.url),
                title: Some(page.title),
                error: None,
            }
        }
        Err(error) => {
            warn!(tab = tab.id, error = %error, "content extraction failed");
            failed_content(error.to_string())
        }
    }
}

fn failed_content(error: String) -> ContentResponse {
    ContentResponse { success: false, content: None, url: None, title: None, error: Some(error) }
}
