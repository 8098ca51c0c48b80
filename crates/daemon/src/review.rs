// Review context: rebuilds the capture it shows from the store every time
// it attaches or hears a push, and issues the terminal save/cancel.
//
// Pushes are hints. The store is read on attach (a push sent while no
// review context existed is simply lost) and again on every push, so the
// view always describes the stored draft and never the message.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::keys::{self, StorageArea};
use clipnote_common::protocol::messages::{CaptureRequest, Reply, SaveRequest, ToBackground, ToPopup};
use clipnote_common::types::{DraftStatus, SaveOutcome, TabInfo, WorkflowDraft};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::attachments::AttachmentLedger;
use crate::bus::{ContextHandle, ContextId, Envelope, Message, MessageBus};
use crate::collab::{Collaborators, PreviewCache};
use crate::quick_note::QuickNoteBuffer;
use crate::store::{DraftStore, KvStore};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const NO_RESPONSE: &str = "no response from background";

/// What the review surface shows for the stored draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewView {
    Empty,
    Loading(WorkflowDraft),
    Ready(WorkflowDraft),
    Failed(WorkflowDraft),
    /// `Pending` for longer than the configured limit; its producer is
    /// presumed gone.
    Stale(WorkflowDraft),
}

impl ReviewView {
    pub fn of(draft: WorkflowDraft, now: chrono::DateTime<Utc>, stale_after: Duration) -> Self {
        let max_age_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
        match draft.status {
            DraftStatus::None => Self::Empty,
            DraftStatus::Pending if draft.is_stale(now, max_age_ms) => Self::Stale(draft),
            DraftStatus::Pending => Self::Loading(draft),
            DraftStatus::Ready => Self::Ready(draft),
            DraftStatus::Failed => Self::Failed(draft),
        }
    }

    pub fn draft(&self) -> Option<&WorkflowDraft> {
        match self {
            Self::Empty => None,
            Self::Loading(draft) | Self::Ready(draft) | Self::Failed(draft) | Self::Stale(draft) => Some(draft),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading(_) => "loading",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
            Self::Stale(_) => "stale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Loading,
    Success,
    Error,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusLine {
    fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }
}

/// Which page the review surface opens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupTab {
    Common,
    QuickNote,
}

impl PopupTab {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::QuickNote => "quicknote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSnapshot {
    pub view: ReviewView,
    pub status: Option<StatusLine>,
}

struct Shared {
    store: KvStore,
    stale_after: Duration,
    snapshot: watch::Sender<ReviewSnapshot>,
}

impl Shared {
    /// Re-read the draft and publish the view if it changed.
    fn reconcile(&self) -> Result<ReviewView> {
        let draft = DraftStore::load(&self.store)?;
        let view = ReviewView::of(draft, Utc::now(), self.stale_after);
        let next = view.clone();
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.view == next {
                return false;
            }
            snapshot.view = next;
            true
        });
        Ok(view)
    }

    fn set_status(&self, status: StatusLine) {
        self.snapshot.send_modify(|snapshot| snapshot.status = Some(status));
    }

    fn loading_status(&self, view: &ReviewView) {
        match view {
            ReviewView::Loading(draft) => self.set_status(StatusLine::new(
                StatusKind::Loading,
                if draft.is_extract_only { "Extracting content..." } else { "Generating summary..." },
            )),
            ReviewView::Failed(draft) => self.set_status(StatusLine::new(
                StatusKind::Error,
                draft.error.clone().unwrap_or_else(|| "Capture failed".into()),
            )),
            ReviewView::Stale(_) => self.set_status(StatusLine::new(
                StatusKind::Error,
                "Previous capture did not finish; cancel it to start over",
            )),
            ReviewView::Empty | ReviewView::Ready(_) => {}
        }
    }
}

pub struct ReviewSession {
    handle: ContextHandle,
    shared: Arc<Shared>,
    quick_note: QuickNoteBuffer,
}

impl ReviewSession {
    /// Attach as the review context and rebuild state from the store.
    /// Listening starts before the store is read, so a push that lands in
    /// between is not lost either.
    pub fn attach(
        bus: &MessageBus,
        store: KvStore,
        collab: &Collaborators,
        cache: Arc<dyn PreviewCache>,
        stale_after: Duration,
    ) -> Result<Self> {
        let handle = bus.attach(ContextId::Popup)?;
        let (snapshot, _) = watch::channel(ReviewSnapshot { view: ReviewView::Empty, status: None });
        let shared = Arc::new(Shared { store: store.clone(), stale_after, snapshot });

        let listener = shared.clone();
        handle.subscribe(
            |message| matches!(message, Message::Popup(_)),
            move |envelope| {
                let shared = listener.clone();
                async move { handle_push(&shared, envelope) }
            },
        )?;

        let view = shared.reconcile()?;
        shared.loading_status(&view);
        debug!(view = view.name(), "review context attached");

        let ledger = Arc::new(AttachmentLedger::new(
            store.clone(),
            keys::QUICK_NOTE_ATTACHMENTS,
            collab.file_store.clone(),
            collab.fetcher.clone(),
            cache,
        ));
        let quick_note = QuickNoteBuffer::new(store, handle.sender(), ledger);
        Ok(Self { handle, shared, quick_note })
    }

    pub fn snapshot(&self) -> ReviewSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn view(&self) -> ReviewView {
        self.snapshot().view
    }

    pub fn status(&self) -> Option<StatusLine> {
        self.snapshot().status
    }

    pub fn quick_note(&self) -> &QuickNoteBuffer {
        &self.quick_note
    }

    /// Re-read the store.
    pub fn refresh(&self) -> Result<ReviewView> {
        self.shared.reconcile()
    }

    /// Wait until the draft leaves `Pending`, re-reading the store on every
    /// push, every storage change and every poll tick. Returns the last view
    /// seen when `timeout` runs out.
    pub async fn wait_until_settled(&self, timeout: Duration) -> Result<ReviewView> {
        let mut snapshots = self.shared.snapshot.subscribe();
        let mut changes = self.shared.store.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let view = self.shared.reconcile()?;
            if !view.is_loading() {
                return Ok(view);
            }
            tokio::select! {
                _ = snapshots.changed() => {}
                _ = changes.recv() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(view),
            }
        }
    }

    /// Ask the background to capture `request` for review. The reply only
    /// acknowledges receipt; the result arrives through the store.
    pub async fn request_capture(&self, request: CaptureRequest) -> Reply {
        let extract_only = request.is_extract_only;
        self.shared.set_status(StatusLine::new(
            StatusKind::Loading,
            if extract_only { "Extracting content..." } else { "Generating summary..." },
        ));
        let reply = self.handle.send_and_await(ContextId::Background, ToBackground::GetContent(request)).await;
        if reply.is_unknown() {
            self.shared.set_status(StatusLine::new(StatusKind::Error, NO_RESPONSE));
        }
        reply
    }

    /// Save `edited` in place of the draft's summary. The draft is cleared
    /// only on success, and only if no newer capture replaced it meanwhile.
    pub async fn save(&self, edited: &str) -> SaveOutcome {
        let outcome = self.save_inner(edited).await;
        match &outcome.error {
            None => self.shared.set_status(StatusLine::new(StatusKind::Success, "Saved successfully")),
            Some(error) => self.shared.set_status(StatusLine::new(StatusKind::Error, error.clone())),
        }
        if let Err(error) = self.shared.reconcile() {
            warn!(error = %error, "failed to refresh review after save");
        }
        outcome
    }

    async fn save_inner(&self, edited: &str) -> SaveOutcome {
        if edited.trim().is_empty() {
            return SaveOutcome::failed(CaptureError::empty_content().to_string());
        }
        let draft = match DraftStore::load(&self.shared.store) {
            Ok(draft) => draft,
            Err(error) => return SaveOutcome::failed(format!("failed to read draft: {error}")),
        };
        if !matches!(draft.status, DraftStatus::Ready | DraftStatus::Failed) {
            return SaveOutcome::failed(
                CaptureError::ValidationError("No finished capture to save".into()).to_string(),
            );
        }

        let request = SaveRequest {
            content: edited.to_string(),
            kind: draft.note_kind(),
            url: draft.url.clone(),
            title: draft.title.clone(),
            attachments: Vec::new(),
        };
        let outcome = match self.handle.send_and_await(ContextId::Background, ToBackground::SaveSummary(request)).await {
            Reply::Saved(outcome) => outcome,
            Reply::Unknown => SaveOutcome::failed(NO_RESPONSE),
            other => SaveOutcome::failed(format!("unexpected reply: {other:?}")),
        };

        if outcome.success {
            match DraftStore::clear_if_revision(&self.shared.store, draft.revision) {
                Ok(true) => info!(revision = draft.revision, "draft saved and cleared"),
                Ok(false) => info!(revision = draft.revision, "draft saved; newer capture kept"),
                Err(error) => warn!(revision = draft.revision, error = %error, "draft saved but not cleared"),
            }
        }
        outcome
    }

    /// Discard the draft whatever its state. A capture accepted while the
    /// cancel is in flight carries a newer revision and is kept.
    pub async fn cancel(&self) -> Result<()> {
        let seen = DraftStore::load(&self.shared.store)?.revision;
        let reply = self.handle.send_and_await(ContextId::Background, ToBackground::ClearSummary).await;
        if reply.is_unknown() {
            debug!("no background to clear the draft");
        }
        // The background clears after replying; make sure it is gone before
        // the view is rebuilt.
        if DraftStore::clear_if_revision(&self.shared.store, seen)? {
            debug!(revision = seen, "draft cleared locally");
        }
        self.shared.reconcile()?;
        self.shared.snapshot.send_modify(|snapshot| snapshot.status = None);
        info!(revision = seen, "draft cancelled");
        Ok(())
    }

    /// Page to open on: the quick note when arriving from a notification
    /// for `active_tab` (the flags are consumed) or when the quick note
    /// holds anything; otherwise the capture page.
    pub fn default_tab(&self, active_tab: Option<u32>) -> Result<PopupTab> {
        let store = &self.shared.store;
        let flags = store.get_many(StorageArea::Local, &[keys::NOTIFICATION_CLICKED, keys::NOTIFICATION_TAB_ID])?;
        let clicked = flags.get(keys::NOTIFICATION_CLICKED).and_then(Value::as_bool).unwrap_or(false);
        if clicked {
            store.remove_many(StorageArea::Local, &[keys::NOTIFICATION_CLICKED, keys::NOTIFICATION_TAB_ID])?;
            let tab = flags.get(keys::NOTIFICATION_TAB_ID).and_then(Value::as_u64);
            if tab.is_some() && tab == active_tab.map(u64::from) {
                return Ok(PopupTab::QuickNote);
            }
        }

        let has_text = !self.quick_note.text()?.trim().is_empty();
        let has_attachments = !self.quick_note.ledger().batch()?.is_empty();
        Ok(if has_text || has_attachments { PopupTab::QuickNote } else { PopupTab::Common })
    }

    /// Send the quick note, attributing it to `tab` when given.
    pub async fn send_quick_note(&self, tab: Option<&TabInfo>) -> SaveOutcome {
        let outcome = self.quick_note.send(tab).await;
        match &outcome.error {
            None => self.shared.set_status(StatusLine::new(StatusKind::Success, "Quick note sent")),
            Some(error) => self.shared.set_status(StatusLine::new(StatusKind::Error, error.clone())),
        }
        outcome
    }

    /// Tell the background the review context is going away, then detach.
    pub fn close(self) {
        self.handle.notify(ContextId::Background, ToBackground::PopupClosed);
    }
}

fn handle_push(shared: &Shared, envelope: Envelope) {
    let Message::Popup(push) = envelope.message else {
        return;
    };
    match push {
        ToPopup::HandleSummaryResponse(push) => {
            let view = match shared.reconcile() {
                Ok(view) => view,
                Err(error) => {
                    warn!(error = %error, "failed to reconcile after push");
                    return;
                }
            };
            let current = view.draft().map(|draft| draft.revision);
            if push.revision != 0 && current != Some(push.revision) {
                debug!(revision = push.revision, ?current, "ignoring push for replaced draft");
                return;
            }
            let status = if push.success {
                StatusLine::new(
                    StatusKind::Success,
                    if push.is_extract_only { "Content extracted" } else { "Summary generated" },
                )
            } else {
                StatusLine::new(StatusKind::Error, push.error.unwrap_or_else(|| "Capture failed".into()))
            };
            shared.set_status(status);
        }
        ToPopup::SaveSummaryResponse { response } => {
            let status = match response.error {
                None => StatusLine::new(StatusKind::Success, "Saved successfully"),
                Some(error) => StatusLine::new(StatusKind::Error, error),
            };
            shared.set_status(status);
        }
        ToPopup::FloatingBallResponse { response } => {
            let status = match (response.error, response.is_extract_only) {
                (None, true) => StatusLine::new(StatusKind::Success, "Extraction saved"),
                (None, false) => StatusLine::new(StatusKind::Success, "Summary saved"),
                (Some(error), _) => StatusLine::new(StatusKind::Error, error),
            };
            shared.set_status(status);
        }
        ToPopup::ClearSummaryResponse { success } => {
            if let Err(error) = shared.reconcile() {
                warn!(error = %error, "failed to reconcile after clear");
            }
            if !success {
                shared.set_status(StatusLine::new(StatusKind::Error, "Failed to clear draft"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(ms: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().expect("valid timestamp")
    }

    #[test]
    fn pending_past_limit_is_stale() {
        let draft = WorkflowDraft::pending(1, None, None, false, at(0));
        let limit = Duration::from_secs(900);
        assert!(ReviewView::of(draft.clone(), at(1_000), limit).is_loading());
        assert_eq!(ReviewView::of(draft.clone(), at(901_000), limit), ReviewView::Stale(draft));
    }

    #[test]
    fn terminal_drafts_map_to_their_views() {
        let ready = WorkflowDraft::pending(2, None, None, true, at(0)).into_ready("x".into(), at(1));
        let failed = WorkflowDraft::pending(3, None, None, false, at(0)).into_failed("boom", at(1));
        let limit = Duration::from_secs(1);
        assert_eq!(ReviewView::of(ready.clone(), at(10_000_000), limit), ReviewView::Ready(ready));
        assert_eq!(ReviewView::of(failed.clone(), at(10_000_000), limit).name(), "failed");
        assert_eq!(ReviewView::of(WorkflowDraft::default(), at(0), limit), ReviewView::Empty);
    }
}
