// Capture workflow: capture request → transformation → draft → push.
//
// Every transition is written to the store before anything is pushed, so a
// context that reads the store after seeing a push always finds the state
// the push describes.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clipnote_common::backlink::compose_note_body;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::messages::{CaptureRequest, SaveRequest, SummaryPush, ToPopup};
use clipnote_common::settings::Settings;
use clipnote_common::types::{DraftStatus, NoteKind, SaveOutcome, WorkflowDraft};
use tracing::{debug, info, warn};

use crate::bus::{ContextId, ContextSender};
use crate::collab::Collaborators;
use crate::settings_store::SettingsStore;
use crate::store::{DraftStore, KvStore};

/// How long a `Pending` draft stays owned without a renewal.
pub const DRAFT_LEASE_SECS: i64 = 30;
const LEASE_RENEWAL: Duration = Duration::from_secs(10);

/// Where the current capture stands, derived from the stored draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Extracting,
    Summarizing,
    Ready,
    Failed,
}

impl CapturePhase {
    pub fn of(draft: &WorkflowDraft) -> Self {
        match draft.status {
            DraftStatus::None => Self::Idle,
            DraftStatus::Pending if draft.is_extract_only => Self::Extracting,
            DraftStatus::Pending => Self::Summarizing,
            DraftStatus::Ready => Self::Ready,
            DraftStatus::Failed => Self::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Summarizing => "summarizing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// The draft reached `Ready` or `Failed` and was pushed.
    Completed(WorkflowDraft),
    /// A newer request replaced this one before it finished.
    Superseded { revision: u64 },
    /// Refused before anything was written.
    Rejected(CaptureError),
}

pub struct CaptureCoordinator {
    store: KvStore,
    collab: Collaborators,
    sender: ContextSender,
    stale_after: Duration,
}

impl CaptureCoordinator {
    pub fn new(store: KvStore, collab: Collaborators, sender: ContextSender, stale_after: Duration) -> Self {
        Self { store, collab, sender, stale_after }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn settings(&self) -> Result<Settings, CaptureError> {
        SettingsStore::load(&self.store).map_err(|error| {
            warn!(error = %error, "failed to read settings");
            CaptureError::ConfigurationMissing(format!("failed to read settings: {error}"))
        })
    }

    pub fn draft(&self) -> Result<WorkflowDraft> {
        DraftStore::load(&self.store)
    }

    pub fn phase(&self) -> Result<CapturePhase> {
        Ok(CapturePhase::of(&self.draft()?))
    }

    /// Accept a capture and drive it to `Ready`/`Failed`. A later request
    /// replaces this one unconditionally; this request's result is then
    /// dropped instead of written.
    pub async fn request_capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome> {
        if request.content.trim().is_empty() {
            return Ok(CaptureOutcome::Rejected(CaptureError::empty_content()));
        }

        let now = Utc::now();
        let draft = DraftStore::begin(&self.store, |revision| {
            let pending = WorkflowDraft::pending(
                revision,
                request.url.clone(),
                request.title.clone(),
                request.is_extract_only,
                now,
            );
            if request.is_extract_only {
                pending.into_ready(request.content.clone(), now)
            } else {
                pending.leased_until(now + chrono::Duration::seconds(DRAFT_LEASE_SECS))
            }
        })?;
        info!(revision = draft.revision, extract_only = request.is_extract_only, "capture accepted");

        if draft.status == DraftStatus::Ready {
            self.publish(&draft);
            return Ok(CaptureOutcome::Completed(draft));
        }

        let revision = draft.revision;
        let result = match self.settings() {
            Ok(settings) => {
                self.holding_lease(revision, self.collab.summarizer.summarize(&request.content, &settings))
                    .await
            }
            Err(error) => Err(error),
        };

        let finished = DraftStore::complete(&self.store, revision, |pending| match result {
            Ok(summary) => pending.into_ready(summary, Utc::now()),
            Err(error) => {
                warn!(revision, error = %error, "summarization failed");
                pending.into_failed(error.to_string(), Utc::now())
            }
        })?;

        match finished {
            Some(draft) => {
                self.publish(&draft);
                Ok(CaptureOutcome::Completed(draft))
            }
            None => {
                info!(revision, "discarding result of superseded capture");
                Ok(CaptureOutcome::Superseded { revision })
            }
        }
    }

    /// Drive `work` while renewing the lease on draft `revision`, so other
    /// processes sharing the store keep treating it as in flight.
    async fn holding_lease<T>(&self, revision: u64, work: impl Future<Output = T>) -> T {
        tokio::pin!(work);
        let mut renewal = tokio::time::interval_at(tokio::time::Instant::now() + LEASE_RENEWAL, LEASE_RENEWAL);
        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = renewal.tick() => {
                    let until = Utc::now() + chrono::Duration::seconds(DRAFT_LEASE_SECS);
                    match DraftStore::renew_lease(&self.store, revision, until) {
                        Ok(true) => debug!(revision, "draft lease renewed"),
                        Ok(false) => debug!(revision, "draft no longer pending; lease left to lapse"),
                        Err(error) => warn!(revision, error = %error, "failed to renew draft lease"),
                    }
                }
            }
        }
    }

    /// Compose the outbound body and save it. Never fails: collaborator
    /// errors come back as `success: false`.
    pub async fn finalize(&self, request: &SaveRequest) -> SaveOutcome {
        let settings = match self.settings() {
            Ok(settings) => settings,
            Err(error) => return SaveOutcome::failed(error.to_string()),
        };
        if !settings.note_store_configured() {
            return SaveOutcome::failed(CaptureError::missing_note_store().to_string());
        }

        let body = compose_note_body(
            &request.content,
            request.kind,
            request.url.as_deref(),
            request.title.as_deref(),
            &settings,
        );
        if body.trim().is_empty() && request.attachments.is_empty() {
            return SaveOutcome::failed(CaptureError::empty_content().to_string());
        }

        match self.collab.note_store.save_note(&body, &request.attachments, &settings).await {
            Ok(data) => {
                info!(kind = request.kind.as_str(), attachments = request.attachments.len(), "note saved");
                SaveOutcome::saved(data)
            }
            Err(error) => {
                warn!(kind = request.kind.as_str(), error = %error, "note save failed");
                SaveOutcome::failed(error.to_string())
            }
        }
    }

    /// Capture and save in one go, without staging a review draft.
    pub async fn direct_save(&self, request: &CaptureRequest) -> SaveOutcome {
        let outcome = self.transform_and_save(request).await;
        let (title, message) = match (&outcome.error, request.is_extract_only) {
            (None, true) => ("Extraction Saved", "Extracted content has been saved".to_string()),
            (None, false) => ("Summary Saved", "Summary has been saved".to_string()),
            (Some(error), true) => ("Extract Failed", error.clone()),
            (Some(error), false) => ("Summarize Failed", error.clone()),
        };
        self.collab.notifier.notify(title, &message);
        outcome
    }

    async fn transform_and_save(&self, request: &CaptureRequest) -> SaveOutcome {
        if request.content.trim().is_empty() {
            return SaveOutcome::failed(CaptureError::empty_content().to_string());
        }

        let content = if request.is_extract_only {
            request.content.clone()
        } else {
            let summary = match self.settings() {
                Ok(settings) => self.collab.summarizer.summarize(&request.content, &settings).await,
                Err(error) => Err(error),
            };
            match summary {
                Ok(summary) => summary,
                Err(error) => {
                    warn!(error = %error, "direct-save summarization failed");
                    return SaveOutcome::failed(error.to_string());
                }
            }
        };

        let kind = if request.is_extract_only { NoteKind::Extract } else { NoteKind::Summary };
        self.finalize(&SaveRequest {
            content,
            kind,
            url: request.url.clone(),
            title: request.title.clone(),
            attachments: Vec::new(),
        })
        .await
    }

    pub fn clear_draft(&self) -> Result<()> {
        DraftStore::clear(&self.store)
    }

    /// Mark a `Pending` draft whose owner stopped renewing its lease as failed.
    pub fn recover_orphaned(&self) -> Result<Option<WorkflowDraft>> {
        DraftStore::recover_orphaned(&self.store, Utc::now())
    }

    fn publish(&self, draft: &WorkflowDraft) {
        let success = draft.status == DraftStatus::Ready;
        self.sender.notify(
            ContextId::Popup,
            ToPopup::HandleSummaryResponse(SummaryPush {
                success,
                revision: draft.revision,
                is_extract_only: draft.is_extract_only,
                summary: draft.summary.clone(),
                url: draft.url.clone(),
                title: draft.title.clone(),
                error: draft.error.clone(),
            }),
        );

        let (title, message) = match (success, draft.is_extract_only) {
            (true, true) => ("Extraction Successful", "Content is ready for review".to_string()),
            (true, false) => ("Summary Generated Successfully", "Summary is ready for review".to_string()),
            (false, true) => ("Extraction Failed", draft.error.clone().unwrap_or_default()),
            (false, false) => ("Summary Failed", draft.error.clone().unwrap_or_default()),
        };
        self.collab.notifier.notify(title, &message);
    }
}
