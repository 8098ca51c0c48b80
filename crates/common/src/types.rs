// Core domain types shared by the background, review and capture contexts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the single in-flight capture draft.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    #[default]
    None,
    Pending,
    Ready,
    Failed,
}

impl DraftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// `Ready` and `Failed` wait for the review context to consume them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// The workflow draft stored under `currentSummary`.
///
/// Exactly one exists at a time. `revision` increases with every accepted
/// capture request; writers compare it before replacing a draft so that a
/// superseded request can never overwrite its successor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowDraft {
    pub status: DraftStatus,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub is_extract_only: bool,
    /// Milliseconds since the Unix epoch of the last transition.
    pub timestamp: i64,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since the Unix epoch until which the capturing process
    /// promises to keep renewing a `Pending` draft.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_until: Option<i64>,
}

impl WorkflowDraft {
    /// A freshly accepted request awaiting its transformation.
    pub fn pending(
        revision: u64,
        url: Option<String>,
        title: Option<String>,
        is_extract_only: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: DraftStatus::Pending,
            summary: None,
            url,
            title,
            is_extract_only,
            timestamp: now.timestamp_millis(),
            revision,
            error: None,
            lease_until: None,
        }
    }

    pub fn leased_until(mut self, until: DateTime<Utc>) -> Self {
        self.lease_until = Some(until.timestamp_millis());
        self
    }

    pub fn into_ready(mut self, summary: String, now: DateTime<Utc>) -> Self {
        self.status = DraftStatus::Ready;
        self.summary = Some(summary);
        self.error = None;
        self.lease_until = None;
        self.timestamp = now.timestamp_millis();
        self
    }

    pub fn into_failed(mut self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.status = DraftStatus::Failed;
        self.summary = None;
        self.error = Some(error.into());
        self.lease_until = None;
        self.timestamp = now.timestamp_millis();
        self
    }

    pub fn is_none(&self) -> bool {
        self.status == DraftStatus::None
    }

    /// Kind used when the reviewed draft is finally saved.
    pub fn note_kind(&self) -> NoteKind {
        if self.is_extract_only {
            NoteKind::Extract
        } else {
            NoteKind::Summary
        }
    }

    /// Whether a `Pending` draft has no live owner: its lease is missing or
    /// was not renewed in time.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == DraftStatus::Pending
            && self.lease_until.map_or(true, |until| until <= now.timestamp_millis())
    }

    /// Whether a `Pending` draft has outlived `max_age_ms` and must be
    /// treated as orphaned.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_ms: i64) -> bool {
        self.status == DraftStatus::Pending
            && now.timestamp_millis().saturating_sub(self.timestamp) > max_age_ms
    }
}

/// What kind of note is being written; selects URL toggles and tags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NoteKind {
    Summary,
    Extract,
    Image,
    QuickNote,
    Selection,
}

impl NoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Extract => "extract",
            Self::Image => "image",
            Self::QuickNote => "quickNote",
            Self::Selection => "selection",
        }
    }
}

/// Metadata of a file uploaded to the note store.
///
/// Local preview handles are deliberately absent: they are owned by the
/// context that created them and regenerated from `original_url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "path")]
    pub remote_path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
}

/// Normalized result of a remote save. Never an `Err`: every failure is
/// folded into `success: false` with a human-readable cause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    pub fn saved(data: serde_json::Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

/// Raw page content returned by the capture context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedContent {
    pub content: String,
    pub url: String,
    pub title: String,
}

/// The tab a host event or menu click originated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabInfo {
    pub id: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}
