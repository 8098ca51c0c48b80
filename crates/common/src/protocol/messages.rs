// Message unions, one per direction, discriminated by the `action` field.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::actions;
use crate::types::{Attachment, NoteKind, SaveOutcome, WorkflowDraft};

/// Captured content handed to the background for summarization or
/// extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_extract_only: bool,
    /// Save straight to the note store instead of staging a draft.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub direct_save: bool,
}

/// A finalized note to persist remotely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NoteKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Review/capture context → background.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ToBackground {
    GetContent(CaptureRequest),
    SaveSummary(SaveRequest),
    ProcessAndSendContent(CaptureRequest),
    GetSummaryState,
    ClearSummary,
    ShowNotification {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    PopupClosed,
}

impl ToBackground {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetContent(_) => actions::GET_CONTENT,
            Self::SaveSummary(_) => actions::SAVE_SUMMARY,
            Self::ProcessAndSendContent(_) => actions::PROCESS_AND_SEND_CONTENT,
            Self::GetSummaryState => actions::GET_SUMMARY_STATE,
            Self::ClearSummary => actions::CLEAR_SUMMARY,
            Self::ShowNotification { .. } => actions::SHOW_NOTIFICATION,
            Self::PopupClosed => actions::POPUP_CLOSED,
        }
    }
}

/// Result pushed after a capture reaches `Ready` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPush {
    pub success: bool,
    pub revision: u64,
    #[serde(default)]
    pub is_extract_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a direct (floating ball / menu) capture-and-save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectSaveResult {
    pub success: bool,
    #[serde(default)]
    pub is_extract_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Background → review context. Pure notifications: receivers reconcile
/// from storage rather than trusting the payload alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ToPopup {
    HandleSummaryResponse(SummaryPush),
    SaveSummaryResponse { response: SaveOutcome },
    FloatingBallResponse { response: DirectSaveResult },
    ClearSummaryResponse { success: bool },
}

impl ToPopup {
    pub fn action(&self) -> &'static str {
        match self {
            Self::HandleSummaryResponse(_) => actions::HANDLE_SUMMARY_RESPONSE,
            Self::SaveSummaryResponse { .. } => actions::SAVE_SUMMARY_RESPONSE,
            Self::FloatingBallResponse { .. } => actions::FLOATING_BALL_RESPONSE,
            Self::ClearSummaryResponse { .. } => actions::CLEAR_SUMMARY_RESPONSE,
        }
    }
}

/// Background/review → capture context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ToTab {
    GetContent,
    UpdateFloatingBallState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ToTab {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetContent => actions::GET_CONTENT,
            Self::UpdateFloatingBallState { .. } => actions::UPDATE_FLOATING_BALL_STATE,
        }
    }
}

/// The capture context's answer to `ToTab::GetContent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immediate answer to a request. `Unknown` is what a caller observes when
/// the receiving context vanished or returned without answering.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Received,
    Processing,
    Saved(SaveOutcome),
    Draft(WorkflowDraft),
    Content(ContentResponse),
    Unknown,
}

impl Reply {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Wire representation of the response payload.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Received => json!({ "received": true }),
            Self::Processing => json!({ "processing": true }),
            Self::Saved(outcome) => json!(outcome),
            Self::Draft(draft) => json!(draft),
            Self::Content(content) => json!(content),
            Self::Unknown => Value::Null,
        }
    }
}
