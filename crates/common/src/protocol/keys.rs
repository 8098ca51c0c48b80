// Persisted storage keys and the areas they live in.

use serde::{Deserialize, Serialize};

/// Settings record (sync area).
pub const SETTINGS: &str = "settings";
/// The single workflow draft (local area).
pub const CURRENT_SUMMARY: &str = "currentSummary";
/// Quick-note text (local area).
pub const QUICK_NOTE: &str = "quickNote";
/// Quick-note attachment batch (local area).
pub const QUICK_NOTE_ATTACHMENTS: &str = "quickNoteAttachments";
/// Set when the user clicks a system notification (local area).
pub const NOTIFICATION_CLICKED: &str = "notificationClicked";
/// Tab that was active when the notification was clicked (local area).
pub const NOTIFICATION_TAB_ID: &str = "notificationTabId";
/// Next draft revision to hand out (local area).
pub const DRAFT_REVISION: &str = "draftRevision";

/// Storage area. `Sync` holds user settings; everything else is `Local`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StorageArea {
    Local,
    Sync,
}

impl StorageArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sync => "sync",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }
}
