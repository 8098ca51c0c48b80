// Quick note: freeform text plus its own attachment batch, sent as one note.

use std::sync::Arc;

use anyhow::Result;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::keys::{self, StorageArea};
use clipnote_common::protocol::messages::{Reply, SaveRequest, ToBackground};
use clipnote_common::types::{NoteKind, SaveOutcome, TabInfo};
use tracing::{info, warn};

use crate::attachments::{AttachmentLedger, LedgerEntry};
use crate::bus::{ContextId, ContextSender};
use crate::store::{KvStore, Write};

const PARAGRAPH_BREAK: &str = "\n\n";

/// Append `text` to the stored quick note, separated by a blank line.
/// Returns the new text.
pub fn append_text(store: &KvStore, text: &str) -> Result<String> {
    let addition = text.trim().to_string();
    store.update(StorageArea::Local, keys::QUICK_NOTE, |current: Option<String>| {
        let mut note = current.unwrap_or_default();
        if addition.is_empty() {
            return (Write::Keep, note);
        }
        if !note.is_empty() {
            note.push_str(PARAGRAPH_BREAK);
        }
        note.push_str(&addition);
        (Write::Set(note.clone()), note)
    })
}

/// Snapshot of the buffer as the review context shows it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuickNoteView {
    pub text: String,
    pub attachments: Vec<LedgerEntry>,
}

impl QuickNoteView {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

pub struct QuickNoteBuffer {
    store: KvStore,
    sender: ContextSender,
    ledger: Arc<AttachmentLedger>,
}

impl QuickNoteBuffer {
    pub fn new(store: KvStore, sender: ContextSender, ledger: Arc<AttachmentLedger>) -> Self {
        Self { store, sender, ledger }
    }

    pub fn ledger(&self) -> &AttachmentLedger {
        &self.ledger
    }

    pub fn text(&self) -> Result<String> {
        Ok(self.store.get(StorageArea::Local, keys::QUICK_NOTE)?.unwrap_or_default())
    }

    /// Text plus attachments with previews rebuilt.
    pub async fn load(&self) -> Result<QuickNoteView> {
        let text = self.text()?;
        let attachments = self.ledger.load().await?;
        Ok(QuickNoteView { text, attachments })
    }

    /// Persist edited text. Blank text is not written, so an accidental
    /// wipe of the input does not erase the stored note.
    pub fn set_text(&self, text: &str) -> Result<bool> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        self.store.set(StorageArea::Local, keys::QUICK_NOTE, &text)?;
        Ok(true)
    }

    pub fn append_text(&self, text: &str) -> Result<String> {
        append_text(&self.store, text)
    }

    /// Send text and attachments as one quick note. On success the text,
    /// the batch and every preview are dropped together; on failure all of
    /// it is kept.
    pub async fn send(&self, tab: Option<&TabInfo>) -> SaveOutcome {
        let text = match self.text() {
            Ok(text) => text,
            Err(error) => return SaveOutcome::failed(format!("failed to read quick note: {error}")),
        };
        if text.trim().is_empty() {
            return SaveOutcome::failed(
                CaptureError::ValidationError("Please enter note content".into()).to_string(),
            );
        }
        let attachments = match self.ledger.batch() {
            Ok(batch) => batch,
            Err(error) => return SaveOutcome::failed(format!("failed to read attachments: {error}")),
        };

        let request = SaveRequest {
            content: text.trim().to_string(),
            kind: NoteKind::QuickNote,
            url: tab.map(|tab| tab.url.clone()).filter(|url| !url.is_empty()),
            title: tab.map(|tab| tab.title.clone()).filter(|title| !title.is_empty()),
            attachments,
        };
        let outcome = match self
            .sender
            .send_and_await(ContextId::Background, ToBackground::SaveSummary(request))
            .await
        {
            Reply::Saved(outcome) => outcome,
            Reply::Unknown => SaveOutcome::failed("no response from background"),
            other => SaveOutcome::failed(format!("unexpected reply: {other:?}")),
        };

        if outcome.success {
            if let Err(error) = self.store.remove_many(
                StorageArea::Local,
                &[keys::QUICK_NOTE, keys::QUICK_NOTE_ATTACHMENTS],
            ) {
                warn!(error = %error, "quick note sent but could not be cleared");
            }
            self.ledger.release_all();
            info!("quick note sent");
        }
        outcome
    }

    /// Drop text, batch and previews.
    pub fn clear(&self) -> Result<()> {
        self.ledger.release_all();
        self.store
            .remove_many(StorageArea::Local, &[keys::QUICK_NOTE, keys::QUICK_NOTE_ATTACHMENTS])
    }
}
