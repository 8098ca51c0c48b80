// Context-menu actions handled by the background context.

use std::fmt;
use std::str::FromStr;

use clipnote_common::error::CaptureError;
use clipnote_common::protocol::keys;
use clipnote_common::protocol::messages::{CaptureRequest, Reply, SaveRequest, ToTab};
use clipnote_common::types::{Attachment, NoteKind, SaveOutcome, TabInfo};
use serde_json::json;
use tracing::{info, warn};

use crate::attachments::append_to_batch;
use crate::bus::{ContextId, ContextSender};
use crate::coordinator::CaptureCoordinator;
use crate::quick_note;

/// File name given to images captured from a page.
pub const IMAGE_FILE_NAME: &str = "image.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    SendSelectedText,
    SaveToQuickNote,
    SaveImageToQuickNote,
    SaveImageToBlinko,
    SummarizePageContent,
    ExtractPageContent,
}

impl MenuAction {
    pub const ALL: [MenuAction; 6] = [
        Self::SendSelectedText,
        Self::SaveToQuickNote,
        Self::SaveImageToQuickNote,
        Self::SaveImageToBlinko,
        Self::SummarizePageContent,
        Self::ExtractPageContent,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::SendSelectedText => "sendSelectedText",
            Self::SaveToQuickNote => "saveToQuickNote",
            Self::SaveImageToQuickNote => "saveImageToQuickNote",
            Self::SaveImageToBlinko => "saveImageToBlinko",
            Self::SummarizePageContent => "summarizePageContent",
            Self::ExtractPageContent => "extractPageContent",
        }
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for MenuAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.id() == value)
            .ok_or_else(|| format!("unknown menu item `{value}`"))
    }
}

/// One menu click, as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuClick {
    pub action: MenuAction,
    pub tab: Option<TabInfo>,
    pub selection_text: Option<String>,
    pub src_url: Option<String>,
}

/// Run a menu action to completion. Every outcome raises a notification;
/// nothing is returned as an error.
pub async fn handle_click(coordinator: &CaptureCoordinator, sender: &ContextSender, click: &MenuClick) -> SaveOutcome {
    info!(action = %click.action, tab = click.tab.as_ref().map(|tab| tab.id), "menu action");
    match click.action {
        MenuAction::SendSelectedText => send_selected_text(coordinator, click).await,
        MenuAction::SaveToQuickNote => save_to_quick_note(coordinator, click),
        MenuAction::SaveImageToQuickNote => save_image_to_quick_note(coordinator, click).await,
        MenuAction::SaveImageToBlinko => save_image_note(coordinator, click).await,
        MenuAction::SummarizePageContent => capture_page(coordinator, sender, click, false).await,
        MenuAction::ExtractPageContent => capture_page(coordinator, sender, click, true).await,
    }
}

fn selection(click: &MenuClick) -> Result<String, CaptureError> {
    click
        .selection_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CaptureError::ValidationError("No text selected".into()))
}

fn notify_result(coordinator: &CaptureCoordinator, outcome: &SaveOutcome, success: (&str, &str), failure: &str) {
    let notifier = &coordinator.collaborators().notifier;
    match &outcome.error {
        None => notifier.notify(success.0, success.1),
        Some(error) => {
            warn!(title = failure, error = %error, "menu action failed");
            notifier.notify(failure, error);
        }
    }
}

async fn send_selected_text(coordinator: &CaptureCoordinator, click: &MenuClick) -> SaveOutcome {
    let outcome = match selection(click) {
        Ok(content) => {
            coordinator
                .finalize(&SaveRequest {
                    content,
                    kind: NoteKind::Selection,
                    url: click.tab.as_ref().map(|tab| tab.url.clone()),
                    title: click.tab.as_ref().map(|tab| tab.title.clone()),
                    attachments: Vec::new(),
                })
                .await
        }
        Err(error) => SaveOutcome::failed(error.to_string()),
    };
    notify_result(
        coordinator,
        &outcome,
        ("Sent Successfully", "Selected text has been sent to the note store"),
        "Send Failed",
    );
    outcome
}

fn save_to_quick_note(coordinator: &CaptureCoordinator, click: &MenuClick) -> SaveOutcome {
    let outcome = match selection(click) {
        Ok(text) => match quick_note::append_text(coordinator.store(), &text) {
            Ok(note) => SaveOutcome::saved(json!({ "length": note.len() })),
            Err(error) => SaveOutcome::failed(format!("failed to update quick note: {error}")),
        },
        Err(error) => SaveOutcome::failed(error.to_string()),
    };
    notify_result(
        coordinator,
        &outcome,
        ("Added to Quick Note", "Selected text has been added to Quick Notes"),
        "Save Failed",
    );
    outcome
}

/// Fetch the clicked image and upload it. The returned metadata carries
/// the source URL so previews can be rebuilt later.
async fn upload_clicked_image(coordinator: &CaptureCoordinator, click: &MenuClick) -> Result<Attachment, CaptureError> {
    let src = click
        .src_url
        .as_deref()
        .filter(|src| !src.is_empty())
        .ok_or_else(|| CaptureError::ValidationError("No image source".into()))?;
    let settings = coordinator.settings()?;
    if !settings.note_store_configured() {
        return Err(CaptureError::missing_note_store());
    }
    let collab = coordinator.collaborators();
    let blob = collab.fetcher.fetch(src).await?;
    let mut attachment = collab.file_store.upload_file(IMAGE_FILE_NAME, blob, &settings).await?;
    attachment.original_url = Some(src.to_string());
    Ok(attachment)
}

async fn save_image_to_quick_note(coordinator: &CaptureCoordinator, click: &MenuClick) -> SaveOutcome {
    let outcome = match upload_clicked_image(coordinator, click).await {
        Ok(attachment) => match append_to_batch(coordinator.store(), keys::QUICK_NOTE_ATTACHMENTS, attachment) {
            Ok(count) => SaveOutcome::saved(json!({ "attachments": count })),
            Err(error) => SaveOutcome::failed(format!("failed to record attachment: {error}")),
        },
        Err(error) => SaveOutcome::failed(error.to_string()),
    };
    notify_result(
        coordinator,
        &outcome,
        ("Added to Quick Note", "Image has been added to Quick Notes"),
        "Save Failed",
    );
    outcome
}

async fn save_image_note(coordinator: &CaptureCoordinator, click: &MenuClick) -> SaveOutcome {
    let outcome = match upload_clicked_image(coordinator, click).await {
        Ok(attachment) => {
            coordinator
                .finalize(&SaveRequest {
                    content: String::new(),
                    kind: NoteKind::Image,
                    url: click.tab.as_ref().map(|tab| tab.url.clone()),
                    title: click.tab.as_ref().map(|tab| tab.title.clone()),
                    attachments: vec![attachment],
                })
                .await
        }
        Err(error) => SaveOutcome::failed(error.to_string()),
    };
    notify_result(
        coordinator,
        &outcome,
        ("Save Successful", "Image has been saved to the note store"),
        "Save Failed",
    );
    outcome
}

/// Ask the tab for its content, then save it directly. The direct save
/// raises its own notification.
async fn capture_page(
    coordinator: &CaptureCoordinator,
    sender: &ContextSender,
    click: &MenuClick,
    is_extract_only: bool,
) -> SaveOutcome {
    let failure_title = if is_extract_only { "Extract Failed" } else { "Summarize Failed" };
    let fail = |error: String| {
        warn!(action = %click.action, error = %error, "page capture failed");
        coordinator.collaborators().notifier.notify(failure_title, &error);
        SaveOutcome::failed(error)
    };

    let Some(tab) = click.tab.as_ref() else {
        return fail(CaptureError::ValidationError("No active tab".into()).to_string());
    };
    let response = match sender.send_and_await(ContextId::Tab(tab.id), ToTab::GetContent).await {
        Reply::Content(response) if response.success => response,
        Reply::Content(response) => {
            return fail(response.error.unwrap_or_else(|| "Failed to get content".into()));
        }
        Reply::Unknown => return fail("Failed to get content: tab did not respond".into()),
        other => return fail(format!("Failed to get content: unexpected reply {other:?}")),
    };

    coordinator
        .direct_save(&CaptureRequest {
            content: response.content.unwrap_or_default(),
            url: response.url.or_else(|| Some(tab.url.clone())),
            title: response.title.or_else(|| Some(tab.title.clone())),
            is_extract_only,
            direct_save: true,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_ids_round_trip() {
        for action in MenuAction::ALL {
            assert_eq!(action.id().parse::<MenuAction>(), Ok(action));
        }
        assert!("blinkoExtension".parse::<MenuAction>().is_err());
    }

    #[test]
    fn selection_is_trimmed_and_required() {
        let mut click = MenuClick {
            action: MenuAction::SendSelectedText,
            tab: None,
            selection_text: Some("  quoted  ".into()),
            src_url: None,
        };
        assert_eq!(selection(&click).unwrap(), "quoted");
        click.selection_text = Some("   ".into());
        assert!(matches!(selection(&click), Err(CaptureError::ValidationError(_))));
    }
}
