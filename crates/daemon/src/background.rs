// Background context: owns the coordinator and routes every message sent
// to it.
//
// Each request is answered immediately where the protocol says so; results
// that take a round trip through a collaborator are pushed afterwards and
// are always in the store before the push goes out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::keys::{self, StorageArea};
use clipnote_common::protocol::messages::{
    CaptureRequest, DirectSaveResult, Reply, SummaryPush, ToBackground, ToPopup, ToTab,
};
use clipnote_common::types::SaveOutcome;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::{ContextHandle, ContextId, ContextSender, Envelope, Message, MessageBus};
use crate::collab::Collaborators;
use crate::coordinator::{CaptureCoordinator, CaptureOutcome};
use crate::menu::{self, MenuClick};
use crate::store::KvStore;

const DEFAULT_NOTIFICATION_TITLE: &str = "Notification";

pub struct BackgroundRouter {
    handle: ContextHandle,
    coordinator: Arc<CaptureCoordinator>,
}

impl BackgroundRouter {
    /// Attach the background context, recover any orphaned draft and start
    /// routing.
    pub fn start(bus: &MessageBus, store: KvStore, collab: Collaborators, stale_after: Duration) -> Result<Self> {
        let handle = bus.attach(ContextId::Background)?;
        let coordinator = Arc::new(CaptureCoordinator::new(store, collab, handle.sender(), stale_after));
        coordinator.recover_orphaned().context("failed to recover orphaned draft")?;

        let routed = coordinator.clone();
        let sender = handle.sender();
        handle.subscribe(
            |message| matches!(message, Message::Background(_)),
            move |envelope| {
                let coordinator = routed.clone();
                let sender = sender.clone();
                async move { route(&coordinator, &sender, envelope).await }
            },
        )?;

        info!("background router started");
        Ok(Self { handle, coordinator })
    }

    pub fn coordinator(&self) -> &Arc<CaptureCoordinator> {
        &self.coordinator
    }

    pub fn sender(&self) -> ContextSender {
        self.handle.sender()
    }

    pub async fn on_menu_click(&self, click: &MenuClick) -> SaveOutcome {
        menu::handle_click(&self.coordinator, &self.handle, click).await
    }

    /// Remember that the user came in through a notification, so the next
    /// review context opens on the quick note for that tab.
    pub fn on_notification_clicked(&self, tab_id: u32) -> Result<()> {
        self.coordinator.store().set_many(
            StorageArea::Local,
            &[(keys::NOTIFICATION_CLICKED, json!(true)), (keys::NOTIFICATION_TAB_ID, json!(tab_id))],
        )?;
        debug!(tab = tab_id, "notification click recorded");
        Ok(())
    }
}

async fn route(coordinator: &CaptureCoordinator, sender: &ContextSender, mut envelope: Envelope) {
    let Message::Background(message) = envelope.message.clone() else {
        return;
    };
    debug!(action = message.action(), from = %envelope.from, "background message");

    match message {
        ToBackground::GetContent(request) => {
            envelope.respond(Reply::Received);
            if request.direct_save {
                coordinator.direct_save(&request).await;
            } else {
                capture_for_review(coordinator, sender, &request).await;
            }
        }
        ToBackground::SaveSummary(request) => {
            let outcome = coordinator.finalize(&request).await;
            match &outcome.error {
                None => coordinator.collaborators().notifier.notify("Save Successful", "Note has been saved"),
                Some(error) => coordinator.collaborators().notifier.notify("Save Failed", error),
            }
            envelope.respond(Reply::Saved(outcome.clone()));
            sender.notify(ContextId::Popup, ToPopup::SaveSummaryResponse { response: outcome });
        }
        ToBackground::ProcessAndSendContent(request) => {
            envelope.respond(Reply::Processing);
            let outcome = coordinator.direct_save(&request).await;
            if let ContextId::Tab(tab) = envelope.from {
                sender.notify(
                    ContextId::Tab(tab),
                    ToTab::UpdateFloatingBallState {
                        enabled: None,
                        success: Some(outcome.success),
                        error: outcome.error.clone(),
                    },
                );
            }
            sender.notify(
                ContextId::Popup,
                ToPopup::FloatingBallResponse {
                    response: DirectSaveResult {
                        success: outcome.success,
                        is_extract_only: request.is_extract_only,
                        error: outcome.error,
                    },
                },
            );
        }
        ToBackground::GetSummaryState => match coordinator.draft() {
            Ok(draft) => envelope.respond(Reply::Draft(draft)),
            Err(error) => {
                // No answer: the caller resolves to `Unknown` and reads the store itself.
                warn!(error = %error, "failed to read draft");
            }
        },
        ToBackground::ClearSummary => {
            envelope.respond(Reply::Processing);
            let success = match coordinator.clear_draft() {
                Ok(()) => true,
                Err(error) => {
                    warn!(error = %error, "failed to clear draft");
                    false
                }
            };
            sender.notify(ContextId::Popup, ToPopup::ClearSummaryResponse { success });
        }
        ToBackground::ShowNotification { title, message } => {
            let title = title.filter(|title| !title.is_empty());
            coordinator.collaborators().notifier.notify(
                title.as_deref().unwrap_or(DEFAULT_NOTIFICATION_TITLE),
                message.as_deref().unwrap_or_default(),
            );
            envelope.respond(Reply::Received);
        }
        ToBackground::PopupClosed => {
            debug!("review context closed");
        }
    }
}

/// Stage a review draft. Failures that happen before a draft exists are
/// pushed with revision 0 so an open review context can show them.
async fn capture_for_review(coordinator: &CaptureCoordinator, sender: &ContextSender, request: &CaptureRequest) {
    let error = match coordinator.request_capture(request).await {
        Ok(CaptureOutcome::Completed(_)) | Ok(CaptureOutcome::Superseded { .. }) => return,
        Ok(CaptureOutcome::Rejected(error)) => error,
        Err(error) => {
            warn!(error = %error, "capture could not be recorded");
            CaptureError::ValidationError(format!("failed to record capture: {error}"))
        }
    };

    sender.notify(
        ContextId::Popup,
        ToPopup::HandleSummaryResponse(SummaryPush {
            success: false,
            revision: 0,
            is_extract_only: request.is_extract_only,
            summary: None,
            url: request.url.clone(),
            title: request.title.clone(),
            error: Some(error.to_string()),
        }),
    );
    let title = if request.is_extract_only { "Extraction Failed" } else { "Summary Failed" };
    coordinator.collaborators().notifier.notify(title, &error.to_string());
}
