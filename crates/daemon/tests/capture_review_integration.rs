mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::messages::{Reply, SaveRequest, ToBackground};
use clipnote_common::settings::Settings;
use clipnote_common::types::{Attachment, DraftStatus, NoteKind, WorkflowDraft};
use clipnote_daemon::attachments::BlobCache;
use clipnote_daemon::bus::{ContextId, Envelope, Message, MessageBus};
use clipnote_daemon::collab::Collaborators;
use clipnote_daemon::coordinator::CaptureOutcome;
use clipnote_daemon::review::{ReviewSession, ReviewView, StatusKind};
use clipnote_daemon::settings_store::SettingsStore;
use clipnote_daemon::store::draft::INTERRUPTED_MESSAGE;
use clipnote_daemon::store::{DraftStore, KvStore};
use support::{capture, configured_settings, harness, harness_with_store, WAIT};

#[tokio::test]
async fn summary_capture_is_reviewed_and_saved_with_backlink_and_tag() {
    let h = harness();
    h.summarizer.reply("Hello world", "Hi");
    let review = h.runtime.review().expect("review should attach");

    let reply = review.request_capture(capture("Hello world", false)).await;
    assert_eq!(reply, Reply::Received);

    let view = review.wait_until_settled(WAIT).await.expect("view should settle");
    let draft = match view {
        ReviewView::Ready(draft) => draft,
        other => panic!("unexpected view: {other:?}"),
    };
    assert_eq!(draft.summary.as_deref(), Some("Hi"));

    let outcome = review.save("Hi").await;
    assert!(outcome.success, "save should succeed: {outcome:?}");
    assert_eq!(h.notes.bodies(), vec!["Hi\n\nOriginal link: [X](https://x.com)\n\n#Web/Summary".to_string()]);
    assert_eq!(review.view(), ReviewView::Empty);
    assert_eq!(review.status().map(|status| status.kind), Some(StatusKind::Success));
}

#[tokio::test]
async fn review_attached_after_missed_push_still_renders_draft() {
    let h = harness();
    h.summarizer.reply("Hello world", "Hi");

    // No review context exists: the Ready push goes nowhere.
    let outcome = h
        .runtime
        .router()
        .coordinator()
        .request_capture(&capture("Hello world", false))
        .await
        .expect("capture should run");
    assert!(matches!(outcome, CaptureOutcome::Completed(_)));

    let review = h.runtime.review().expect("review should attach");
    match review.view() {
        ReviewView::Ready(draft) => assert_eq!(draft.summary.as_deref(), Some("Hi")),
        other => panic!("unexpected view: {other:?}"),
    }
}

#[tokio::test]
async fn image_note_body_is_source_line_and_keeps_attachment() {
    let h = harness();
    let settings = Settings { image_tag: String::new(), ..configured_settings() };
    SettingsStore::save(h.store(), &settings).expect("settings should save");
    let attachment = Attachment {
        name: "image.png".into(),
        remote_path: "/api/file/pic.png".into(),
        size: 3,
        mime_type: "image/png".into(),
        original_url: None,
    };

    let outcome = h
        .runtime
        .router()
        .coordinator()
        .finalize(&SaveRequest {
            content: String::new(),
            kind: NoteKind::Image,
            url: Some("https://img".into()),
            title: Some("Pic".into()),
            attachments: vec![attachment.clone()],
        })
        .await;

    assert!(outcome.success);
    assert_eq!(h.notes.saved(), vec![("> Source: [Pic](https://img)".to_string(), vec![attachment])]);
}

#[tokio::test]
async fn failed_save_keeps_draft_for_retry() {
    let h = harness();
    let review = h.runtime.review().expect("review should attach");
    review.request_capture(capture("Raw text", true)).await;
    assert!(matches!(review.wait_until_settled(WAIT).await.unwrap(), ReviewView::Ready(_)));

    h.notes.set_failing(true);
    let failed = review.save("Edited text").await;
    assert_eq!(failed.error.as_deref(), Some("request failed: 500 Internal Server Error"));
    assert!(matches!(review.view(), ReviewView::Ready(_)));
    assert_eq!(review.status().map(|status| status.kind), Some(StatusKind::Error));

    h.notes.set_failing(false);
    let saved = review.save("Edited text").await;
    assert!(saved.success);
    assert_eq!(h.notes.bodies(), vec!["Edited text\n\nOriginal link: [X](https://x.com)\n\n#Web/Clip".to_string()]);
    assert!(DraftStore::load(h.store()).unwrap().is_none());
}

#[tokio::test]
async fn empty_edit_is_rejected_before_any_message() {
    let h = harness();
    let review = h.runtime.review().expect("review should attach");
    review.request_capture(capture("Raw text", true)).await;
    review.wait_until_settled(WAIT).await.unwrap();

    let outcome = review.save("  \n ").await;
    assert_eq!(outcome.error, Some(CaptureError::empty_content().to_string()));
    assert!(h.notes.bodies().is_empty());
    assert!(matches!(review.view(), ReviewView::Ready(_)));
}

#[tokio::test]
async fn failed_summary_is_inspectable() {
    let h = harness();
    h.summarizer.fail("Hello", CaptureError::transport(Some(401), "Invalid API key"));
    let review = h.runtime.review().expect("review should attach");

    review.request_capture(capture("Hello", false)).await;
    match review.wait_until_settled(WAIT).await.unwrap() {
        ReviewView::Failed(draft) => {
            assert_eq!(draft.error.as_deref(), Some("request failed: 401 Invalid API key"));
        }
        other => panic!("unexpected view: {other:?}"),
    }
    assert!(h.notifier.titles().contains(&"Summary Failed".to_string()));
}

#[tokio::test]
async fn cancel_discards_pending_draft_and_late_result_is_dropped() {
    let h = harness();
    let open = h.summarizer.gate("Slow page");
    let coordinator = h.runtime.router().coordinator().clone();
    let task = tokio::spawn(async move { coordinator.request_capture(&capture("Slow page", false)).await });
    h.summarizer.wait_started(1).await;

    let review = h.runtime.review().expect("review should attach");
    assert!(review.view().is_loading());
    review.cancel().await.expect("cancel should succeed");
    assert_eq!(review.view(), ReviewView::Empty);

    open.send(()).expect("gate should be waiting");
    let outcome = task.await.expect("task should join").expect("capture should run");
    assert!(matches!(outcome, CaptureOutcome::Superseded { .. }));
    assert!(DraftStore::load(h.store()).unwrap().is_none());
}

#[tokio::test]
async fn save_without_background_reports_no_response_and_keeps_draft() {
    let store = KvStore::open_in_memory().unwrap();
    SettingsStore::save(&store, &configured_settings()).unwrap();
    DraftStore::begin(&store, |revision| {
        WorkflowDraft::pending(revision, None, None, true, Utc::now()).into_ready("text".into(), Utc::now())
    })
    .unwrap();

    let bus = MessageBus::new();
    let h = harness();
    let collab: Collaborators = h.runtime.collaborators().clone();
    let review = ReviewSession::attach(&bus, store.clone(), &collab, Arc::new(BlobCache::new()), Duration::from_secs(900))
        .expect("review should attach");

    let outcome = review.save("text").await;
    assert_eq!(outcome.error.as_deref(), Some("no response from background"));
    assert_eq!(DraftStore::load(&store).unwrap().status, DraftStatus::Ready);
}

#[tokio::test]
async fn restart_marks_orphaned_pending_draft_failed() {
    let store = KvStore::open_in_memory().unwrap();
    DraftStore::begin(&store, |revision| WorkflowDraft::pending(revision, None, None, false, Utc::now())).unwrap();

    let h = harness_with_store(store);
    let review = h.runtime.review().expect("review should attach");
    match review.view() {
        ReviewView::Failed(draft) => assert_eq!(draft.error.as_deref(), Some(INTERRUPTED_MESSAGE)),
        other => panic!("unexpected view: {other:?}"),
    }
}

#[tokio::test]
async fn second_runtime_over_same_file_leaves_live_capture_alone() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("clipnote.db");
    let first = harness_with_store(KvStore::open(&path).expect("first store should open"));
    let open = first.summarizer.gate("Long article");
    first.summarizer.reply("Long article", "Short");
    let coordinator = first.runtime.router().coordinator().clone();
    let task = tokio::spawn(async move { coordinator.request_capture(&capture("Long article", false)).await });
    first.summarizer.wait_started(1).await;

    let second = harness_with_store(KvStore::open(&path).expect("second store should open"));
    let watching = second.runtime.review().expect("review should attach");
    assert!(watching.view().is_loading(), "live capture should still be loading: {:?}", watching.view());
    assert!(DraftStore::load(second.store()).unwrap().lease_until.is_some());

    open.send(()).expect("gate should be waiting");
    let outcome = task.await.expect("task should join").expect("capture should run");
    assert!(matches!(outcome, CaptureOutcome::Completed(_)), "unexpected outcome: {outcome:?}");

    let owner = first.runtime.review().expect("review should attach");
    for review in [&owner, &watching] {
        match review.wait_until_settled(WAIT).await.unwrap() {
            ReviewView::Ready(draft) => assert_eq!(draft.summary.as_deref(), Some("Short")),
            other => panic!("unexpected view: {other:?}"),
        }
    }
}

#[tokio::test]
async fn cancel_keeps_capture_accepted_while_clearing() {
    let store = KvStore::open_in_memory().unwrap();
    DraftStore::begin(&store, |revision| {
        WorkflowDraft::pending(revision, None, None, true, Utc::now()).into_ready("old".into(), Utc::now())
    })
    .unwrap();

    // A background that clears and then immediately accepts a new capture
    // before it answers.
    let bus = MessageBus::new();
    let background = bus.attach(ContextId::Background).expect("background should attach");
    let racing = store.clone();
    background
        .subscribe(
            |message| matches!(message, Message::Background(ToBackground::ClearSummary)),
            move |mut envelope: Envelope| {
                let store = racing.clone();
                async move {
                    DraftStore::clear(&store).unwrap();
                    DraftStore::begin(&store, |revision| {
                        WorkflowDraft::pending(revision, None, None, false, Utc::now())
                    })
                    .unwrap();
                    envelope.respond(Reply::Processing);
                }
            },
        )
        .expect("listener should register");

    let h = harness();
    let collab: Collaborators = h.runtime.collaborators().clone();
    let review = ReviewSession::attach(&bus, store.clone(), &collab, Arc::new(BlobCache::new()), Duration::from_secs(900))
        .expect("review should attach");

    review.cancel().await.expect("cancel should succeed");
    let current = DraftStore::load(&store).unwrap();
    assert_eq!(current.revision, 2);
    assert_eq!(current.status, DraftStatus::Pending);
}

#[tokio::test]
async fn save_after_newer_capture_keeps_the_newer_draft() {
    let h = harness();
    let review = h.runtime.review().expect("review should attach");
    review.request_capture(capture("First", true)).await;
    review.wait_until_settled(WAIT).await.unwrap();

    // A second capture lands after the first was loaded into the editor.
    let open = h.summarizer.gate("Second");
    let coordinator = h.runtime.router().coordinator().clone();
    let first = DraftStore::load(h.store()).unwrap();
    let task = tokio::spawn(async move { coordinator.request_capture(&capture("Second", false)).await });
    h.summarizer.wait_started(1).await;

    // Saving now targets the newer draft, which is still pending.
    let outcome = review.save("First edited").await;
    assert_eq!(outcome.error, Some(CaptureError::ValidationError("No finished capture to save".into()).to_string()));

    open.send(()).unwrap();
    task.await.unwrap().unwrap();
    let current = DraftStore::load(h.store()).unwrap();
    assert_eq!(current.revision, first.revision + 1);
    assert_eq!(current.summary.as_deref(), Some("summary of Second"));
}
