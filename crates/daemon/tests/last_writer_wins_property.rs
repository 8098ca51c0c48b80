mod support;

use clipnote_common::types::DraftStatus;
use clipnote_daemon::coordinator::CaptureOutcome;
use clipnote_daemon::store::DraftStore;
use proptest::prelude::*;
use support::{capture, harness};

#[tokio::test]
async fn later_request_wins_when_earlier_finishes_last() {
    let h = harness();
    let coordinator = h.runtime.router().coordinator().clone();

    let open_first = h.summarizer.gate("first");
    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_capture(&capture("first", false)).await })
    };
    h.summarizer.wait_started(1).await;

    let open_second = h.summarizer.gate("second");
    let second = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_capture(&capture("second", false)).await })
    };
    h.summarizer.wait_started(2).await;

    open_second.send(()).unwrap();
    let second = second.await.unwrap().unwrap();
    open_first.send(()).unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first, CaptureOutcome::Superseded { revision: 1 });
    assert!(matches!(second, CaptureOutcome::Completed(ref draft) if draft.revision == 2));
    let stored = DraftStore::load(h.store()).unwrap();
    assert_eq!(stored.summary.as_deref(), Some("summary of second"));
}

#[tokio::test]
async fn later_request_wins_when_earlier_finishes_first() {
    let h = harness();
    let coordinator = h.runtime.router().coordinator().clone();

    let open_first = h.summarizer.gate("first");
    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_capture(&capture("first", false)).await })
    };
    h.summarizer.wait_started(1).await;
    let open_second = h.summarizer.gate("second");
    let second = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_capture(&capture("second", false)).await })
    };
    h.summarizer.wait_started(2).await;

    open_first.send(()).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), CaptureOutcome::Superseded { revision: 1 });
    // The superseded result never becomes readable, even briefly.
    assert_eq!(DraftStore::load(h.store()).unwrap().status, DraftStatus::Pending);

    open_second.send(()).unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(DraftStore::load(h.store()).unwrap().summary.as_deref(), Some("summary of second"));
}

fn release_orders() -> impl Strategy<Value = Vec<usize>> {
    (2usize..6).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn only_the_last_request_is_ever_readable(order in release_orders()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");

        runtime.block_on(async move {
            let h = harness();
            let coordinator = h.runtime.router().coordinator().clone();
            let last = order.len() - 1;

            let mut gates = Vec::new();
            let mut tasks = Vec::new();
            for index in 0..order.len() {
                let content = format!("page {index}");
                gates.push(Some(h.summarizer.gate(&content)));
                let coordinator = coordinator.clone();
                tasks.push(Some(tokio::spawn(async move {
                    coordinator.request_capture(&capture(&content, false)).await
                })));
                h.summarizer.wait_started(index + 1).await;
            }

            for index in order {
                gates[index].take().unwrap().send(()).unwrap();
                let outcome = tasks[index].take().unwrap().await.unwrap().unwrap();

                let stored = DraftStore::load(h.store()).unwrap();
                assert_eq!(stored.revision, (last + 1) as u64);
                if index == last {
                    assert!(matches!(outcome, CaptureOutcome::Completed(_)));
                } else {
                    assert_eq!(outcome, CaptureOutcome::Superseded { revision: (index + 1) as u64 });
                }
                match stored.status {
                    DraftStatus::Pending => assert!(stored.summary.is_none()),
                    DraftStatus::Ready => {
                        assert_eq!(stored.summary, Some(format!("summary of page {last}")));
                    }
                    other => panic!("unexpected status {other:?}"),
                }
            }

            let stored = DraftStore::load(h.store()).unwrap();
            assert_eq!(stored.summary, Some(format!("summary of page {last}")));
        });
    }
}
