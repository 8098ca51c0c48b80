// Workflow draft access: revisioned creation, compare-and-set completion,
// conditional clearing, lease renewal and orphan recovery.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clipnote_common::protocol::keys::{self, StorageArea};
use clipnote_common::types::{DraftStatus, WorkflowDraft};
use tracing::{debug, warn};

use super::kv::{KvStore, Write};

pub const INTERRUPTED_MESSAGE: &str = "capture interrupted before completion";

/// Stateless accessor for `currentSummary` and its revision counter.
pub struct DraftStore;

impl DraftStore {
    /// The stored draft, or an empty `None`-status draft.
    pub fn load(store: &KvStore) -> Result<WorkflowDraft> {
        let draft: Option<WorkflowDraft> = store.get(StorageArea::Local, keys::CURRENT_SUMMARY)?;
        Ok(draft.unwrap_or_default())
    }

    /// Allocate the next revision and write the draft `make` builds for it,
    /// replacing whatever was there.
    pub fn begin(store: &KvStore, make: impl FnOnce(u64) -> WorkflowDraft) -> Result<WorkflowDraft> {
        store.transaction(|txn| {
            let last: u64 = txn.get(StorageArea::Local, keys::DRAFT_REVISION)?.unwrap_or(0);
            let revision = last + 1;
            let draft = make(revision);
            txn.set(StorageArea::Local, keys::DRAFT_REVISION, &revision)?;
            txn.set(StorageArea::Local, keys::CURRENT_SUMMARY, &draft)?;
            Ok(draft)
        })
    }

    /// Replace the `Pending` draft with `revision` by `finish(draft)`.
    /// Returns `None` when a newer request (or a clear) got there first.
    pub fn complete(
        store: &KvStore,
        revision: u64,
        finish: impl FnOnce(WorkflowDraft) -> WorkflowDraft,
    ) -> Result<Option<WorkflowDraft>> {
        store.update(StorageArea::Local, keys::CURRENT_SUMMARY, |current: Option<WorkflowDraft>| {
            match current {
                Some(draft) if draft.revision == revision && draft.status == DraftStatus::Pending => {
                    let finished = finish(draft);
                    (Write::Set(finished.clone()), Some(finished))
                }
                _ => (Write::Keep, None),
            }
        })
    }

    pub fn clear(store: &KvStore) -> Result<()> {
        store.remove(StorageArea::Local, keys::CURRENT_SUMMARY)
    }

    /// Clear only if the stored draft is still `revision`.
    pub fn clear_if_revision(store: &KvStore, revision: u64) -> Result<bool> {
        store.update(StorageArea::Local, keys::CURRENT_SUMMARY, |current: Option<WorkflowDraft>| {
            match current {
                Some(draft) if draft.revision == revision => (Write::Remove, true),
                _ => (Write::Keep, false),
            }
        })
    }

    /// Extend the lease of the `Pending` draft with `revision`.
    /// Returns `false` once the draft was completed, cleared or replaced.
    pub fn renew_lease(store: &KvStore, revision: u64, until: DateTime<Utc>) -> Result<bool> {
        store.update(StorageArea::Local, keys::CURRENT_SUMMARY, |current: Option<WorkflowDraft>| {
            match current {
                Some(draft) if draft.revision == revision && draft.status == DraftStatus::Pending => {
                    (Write::Set(draft.leased_until(until)), true)
                }
                _ => (Write::Keep, false),
            }
        })
    }

    /// A `Pending` draft whose lease lapsed belongs to a coordinator that
    /// died mid-flight. Mark it failed so a reader can see what happened.
    /// Drafts still leased by a live process are left alone.
    pub fn recover_orphaned(store: &KvStore, now: DateTime<Utc>) -> Result<Option<WorkflowDraft>> {
        let recovered =
            store.update(StorageArea::Local, keys::CURRENT_SUMMARY, |current: Option<WorkflowDraft>| {
                match current {
                    Some(draft) if draft.lease_expired(now) => {
                        let failed = draft.into_failed(INTERRUPTED_MESSAGE, now);
                        (Write::Set(failed.clone()), Some(failed))
                    }
                    Some(draft) if draft.status == DraftStatus::Pending => {
                        debug!(revision = draft.revision, lease_until = ?draft.lease_until, "pending draft still leased");
                        (Write::Keep, None)
                    }
                    _ => (Write::Keep, None),
                }
            })?;
        if let Some(draft) = &recovered {
            warn!(revision = draft.revision, "recovered orphaned pending draft");
        } else {
            debug!("no orphaned draft to recover");
        }
        Ok(recovered)
    }
}
