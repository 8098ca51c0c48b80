// Pending attachment batches and their context-owned preview handles.
//
// A batch is persisted as plain `Attachment` metadata under one storage key.
// Preview handles live only in the `PreviewCache` of the context that built
// them; they are rebuilt from `original_url` after a reattach and released
// whenever their entry leaves the batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clipnote_common::error::CaptureError;
use clipnote_common::protocol::keys::StorageArea;
use clipnote_common::settings::Settings;
use clipnote_common::types::Attachment;
use tracing::{debug, warn};

use crate::collab::{blinko, Blob, BlobFetcher, FileStore, PreviewCache, PreviewHandle};
use crate::store::{KvStore, Write};

/// Append already-uploaded metadata to the batch under `key`.
pub fn append_to_batch(store: &KvStore, key: &str, attachment: Attachment) -> Result<usize> {
    store.update(StorageArea::Local, key, |current: Option<Vec<Attachment>>| {
        let mut batch = current.unwrap_or_default();
        batch.push(attachment);
        let len = batch.len();
        (Write::Set(batch), len)
    })
}

/// URL the note server serves an uploaded file from; the fallback preview
/// when no local handle exists.
pub fn remote_preview_url(settings: &Settings, attachment: &Attachment) -> String {
    let base = blinko::file_base(settings);
    if attachment.remote_path.starts_with('/') {
        format!("{base}{}", attachment.remote_path)
    } else {
        format!("{base}/{}", attachment.remote_path)
    }
}

/// An attachment together with this context's preview of it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub attachment: Attachment,
    pub preview: Option<PreviewHandle>,
}

pub struct AttachmentLedger {
    store: KvStore,
    key: &'static str,
    file_store: Arc<dyn FileStore>,
    fetcher: Arc<dyn BlobFetcher>,
    cache: Arc<dyn PreviewCache>,
    /// remote path → handle, for entries this context has previewed.
    previews: Mutex<HashMap<String, PreviewHandle>>,
}

impl AttachmentLedger {
    pub fn new(
        store: KvStore,
        key: &'static str,
        file_store: Arc<dyn FileStore>,
        fetcher: Arc<dyn BlobFetcher>,
        cache: Arc<dyn PreviewCache>,
    ) -> Self {
        Self { store, key, file_store, fetcher, cache, previews: Mutex::new(HashMap::new()) }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The persisted batch, without previews.
    pub fn batch(&self) -> Result<Vec<Attachment>> {
        Ok(self.store.get(StorageArea::Local, self.key)?.unwrap_or_default())
    }

    /// Upload `blob` and append its metadata (with `original_url`) to the batch.
    pub async fn add(
        &self,
        file_name: &str,
        blob: Blob,
        original_url: Option<String>,
        settings: &Settings,
    ) -> Result<Attachment, CaptureError> {
        let mut uploaded = self.file_store.upload_file(file_name, blob, settings).await?;
        uploaded.original_url = original_url;
        append_to_batch(&self.store, self.key, uploaded.clone()).map_err(|error| {
            CaptureError::ValidationError(format!("failed to record attachment: {error}"))
        })?;
        debug!(key = self.key, path = %uploaded.remote_path, "attachment added");
        Ok(uploaded)
    }

    /// Read the batch and make sure every entry with an `original_url` has
    /// a preview.
    pub async fn load(&self) -> Result<Vec<LedgerEntry>> {
        let batch = self.batch()?;
        Ok(self.materialize_previews(batch).await)
    }

    /// Create missing previews. Entries whose source cannot be fetched keep
    /// `preview: None`. Handles for entries no longer in `batch` are
    /// released. An empty batch touches no network.
    pub async fn materialize_previews(&self, batch: Vec<Attachment>) -> Vec<LedgerEntry> {
        self.release_missing(&batch);

        let mut entries = Vec::with_capacity(batch.len());
        for attachment in batch {
            let preview = match self.existing_preview(&attachment.remote_path) {
                Some(handle) => Some(handle),
                None => self.create_preview(&attachment).await,
            };
            entries.push(LedgerEntry { attachment, preview });
        }
        entries
    }

    /// Remove the entry at `index`, releasing its preview first.
    pub fn remove(&self, index: usize) -> Result<Option<Attachment>> {
        let removed = self.store.update(StorageArea::Local, self.key, |current: Option<Vec<Attachment>>| {
            let mut batch = current.unwrap_or_default();
            if index >= batch.len() {
                return (Write::Keep, None);
            }
            let removed = batch.remove(index);
            let remaining = batch.iter().any(|entry| entry.remote_path == removed.remote_path);
            let write = if batch.is_empty() { Write::Remove } else { Write::Set(batch) };
            (write, Some((removed, remaining)))
        })?;

        Ok(removed.map(|(attachment, still_referenced)| {
            if !still_referenced {
                self.release_path(&attachment.remote_path);
            }
            attachment
        }))
    }

    /// Release every preview and drop the batch.
    pub fn clear(&self) -> Result<()> {
        self.release_all();
        self.store.remove(StorageArea::Local, self.key)
    }

    /// Release every preview this context holds, leaving storage alone.
    pub fn release_all(&self) {
        let handles: Vec<PreviewHandle> = match self.previews.lock() {
            Ok(mut previews) => previews.drain().map(|(_, handle)| handle).collect(),
            Err(_) => return,
        };
        for handle in &handles {
            self.cache.release(handle);
        }
    }

    pub fn preview_count(&self) -> usize {
        self.previews.lock().map(|previews| previews.len()).unwrap_or(0)
    }

    fn existing_preview(&self, remote_path: &str) -> Option<PreviewHandle> {
        self.previews.lock().ok()?.get(remote_path).cloned()
    }

    async fn create_preview(&self, attachment: &Attachment) -> Option<PreviewHandle> {
        let source = attachment.original_url.as_deref()?;
        match self.fetcher.fetch(source).await {
            Ok(blob) => {
                let handle = self.cache.create(blob);
                let displaced = match self.previews.lock() {
                    Ok(mut previews) => previews.insert(attachment.remote_path.clone(), handle.clone()),
                    Err(_) => {
                        self.cache.release(&handle);
                        return None;
                    }
                };
                // A concurrent pass may have built one for the same entry.
                if let Some(displaced) = displaced {
                    self.cache.release(&displaced);
                }
                Some(handle)
            }
            Err(error) => {
                warn!(source, error = %error, "failed to build attachment preview");
                None
            }
        }
    }

    fn release_missing(&self, batch: &[Attachment]) {
        let stale: Vec<PreviewHandle> = match self.previews.lock() {
            Ok(mut previews) => {
                let gone: Vec<String> = previews
                    .keys()
                    .filter(|path| !batch.iter().any(|entry| &entry.remote_path == *path))
                    .cloned()
                    .collect();
                gone.iter().filter_map(|path| previews.remove(path)).collect()
            }
            Err(_) => return,
        };
        for handle in &stale {
            self.cache.release(handle);
        }
    }

    fn release_path(&self, remote_path: &str) {
        let handle = self.previews.lock().ok().and_then(|mut previews| previews.remove(remote_path));
        if let Some(handle) = handle {
            self.cache.release(&handle);
        }
    }
}

impl Drop for AttachmentLedger {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// In-memory `PreviewCache`. Tracks live handles so leaks are observable.
#[derive(Debug, Default)]
pub struct BlobCache {
    next: AtomicU64,
    live: Mutex<HashMap<PreviewHandle, Blob>>,
}

impl BlobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn get(&self, handle: &PreviewHandle) -> Option<Blob> {
        self.live.lock().ok()?.get(handle).cloned()
    }
}

impl PreviewCache for BlobCache {
    fn create(&self, blob: Blob) -> PreviewHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = PreviewHandle(format!("blob:clipnote/{id}"));
        if let Ok(mut live) = self.live.lock() {
            live.insert(handle.clone(), blob);
        }
        handle
    }

    fn release(&self, handle: &PreviewHandle) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(handle);
        }
    }
}
