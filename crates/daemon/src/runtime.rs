// Runtime assembly: store, bus, collaborators and the background context,
// plus the standalone maintenance loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clipnote_common::types::TabInfo;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::attachments::BlobCache;
use crate::background::BackgroundRouter;
use crate::bus::MessageBus;
use crate::capture_agent::CaptureAgent;
use crate::collab::{Collaborators, ContentExtractor, ReaderExtractor};
use crate::config::ClipnoteConfig;
use crate::review::ReviewSession;
use crate::startup::{claim_pid_file, remove_pid_file, DataPaths};
use crate::store::{DraftStore, KvStore};

/// Every context of one process, sharing one bus and one store.
pub struct Runtime {
    config: ClipnoteConfig,
    bus: MessageBus,
    store: KvStore,
    collab: Collaborators,
    cache: Arc<BlobCache>,
    router: BackgroundRouter,
}

impl Runtime {
    /// Open the on-disk store and wire HTTP collaborators.
    pub fn open(config: ClipnoteConfig) -> Result<Self> {
        let paths = DataPaths::resolve(&config)?;
        let store = KvStore::open(&paths.store_path)
            .with_context(|| format!("failed to open store at {}", paths.store_path.display()))?;
        let collab = Collaborators::http(config.http_timeout())?;
        Self::assemble(config, store, collab)
    }

    /// Start the background context over the given parts.
    pub fn assemble(config: ClipnoteConfig, store: KvStore, collab: Collaborators) -> Result<Self> {
        let bus = MessageBus::new();
        let router = BackgroundRouter::start(&bus, store.clone(), collab.clone(), config.stale_after())?;
        Ok(Self { config, bus, store, collab, cache: Arc::new(BlobCache::new()), router })
    }

    pub fn config(&self) -> &ClipnoteConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn router(&self) -> &BackgroundRouter {
        &self.router
    }

    pub fn previews(&self) -> &Arc<BlobCache> {
        &self.cache
    }

    /// Open a review context. Any previous one is replaced.
    pub fn review(&self) -> Result<ReviewSession> {
        ReviewSession::attach(&self.bus, self.store.clone(), &self.collab, self.cache.clone(), self.config.stale_after())
    }

    /// Attach a capture context for `tab`.
    pub fn attach_tab(&self, tab: TabInfo, extractor: Arc<dyn ContentExtractor>) -> Result<CaptureAgent> {
        CaptureAgent::attach(&self.bus, self.store.clone(), tab, extractor)
    }

    /// Page reader with the configured timeout.
    pub fn reader(&self) -> Result<ReaderExtractor> {
        ReaderExtractor::new(self.config.http_timeout())
    }
}

/// How often `clipnoted` looks for drafts whose owner stopped renewing.
const ORPHAN_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Run `clipnoted`: hold the PID file and keep the shared store tidy until
/// Ctrl-C. Captures run in the processes that request them; the daemon
/// only fails drafts whose lease lapsed.
pub async fn run_standalone(config: ClipnoteConfig) -> Result<()> {
    let paths = DataPaths::resolve(&config)?;
    claim_pid_file(&paths.pid_path)?;

    let result = match KvStore::open(&paths.store_path) {
        Ok(store) => {
            info!(store = %paths.store_path.display(), "standalone daemon started");
            let shutdown = async {
                tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
                info!("shutdown requested");
                Ok::<(), anyhow::Error>(())
            };
            maintain_store(store, ORPHAN_SWEEP_INTERVAL, shutdown).await
        }
        Err(error) => Err(error),
    };
    remove_pid_file(&paths.pid_path);
    result.context("standalone daemon exited with error")
}

/// Sweep orphaned drafts every `every` and log storage changes until
/// `shutdown` resolves.
pub async fn maintain_store(
    store: KvStore,
    every: Duration,
    shutdown: impl Future<Output = Result<()>>,
) -> Result<()> {
    let mut changes = store.subscribe();
    let mut sweep = tokio::time::interval(every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => return result,
            _ = sweep.tick() => {
                if let Err(error) = DraftStore::recover_orphaned(&store, Utc::now()) {
                    warn!(error = %error, "orphan sweep failed");
                }
            }
            change = changes.recv() => match change {
                Ok(change) => debug!(area = change.area.as_str(), key = %change.key, removed = change.removed, "storage changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "storage change feed lagged"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}
