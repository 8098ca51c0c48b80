// In-process session: each command opens the store, starts the background
// context and drives its work to completion before exiting.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clipnote_daemon::config::ClipnoteConfig;
use clipnote_daemon::runtime::Runtime;
use tracing::debug;

/// Slack on top of the HTTP timeout when waiting for a capture to settle.
const SETTLE_GRACE: Duration = Duration::from_secs(5);

pub struct Session {
    config: ClipnoteConfig,
}

impl Session {
    pub fn load(data_dir: Option<PathBuf>) -> Self {
        let mut config = ClipnoteConfig::load();
        if data_dir.is_some() {
            config.data_dir = data_dir;
        }
        Self { config }
    }

    pub fn from_config(config: ClipnoteConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClipnoteConfig {
        &self.config
    }

    /// How long a command waits for the background to finish a capture.
    pub fn settle_timeout(&self) -> Duration {
        self.config.http_timeout() + SETTLE_GRACE
    }

    /// Open the runtime inside a fresh tokio runtime and run `f` on it.
    pub fn run<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Runtime) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let tokio = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;
        let config = self.config.clone();
        debug!(data_dir = ?config.resolved_data_dir(), "opening runtime");
        tokio.block_on(async move {
            let runtime = Runtime::open(config)?;
            f(runtime).await
        })
    }
}
