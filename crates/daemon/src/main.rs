// clipnoted: standalone mode entry point.

use anyhow::Context;
use clipnote_daemon::config::ClipnoteConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClipnoteConfig::load();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!("starting standalone clipnote daemon");
    clipnote_daemon::runtime::run_standalone(config)
        .await
        .context("standalone daemon terminated unexpectedly")
}
