// Startup: data directory layout and the PID file.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ClipnoteConfig;
use crate::security::{ensure_owner_only_dir, open_private_truncate};

/// Store file: <data_dir>/clipnote.db
const STORE_FILE_NAME: &str = "clipnote.db";
/// PID file: <data_dir>/clipnoted.pid, one maintenance daemon per data dir
const PID_FILE_NAME: &str = "clipnoted.pid";

/// Resolved paths for runtime files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub base_dir: PathBuf,
    pub store_path: PathBuf,
    pub pid_path: PathBuf,
}

impl DataPaths {
    /// Resolve paths under the configured data directory, creating it
    /// owner-only.
    pub fn resolve(config: &ClipnoteConfig) -> Result<Self> {
        let base = config.resolved_data_dir().context("could not determine home directory")?;
        Self::under(base)
    }

    pub fn under(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create {}", base_dir.display()))?;
        ensure_owner_only_dir(&base_dir)?;
        Ok(Self {
            store_path: base_dir.join(STORE_FILE_NAME),
            pid_path: base_dir.join(PID_FILE_NAME),
            base_dir,
        })
    }
}

/// Write the current process PID.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let mut file = open_private_truncate(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "failed to remove PID file");
        }
    }
}

/// PID recorded by a running daemon, if any.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Take over the PID file, refusing while another live daemon holds it.
/// A file left by a daemon that did not shut down cleanly is replaced.
pub fn claim_pid_file(path: &Path) -> Result<()> {
    if let Some(pid) = read_pid_file(path) {
        if pid != std::process::id() && process_alive(pid) {
            bail!("clipnoted is already running (pid {pid}, {})", path.display());
        }
        warn!(pid, path = %path.display(), "replacing PID file left by a daemon that did not shut down cleanly");
    }
    write_pid_file(path)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without procfs a leftover file is always taken over.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    false
}
