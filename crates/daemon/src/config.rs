// Local configuration file for the daemon and CLI.
//
// Global config: `~/.clipnote/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

/// Root directory for Clipnote state: `~/.clipnote/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".clipnote"))
}

/// Path to the global config file: `~/.clipnote/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Runtime configuration at `~/.clipnote/config.toml`.
///
/// User-facing settings (endpoints, credentials, tags) are not here; they
/// live in the store so every context reads the same snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClipnoteConfig {
    /// Directory holding the store (defaults to `~/.clipnote`).
    pub data_dir: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Upper bound on every collaborator HTTP call.
    pub http_timeout_secs: u64,
    /// Age after which a `Pending` draft is shown as stale.
    pub stale_draft_secs: u64,
}

impl Default for ClipnoteConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_filter: "info".into(),
            http_timeout_secs: 120,
            stale_draft_secs: 900,
        }
    }
}

impl ClipnoteConfig {
    /// Load from `~/.clipnote/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.clipnote/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only_dir(parent)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
            ensure_owner_only_file(path)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
        })
    }

    /// Where the store lives: `data_dir`, else `~/.clipnote`.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(global_dir)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_draft_secs)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_defaults() {
        let cfg = ClipnoteConfig::default();
        assert!(cfg.data_dir.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.http_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.stale_after(), Duration::from_secs(900));
    }

    #[test]
    fn config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cfg = ClipnoteConfig {
            data_dir: Some(dir.path().join("data")),
            log_filter: "clipnote_daemon=debug".into(),
            http_timeout_secs: 30,
            stale_draft_secs: 60,
        };
        cfg.save_to(&path).unwrap();
        let loaded = ClipnoteConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let cfg: ClipnoteConfig = toml::from_str("http_timeout_secs = 5").unwrap();
        assert_eq!(cfg.http_timeout_secs, 5);
        assert_eq!(cfg.stale_draft_secs, 900);
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn config_load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ClipnoteConfig::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let cfg = ClipnoteConfig { http_timeout_secs: 0, ..ClipnoteConfig::default() };
        assert_eq!(cfg.http_timeout(), Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        ClipnoteConfig::default().save_to(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
