// Settings persistence: full-snapshot reads and writes under `settings`.

use anyhow::Result;
use clipnote_common::protocol::keys::{self, StorageArea};
use clipnote_common::protocol::messages::ToTab;
use clipnote_common::settings::Settings;
use tracing::info;

use crate::bus::ContextSender;
use crate::store::KvStore;

/// Stateless accessor for the settings record.
pub struct SettingsStore;

impl SettingsStore {
    /// Current settings, with defaults for anything missing.
    pub fn load(store: &KvStore) -> Result<Settings> {
        let settings: Option<Settings> = store.get(StorageArea::Sync, keys::SETTINGS)?;
        Ok(settings.unwrap_or_default().normalized())
    }

    pub fn save(store: &KvStore, settings: &Settings) -> Result<Settings> {
        let settings = settings.clone().normalized();
        store.set(StorageArea::Sync, keys::SETTINGS, &settings)?;
        info!("settings saved");
        Ok(settings)
    }

    /// Save and tell every capture context whether the floating ball is on.
    pub fn save_and_broadcast(
        store: &KvStore,
        sender: &ContextSender,
        settings: &Settings,
    ) -> Result<Settings> {
        let saved = Self::save(store, settings)?;
        sender.broadcast_to_tabs(ToTab::UpdateFloatingBallState {
            enabled: Some(saved.enable_floating_ball),
            success: None,
            error: None,
        });
        Ok(saved)
    }

    /// Drop the stored record so every field reads as its default.
    pub fn reset(store: &KvStore) -> Result<Settings> {
        store.remove(StorageArea::Sync, keys::SETTINGS)?;
        info!("settings reset to defaults");
        Ok(Settings::default())
    }
}
