//! Persistent CLI settings.
//!
//! One JSON document holds the remote root, the remote backend and the
//! last-synced timestamps. The engine sees the timestamps through
//! [`SettingsStateStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use vaultsync_common::{Error, Result, SyncPath};
use vaultsync_sync::{StateStore, SyncState, DEFAULT_REMOTE_ROOT};

/// Remote backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Backend name in the remote registry (e.g. "local").
    pub provider: String,
    /// Backend-specific configuration.
    pub config: serde_json::Value,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vaultsync")
            .join("remote");
        Self {
            provider: "local".to_string(),
            config: serde_json::json!({ "root": root.to_string_lossy() }),
        }
    }
}

/// Everything the CLI persists between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remote directory mirrored by the local tree.
    pub remote_root: SyncPath,
    pub remote: RemoteSettings,
    pub last_synced_times: SyncState,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_root: SyncPath::parse(DEFAULT_REMOTE_ROOT).unwrap_or_else(|_| SyncPath::root()),
            remote: RemoteSettings::default(),
            last_synced_times: SyncState::new(),
        }
    }
}

impl Settings {
    /// Default settings location under the user's config directory.
    ///
    /// # Errors
    /// - No config directory is known for this platform
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("vaultsync").join("settings.json"))
            .ok_or_else(|| Error::Config("No configuration directory available".to_string()))
    }

    /// Load settings, falling back to defaults if the file is missing.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write settings, replacing the file atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp = path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, path).await?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

/// State store backed by the `last_synced_times` field of the settings file.
///
/// Saving rewrites only that field, keeping whatever else is on disk.
pub struct SettingsStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl StateStore for SettingsStateStore {
    async fn load(&self) -> Result<SyncState> {
        let _guard = self.lock.lock().await;
        Ok(Settings::load(&self.path).await?.last_synced_times)
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut settings = Settings::load(&self.path).await?;
        settings.last_synced_times = state.clone();
        settings.save(&self.path).await
    }
}
