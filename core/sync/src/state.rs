//! Last-synced state tracking and persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

use vaultsync_common::{Error, Result, SyncPath, Timestamp};

/// Per-path record of the modification time both replicas shared at the end
/// of the last successful reconciliation of that path.
///
/// Serialized as a flat JSON object mapping paths to integer milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    entries: HashMap<String, Timestamp>,
}

impl SyncState {
    /// Create a new empty sync state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the last-synced timestamp for a path.
    pub fn get(&self, path: &SyncPath) -> Option<Timestamp> {
        self.entries.get(&path.as_relative()).copied()
    }

    /// Record that both replicas held `timestamp` for `path`.
    pub fn set(&mut self, path: &SyncPath, timestamp: Timestamp) {
        self.entries.insert(path.as_relative(), timestamp);
    }

    /// Forget a path.
    pub fn remove(&mut self, path: &SyncPath) -> Option<Timestamp> {
        self.entries.remove(&path.as_relative())
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no path is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get all tracked paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Durable storage for [`SyncState`].
///
/// The engine loads once at the start of a pass and saves once after every
/// dispatched action has settled.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted state. A store that was never saved yields an
    /// empty state.
    async fn load(&self) -> Result<SyncState>;

    /// Persist the state, replacing what was stored before.
    async fn save(&self, state: &SyncState) -> Result<()>;
}

/// State store backed by a JSON file.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Create a store persisting to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The file this store writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<SyncState> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => SyncState::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", self.path.display());
                Ok(SyncState::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Sibling temp file, then rename over the target
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, state.to_json()?).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Saved {} sync entries to {}", state.len(), self.path.display());
        Ok(())
    }
}

/// In-memory state store for testing.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<SyncState>,
    saves: Mutex<usize>,
    fail_saves: bool,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `state`.
    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Create a store whose saves always fail.
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// The currently stored state.
    pub fn snapshot(&self) -> SyncState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// How many times `save` succeeded.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<SyncState> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        if self.fail_saves {
            return Err(Error::Io(std::io::Error::other("state store unavailable")));
        }
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(s: &str) -> SyncPath {
        SyncPath::parse(s).unwrap()
    }

    #[test]
    fn test_get_set_remove() {
        let mut state = SyncState::new();
        assert!(state.get(&p("a.md")).is_none());

        state.set(&p("a.md"), Timestamp::from_millis(100));
        assert_eq!(state.get(&p("a.md")), Some(Timestamp::from_millis(100)));
        assert_eq!(state.get(&p("/a.md")), Some(Timestamp::from_millis(100)));

        assert_eq!(state.remove(&p("a.md")), Some(Timestamp::from_millis(100)));
        assert!(state.is_empty());
    }

    #[test]
    fn test_state_json_layout() {
        let mut state = SyncState::new();
        state.set(&p("notes/a.md"), Timestamp::from_millis(1_700_000_000_000));

        let json = state.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!({ "notes/a.md": 1_700_000_000_000i64 }));
    }

    #[test]
    fn test_state_serialization_round_trip() {
        let mut state = SyncState::new();
        state.set(&p("a.md"), Timestamp::from_millis(1));
        state.set(&p("dir/b.md"), Timestamp::from_millis(-5));
        state.set(&p("dir/c.md"), Timestamp::from_millis(i64::MAX));

        let restored = SyncState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.paths(), vec!["a.md", "dir/b.md", "dir/c.md"]);
    }

    #[tokio::test]
    async fn test_json_store_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path().join("state.json"));

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path().join("nested/state.json"));

        let mut state = SyncState::new();
        state.set(&p("a.md"), Timestamp::from_millis(100));
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), state);
        assert!(!temp.path().join("nested/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_store_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = JsonStateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_memory_store_counts_saves() {
        let store = MemoryStateStore::new();
        store.save(&SyncState::new()).await.unwrap();
        store.save(&SyncState::new()).await.unwrap();
        assert_eq!(store.save_count(), 2);

        assert!(MemoryStateStore::failing().save(&SyncState::new()).await.is_err());
    }
}
