//! Replica capability traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use vaultsync_common::{Result, SyncPath, Timestamp};

/// A file reported by a local listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the local root.
    pub path: SyncPath,
    /// Last modification time.
    pub modified: Timestamp,
}

/// An item reported by a recursive remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Path relative to the listed root. Backends may prefix it with `/`.
    pub path: String,
    /// Last modification time.
    pub modified: Timestamp,
    /// Whether this item is a directory.
    pub is_directory: bool,
}

/// Metadata for a single file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Last modification time.
    pub modified: Timestamp,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
    /// Whether this is a directory.
    pub is_directory: bool,
}

/// Backend-specific identifier of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a backend identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The local working copy.
///
/// Paths are relative to the local root.
#[async_trait]
pub trait LocalTree: Send + Sync {
    /// Get the backend name (e.g., "fs", "memory").
    fn name(&self) -> &str;

    /// List every file in the tree, recursively. Directories are not listed.
    async fn list_files(&self) -> Result<Vec<FileEntry>>;

    /// Get metadata for a path.
    ///
    /// # Errors
    /// - Path not found
    async fn stat(&self, path: &SyncPath) -> Result<FileStat>;

    /// Read the complete content of a file.
    async fn read(&self, path: &SyncPath) -> Result<Vec<u8>>;

    /// Create or overwrite a file and set its modification time.
    ///
    /// # Preconditions
    /// - Parent directory must exist
    ///
    /// # Postconditions
    /// - A subsequent `stat` reports `modified` exactly
    async fn write(&self, path: &SyncPath, data: Vec<u8>, modified: Timestamp) -> Result<()>;

    /// Delete a file.
    async fn delete(&self, path: &SyncPath) -> Result<()>;

    /// Create a directory and any missing parents. Existing directories are
    /// left untouched.
    async fn ensure_folder(&self, path: &SyncPath) -> Result<()>;

    /// Check if a path exists.
    async fn exists(&self, path: &SyncPath) -> Result<bool>;
}

/// The remote replica.
///
/// Paths are absolute within the remote store; callers join the configured
/// remote root onto replica-relative paths before calling.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// Get the backend name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Resolve a directory path to its identifier.
    ///
    /// Returns `None` when nothing exists at `path` or it is not a directory.
    async fn resolve_root(&self, path: &SyncPath) -> Result<Option<RemoteId>>;

    /// List everything below a directory, recursively.
    async fn list_recursive(&self, root: &RemoteId) -> Result<Vec<RemoteEntry>>;

    /// Get metadata for a path.
    async fn stat(&self, path: &SyncPath) -> Result<FileStat>;

    /// Read the complete content of a file.
    async fn read(&self, path: &SyncPath) -> Result<Vec<u8>>;

    /// Create or overwrite `name` inside the directory `parent`, recording
    /// `modified` as its modification time.
    async fn write(
        &self,
        parent: &RemoteId,
        name: &str,
        data: Vec<u8>,
        modified: Timestamp,
    ) -> Result<()>;

    /// Delete a file.
    async fn delete(&self, path: &SyncPath) -> Result<()>;

    /// Create a directory and any missing parents, returning its identifier.
    async fn ensure_folder(&self, path: &SyncPath) -> Result<RemoteId>;
}
