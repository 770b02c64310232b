//! Aggregation of the local and remote listings into per-path records.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use vaultsync_common::{Error, Result, SyncPath, Timestamp};
use vaultsync_storage::{FileEntry, LocalTree, RemoteEntry, RemoteTree};

use crate::classify::{classify, Decision};
use crate::state::SyncState;

/// Presence of a path on one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    /// Modification time reported by the listing.
    pub modified: Timestamp,
}

/// Everything known about one path at the start of a pass.
///
/// At least one of `local`/`remote` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub path: SyncPath,
    pub local: Option<Presence>,
    pub remote: Option<Presence>,
    pub last_synced: Option<Timestamp>,
}

impl PathRecord {
    /// Classify this record.
    pub fn decision(&self) -> Decision {
        classify(
            self.local.map(|p| p.modified),
            self.remote.map(|p| p.modified),
            self.last_synced,
        )
    }
}

/// Merge both listings with the sync state into records sorted by path.
///
/// Remote directories are dropped and remote paths lose their leading
/// separator. Remote entries whose path cannot be normalized are skipped.
pub fn merge(local: Vec<FileEntry>, remote: Vec<RemoteEntry>, state: &SyncState) -> Vec<PathRecord> {
    let mut records: BTreeMap<SyncPath, PathRecord> = BTreeMap::new();

    for entry in local {
        records.insert(
            entry.path.clone(),
            PathRecord {
                last_synced: state.get(&entry.path),
                path: entry.path,
                local: Some(Presence {
                    modified: entry.modified,
                }),
                remote: None,
            },
        );
    }

    for entry in remote {
        if entry.is_directory {
            continue;
        }
        let path = match SyncPath::parse(&entry.path) {
            Ok(path) if !path.is_root() => path,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping remote entry {:?}: {}", entry.path, e);
                continue;
            }
        };

        let presence = Some(Presence {
            modified: entry.modified,
        });
        records
            .entry(path.clone())
            .and_modify(|record| record.remote = presence)
            .or_insert_with(|| PathRecord {
                last_synced: state.get(&path),
                path,
                local: None,
                remote: presence,
            });
    }

    records.into_values().collect()
}

/// Reads both replicas and produces the unified record set.
pub struct TreeAggregator {
    local: Arc<dyn LocalTree>,
    remote: Arc<dyn RemoteTree>,
    remote_root: SyncPath,
}

impl TreeAggregator {
    /// Create an aggregator listing `remote_root` on the remote replica.
    pub fn new(local: Arc<dyn LocalTree>, remote: Arc<dyn RemoteTree>, remote_root: SyncPath) -> Self {
        Self {
            local,
            remote,
            remote_root,
        }
    }

    /// List both replicas and merge them with `state`.
    ///
    /// # Errors
    /// - `RootNotFound` if the remote root is missing or not a directory
    /// - `LocalIo`/`RemoteIo` if a listing fails
    pub async fn aggregate(&self, state: &SyncState) -> Result<Vec<PathRecord>> {
        let root_id = self
            .remote
            .resolve_root(&self.remote_root)
            .await
            .map_err(|e| Error::RemoteIo(format!("resolve {}: {}", self.remote_root, e)))?
            .ok_or_else(|| Error::RootNotFound(self.remote_root.to_string()))?;

        let local = self
            .local
            .list_files()
            .await
            .map_err(|e| Error::LocalIo(format!("list files: {}", e)))?;
        let remote = self
            .remote
            .list_recursive(&root_id)
            .await
            .map_err(|e| Error::RemoteIo(format!("list {}: {}", self.remote_root, e)))?;

        debug!(
            "Listed {} local files and {} remote items under {}",
            local.len(),
            remote.len(),
            self.remote_root
        );

        Ok(merge(local, remote, state))
    }
}
