//! Conflict resolution.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use vaultsync_common::{Error, Result, SyncPath, Timestamp};

use crate::executor::ActionExecutor;
use crate::interaction::{ConflictChoice, ConflictPrompt};

/// Information about a detected conflict, as handed to the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictInfo {
    /// Path of the conflicted file.
    pub path: SyncPath,
    pub local_modified: Timestamp,
    pub local_size: u64,
    pub remote_modified: Timestamp,
    pub remote_size: u64,
    /// Last-synced timestamp, if the path was ever synchronized.
    pub last_synced: Option<Timestamp>,
}

/// Result of conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionResult {
    /// Local version overwrote the remote one.
    UsedLocal { modified: Timestamp },
    /// Remote version overwrote the local one.
    UsedRemote { modified: Timestamp },
    /// Merged content overwrote both copies.
    Merged { modified: Timestamp },
    /// Nothing was written; the path stays conflicting.
    Skipped,
}

impl ResolutionResult {
    /// Whether both replicas agree after this resolution.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ResolutionResult::Skipped)
    }
}

/// Obtains both versions of a conflicting path, asks the prompt which one
/// wins, and overwrites the losing replica.
pub struct ConflictResolver {
    executor: Arc<ActionExecutor>,
    prompt: Arc<dyn ConflictPrompt>,
}

impl ConflictResolver {
    /// Create a resolver writing through `executor`.
    pub fn new(executor: Arc<ActionExecutor>, prompt: Arc<dyn ConflictPrompt>) -> Self {
        Self { executor, prompt }
    }

    /// Resolve one conflicting path.
    ///
    /// The state entry for `path` changes only after every write the chosen
    /// resolution requires has succeeded.
    ///
    /// # Errors
    /// - `LocalIo`/`RemoteIo` if a version cannot be read or a write fails
    pub async fn resolve(&self, path: &SyncPath, last_synced: Option<Timestamp>) -> Result<ResolutionResult> {
        let remote = self.executor.remote();
        let remote_path = self.executor.remote_path(path);

        let (local_data, local_modified) = self.executor.read_local(path).await?;
        let remote_data = remote
            .read(&remote_path)
            .await
            .map_err(|e| Error::RemoteIo(format!("read {}: {}", path, e)))?;
        let remote_modified = remote
            .stat(&remote_path)
            .await
            .map_err(|e| Error::RemoteIo(format!("stat {}: {}", path, e)))?
            .modified;

        let info = ConflictInfo {
            path: path.clone(),
            local_modified,
            local_size: local_data.len() as u64,
            remote_modified,
            remote_size: remote_data.len() as u64,
            last_synced,
        };
        debug!("Resolving conflict: {:?}", info);

        let choice = self
            .prompt
            .resolve_conflict(path, &local_data, &remote_data)
            .await;

        match choice {
            ConflictChoice::AcceptLocal => {
                info!("Conflict on {}: keeping local version", path);
                self.executor
                    .overwrite_remote(path, local_data, local_modified)
                    .await?;
                self.executor.mark_synced(path, local_modified).await;
                Ok(ResolutionResult::UsedLocal {
                    modified: local_modified,
                })
            }
            ConflictChoice::AcceptRemote => {
                info!("Conflict on {}: keeping remote version", path);
                self.executor
                    .overwrite_local(path, remote_data, remote_modified, true)
                    .await?;
                self.executor.mark_synced(path, remote_modified).await;
                Ok(ResolutionResult::UsedRemote {
                    modified: remote_modified,
                })
            }
            ConflictChoice::Manual(merged) => {
                let modified = Timestamp::now();
                info!("Conflict on {}: writing merged version", path);
                self.executor
                    .overwrite_local(path, merged.clone(), modified, true)
                    .await?;
                self.executor.overwrite_remote(path, merged, modified).await?;
                self.executor.mark_synced(path, modified).await;
                Ok(ResolutionResult::Merged { modified })
            }
            ConflictChoice::Skip => {
                info!("Conflict on {} skipped", path);
                Ok(ResolutionResult::Skipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{AutoConfirm, ConflictStrategy};
    use crate::state::SyncState;
    use async_trait::async_trait;
    use tokio::sync::RwLock;
    use vaultsync_storage::{FileEntry, FileStat, LocalTree, MemoryLocalTree, MemoryRemoteTree};

    fn p(s: &str) -> SyncPath {
        SyncPath::parse(s).unwrap()
    }

    struct MergePrompt;

    #[async_trait]
    impl ConflictPrompt for MergePrompt {
        async fn resolve_conflict(&self, _path: &SyncPath, local: &[u8], remote: &[u8]) -> ConflictChoice {
            let mut merged = local.to_vec();
            merged.extend_from_slice(b"\n");
            merged.extend_from_slice(remote);
            ConflictChoice::Manual(merged)
        }
    }

    /// Local tree whose file is rewritten right after it is read.
    struct EditedDuringRead {
        inner: Arc<MemoryLocalTree>,
    }

    #[async_trait]
    impl LocalTree for EditedDuringRead {
        fn name(&self) -> &str {
            "edited"
        }

        async fn list_files(&self) -> Result<Vec<FileEntry>> {
            self.inner.list_files().await
        }

        async fn stat(&self, path: &SyncPath) -> Result<FileStat> {
            self.inner.stat(path).await
        }

        async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
            let data = self.inner.read(path).await?;
            self.inner
                .write(path, b"EDITED".to_vec(), Timestamp::from_millis(300))
                .await?;
            Ok(data)
        }

        async fn write(&self, path: &SyncPath, data: Vec<u8>, modified: Timestamp) -> Result<()> {
            self.inner.write(path, data, modified).await
        }

        async fn delete(&self, path: &SyncPath) -> Result<()> {
            self.inner.delete(path).await
        }

        async fn ensure_folder(&self, path: &SyncPath) -> Result<()> {
            self.inner.ensure_folder(path).await
        }

        async fn exists(&self, path: &SyncPath) -> Result<bool> {
            self.inner.exists(path).await
        }
    }

    struct Fixture {
        local: Arc<MemoryLocalTree>,
        remote: Arc<MemoryRemoteTree>,
        state: Arc<RwLock<SyncState>>,
    }

    impl Fixture {
        fn new() -> Self {
            let local = Arc::new(MemoryLocalTree::new());
            local.insert_file("a.md", "local", 150);
            let remote = Arc::new(MemoryRemoteTree::new());
            remote.insert_file("Vault/a.md", "remote", 200);

            let mut state = SyncState::new();
            state.set(&p("a.md"), Timestamp::from_millis(100));

            Self {
                local,
                remote,
                state: Arc::new(RwLock::new(state)),
            }
        }

        fn resolver(&self, prompt: Arc<dyn ConflictPrompt>) -> ConflictResolver {
            let executor = ActionExecutor::new(
                self.local.clone(),
                self.remote.clone(),
                p("Vault"),
                self.state.clone(),
                Arc::new(AutoConfirm(false)),
            );
            ConflictResolver::new(Arc::new(executor), prompt)
        }

        async fn last_synced(&self) -> Option<Timestamp> {
            self.state.read().await.get(&p("a.md"))
        }
    }

    #[tokio::test]
    async fn test_accept_local() {
        let fx = Fixture::new();
        let result = fx
            .resolver(Arc::new(ConflictStrategy::PreferLocal))
            .resolve(&p("a.md"), fx.last_synced().await)
            .await
            .unwrap();

        assert_eq!(result, ResolutionResult::UsedLocal { modified: Timestamp::from_millis(150) });
        assert_eq!(
            fx.remote.file("Vault/a.md").unwrap(),
            (b"local".to_vec(), Timestamp::from_millis(150))
        );
        assert_eq!(fx.last_synced().await, Some(Timestamp::from_millis(150)));
    }

    #[tokio::test]
    async fn test_accept_local_rejects_file_edited_while_reading() {
        let fx = Fixture::new();
        let executor = ActionExecutor::new(
            Arc::new(EditedDuringRead { inner: fx.local.clone() }),
            fx.remote.clone(),
            p("Vault"),
            fx.state.clone(),
            Arc::new(AutoConfirm(false)),
        );
        let resolver = ConflictResolver::new(Arc::new(executor), Arc::new(ConflictStrategy::PreferLocal));

        let result = resolver.resolve(&p("a.md"), fx.last_synced().await).await;

        assert!(matches!(result, Err(Error::LocalIo(_))));
        assert_eq!(
            fx.remote.file("Vault/a.md").unwrap(),
            (b"remote".to_vec(), Timestamp::from_millis(200))
        );
        assert_eq!(
            fx.local.file("a.md").unwrap(),
            (b"EDITED".to_vec(), Timestamp::from_millis(300))
        );
        assert_eq!(fx.last_synced().await, Some(Timestamp::from_millis(100)));
    }

    #[tokio::test]
    async fn test_accept_remote() {
        let fx = Fixture::new();
        let result = fx
            .resolver(Arc::new(ConflictStrategy::PreferRemote))
            .resolve(&p("a.md"), None)
            .await
            .unwrap();

        assert_eq!(result, ResolutionResult::UsedRemote { modified: Timestamp::from_millis(200) });
        assert_eq!(
            fx.local.file("a.md").unwrap(),
            (b"remote".to_vec(), Timestamp::from_millis(200))
        );
        assert_eq!(fx.last_synced().await, Some(Timestamp::from_millis(200)));
    }

    #[tokio::test]
    async fn test_manual_overwrites_both() {
        let fx = Fixture::new();
        let before = Timestamp::now();
        let result = fx
            .resolver(Arc::new(MergePrompt))
            .resolve(&p("a.md"), None)
            .await
            .unwrap();

        let ResolutionResult::Merged { modified } = result else {
            panic!("expected a merge, got {:?}", result);
        };
        assert!(modified >= before);

        let (local_data, local_modified) = fx.local.file("a.md").unwrap();
        let (remote_data, remote_modified) = fx.remote.file("Vault/a.md").unwrap();
        assert_eq!(local_data, b"local\nremote");
        assert_eq!(remote_data, local_data);
        assert_eq!(local_modified, modified);
        assert_eq!(remote_modified, modified);
        assert_eq!(fx.last_synced().await, Some(modified));
    }

    #[tokio::test]
    async fn test_skip_changes_nothing() {
        let fx = Fixture::new();
        let result = fx
            .resolver(Arc::new(ConflictStrategy::Skip))
            .resolve(&p("a.md"), None)
            .await
            .unwrap();

        assert!(!result.is_resolved());
        assert_eq!(fx.local.file("a.md").unwrap().0, b"local");
        assert_eq!(fx.remote.file("Vault/a.md").unwrap().0, b"remote");
        assert_eq!(fx.last_synced().await, Some(Timestamp::from_millis(100)));
    }

    #[tokio::test]
    async fn test_partial_manual_write_keeps_state() {
        let fx = Fixture::new();
        fx.remote.fail_writes_on("Vault/a.md");

        let result = fx
            .resolver(Arc::new(MergePrompt))
            .resolve(&p("a.md"), None)
            .await;

        assert!(matches!(result, Err(Error::RemoteIo(_))));
        // Local copy was rewritten, remote was not
        assert_eq!(fx.local.file("a.md").unwrap().0, b"local\nremote");
        assert_eq!(fx.remote.file("Vault/a.md").unwrap().0, b"remote");
        assert_eq!(fx.last_synced().await, Some(Timestamp::from_millis(100)));
    }
}
