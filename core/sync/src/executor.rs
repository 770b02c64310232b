//! Side-effecting execution of per-path decisions.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use vaultsync_common::{Error, Result, SyncPath, Timestamp};
use vaultsync_storage::{LocalTree, RemoteTree};

use crate::classify::Decision;
use crate::interaction::{Confirmation, Confirmer, DeleteSide};
use crate::state::SyncState;
use crate::tree::PathRecord;

/// How a dispatched action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Uploaded,
    Downloaded,
    DeletedLocal,
    DeletedRemote,
    /// A deletion prompt was declined or dismissed.
    Declined,
    /// A conflict was resolved and both replicas now agree.
    ConflictResolved,
    /// A conflict prompt was skipped or dismissed.
    ConflictSkipped,
    /// The action failed; its path's state entry was left untouched.
    Failed,
}

fn local_err<'a>(op: &'static str, path: &'a SyncPath) -> impl FnOnce(Error) -> Error + 'a {
    move |e| Error::LocalIo(format!("{} {}: {}", op, path, e))
}

fn remote_err<'a>(op: &'static str, path: &'a SyncPath) -> impl FnOnce(Error) -> Error + 'a {
    move |e| Error::RemoteIo(format!("{} {}: {}", op, path, e))
}

/// Carries out uploads, downloads and deletions against both replicas and
/// records each success in the shared sync state.
///
/// Every method touches exactly one path and mutates only that path's state
/// entry, and only after every replica write for it succeeded.
pub struct ActionExecutor {
    local: Arc<dyn LocalTree>,
    remote: Arc<dyn RemoteTree>,
    remote_root: SyncPath,
    state: Arc<RwLock<SyncState>>,
    confirmer: Arc<dyn Confirmer>,
}

impl ActionExecutor {
    /// Create an executor over both replicas.
    pub fn new(
        local: Arc<dyn LocalTree>,
        remote: Arc<dyn RemoteTree>,
        remote_root: SyncPath,
        state: Arc<RwLock<SyncState>>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            local,
            remote,
            remote_root,
            state,
            confirmer,
        }
    }

    /// Location of `path` in the remote store.
    pub fn remote_path(&self, path: &SyncPath) -> SyncPath {
        self.remote_root.join_path(path)
    }

    pub fn remote(&self) -> &dyn RemoteTree {
        self.remote.as_ref()
    }

    /// Record that both replicas hold `path` at `modified`.
    pub async fn mark_synced(&self, path: &SyncPath, modified: Timestamp) {
        self.state.write().await.set(path, modified);
    }

    /// Run the action for a non-conflicting decision.
    ///
    /// # Errors
    /// - `InvalidInput` for `Nothing` and `Conflict`, which are not executed here
    pub async fn execute(&self, record: &PathRecord, decision: Decision) -> Result<ActionOutcome> {
        let path = &record.path;
        match decision {
            Decision::Upload => {
                self.upload(path).await?;
                Ok(ActionOutcome::Uploaded)
            }
            Decision::Download => {
                self.download(path, record.local.is_some()).await?;
                Ok(ActionOutcome::Downloaded)
            }
            Decision::DeleteLocal => Ok(match self.delete_local(path).await? {
                Confirmation::Accepted => ActionOutcome::DeletedLocal,
                Confirmation::Declined => ActionOutcome::Declined,
            }),
            Decision::DeleteRemote => Ok(match self.delete_remote(path).await? {
                Confirmation::Accepted => ActionOutcome::DeletedRemote,
                Confirmation::Declined => ActionOutcome::Declined,
            }),
            Decision::Nothing | Decision::Conflict(_) => Err(Error::InvalidInput(format!(
                "{} is not an executable decision for {}",
                decision, path
            ))),
        }
    }

    /// Write `data` to the remote copy of `path`, creating parent folders.
    pub async fn overwrite_remote(&self, path: &SyncPath, data: Vec<u8>, modified: Timestamp) -> Result<()> {
        let remote_path = self.remote_path(path);
        let name = remote_path
            .name()
            .ok_or_else(|| Error::InvalidInput("Cannot write the remote root".to_string()))?
            .to_string();
        let parent = remote_path.parent().unwrap_or_else(SyncPath::root);

        let parent_id = self
            .remote
            .ensure_folder(&parent)
            .await
            .map_err(remote_err("create folder for", path))?;
        self.remote
            .write(&parent_id, &name, data, modified)
            .await
            .map_err(remote_err("write", path))
    }

    /// Write `data` to the local copy of `path`. When the file does not exist
    /// yet, missing parent folders are created first.
    pub async fn overwrite_local(
        &self,
        path: &SyncPath,
        data: Vec<u8>,
        modified: Timestamp,
        exists: bool,
    ) -> Result<()> {
        if !exists {
            if let Some(parent) = path.parent() {
                if !parent.is_root() {
                    self.local
                        .ensure_folder(&parent)
                        .await
                        .map_err(local_err("create folder for", path))?;
                }
            }
        }
        self.local
            .write(path, data, modified)
            .await
            .map_err(local_err("write", path))
    }

    /// Read the local file together with the modification time its content
    /// belongs to.
    ///
    /// # Errors
    /// - `LocalIo` if the file changes while it is being read; the next pass
    ///   picks up the new version
    pub async fn read_local(&self, path: &SyncPath) -> Result<(Vec<u8>, Timestamp)> {
        let before = self
            .local
            .stat(path)
            .await
            .map_err(local_err("stat", path))?
            .modified;
        let data = self.local.read(path).await.map_err(local_err("read", path))?;
        let after = self
            .local
            .stat(path)
            .await
            .map_err(local_err("stat", path))?
            .modified;

        if before != after {
            return Err(Error::LocalIo(format!(
                "{} changed while reading ({} -> {})",
                path, before, after
            )));
        }
        Ok((data, before))
    }

    /// Copy the local file to the remote replica.
    ///
    /// On success the state records the local modification time.
    pub async fn upload(&self, path: &SyncPath) -> Result<Timestamp> {
        info!("Uploading {}", path);

        let (data, modified) = self.read_local(path).await?;

        self.overwrite_remote(path, data, modified).await?;
        self.mark_synced(path, modified).await;

        debug!("Uploaded {} at {}", path, modified);
        Ok(modified)
    }

    /// Copy the remote file to the local replica.
    ///
    /// On success the state records the remote modification time.
    pub async fn download(&self, path: &SyncPath, local_exists: bool) -> Result<Timestamp> {
        info!("Downloading {}", path);

        let remote_path = self.remote_path(path);
        let modified = self
            .remote
            .stat(&remote_path)
            .await
            .map_err(remote_err("stat", path))?
            .modified;
        let data = self
            .remote
            .read(&remote_path)
            .await
            .map_err(remote_err("read", path))?;

        self.overwrite_local(path, data, modified, local_exists).await?;
        self.mark_synced(path, modified).await;

        debug!("Downloaded {} at {}", path, modified);
        Ok(modified)
    }

    /// Delete the local file after confirmation.
    ///
    /// A declined prompt leaves the file and the state untouched.
    pub async fn delete_local(&self, path: &SyncPath) -> Result<Confirmation> {
        if self.confirmer.confirm_delete(path, DeleteSide::Local).await == Confirmation::Declined {
            info!("Deletion of {} declined, keeping local copy", path);
            return Ok(Confirmation::Declined);
        }

        info!("Deleting {} locally", path);
        self.local.delete(path).await.map_err(local_err("delete", path))?;
        self.state.write().await.remove(path);
        Ok(Confirmation::Accepted)
    }

    /// Delete the remote file after confirmation.
    ///
    /// A declined prompt leaves the file and the state untouched.
    pub async fn delete_remote(&self, path: &SyncPath) -> Result<Confirmation> {
        if self.confirmer.confirm_delete(path, DeleteSide::Remote).await == Confirmation::Declined {
            info!("Deletion of {} declined, keeping remote copy", path);
            return Ok(Confirmation::Declined);
        }

        info!("Deleting {} on remote", path);
        self.remote
            .delete(&self.remote_path(path))
            .await
            .map_err(remote_err("delete", path))?;
        self.state.write().await.remove(path);
        Ok(Confirmation::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::AutoConfirm;
    use async_trait::async_trait;
    use vaultsync_storage::{MemoryLocalTree, MemoryRemoteTree};

    fn p(s: &str) -> SyncPath {
        SyncPath::parse(s).unwrap()
    }

    struct Fixture {
        local: Arc<MemoryLocalTree>,
        remote: Arc<MemoryRemoteTree>,
        state: Arc<RwLock<SyncState>>,
    }

    impl Fixture {
        fn new() -> Self {
            let remote = Arc::new(MemoryRemoteTree::new());
            remote.insert_folder("Vault");
            Self {
                local: Arc::new(MemoryLocalTree::new()),
                remote,
                state: Arc::new(RwLock::new(SyncState::new())),
            }
        }

        fn executor(&self, accept_deletes: bool) -> ActionExecutor {
            ActionExecutor::new(
                self.local.clone(),
                self.remote.clone(),
                p("Vault"),
                self.state.clone(),
                Arc::new(AutoConfirm(accept_deletes)),
            )
        }
    }

    #[tokio::test]
    async fn test_upload_creates_remote_parents() {
        let fx = Fixture::new();
        fx.local.insert_file("notes/a.md", "hello", 100);

        let modified = fx.executor(true).upload(&p("notes/a.md")).await.unwrap();

        assert_eq!(modified, Timestamp::from_millis(100));
        let (data, remote_modified) = fx.remote.file("Vault/notes/a.md").unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(remote_modified, Timestamp::from_millis(100));
        assert_eq!(
            fx.state.read().await.get(&p("notes/a.md")),
            Some(Timestamp::from_millis(100))
        );
    }

    /// Local replica whose file changes right after its content was read,
    /// like an editor saving mid-upload.
    struct EditedDuringRead {
        inner: MemoryLocalTree,
    }

    #[async_trait]
    impl LocalTree for EditedDuringRead {
        fn name(&self) -> &str {
            "edited"
        }

        async fn list_files(&self) -> Result<Vec<vaultsync_storage::FileEntry>> {
            self.inner.list_files().await
        }

        async fn stat(&self, path: &SyncPath) -> Result<vaultsync_storage::FileStat> {
            self.inner.stat(path).await
        }

        async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
            let data = self.inner.read(path).await?;
            self.inner
                .write(path, b"EDITED".to_vec(), Timestamp::from_millis(200))
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

    #[tokio::test]
    async fn test_upload_rejects_file_edited_while_reading() {
        let inner = MemoryLocalTree::new();
        inner.insert_file("a.md", "original", 100);
        let local = Arc::new(EditedDuringRead { inner });
        let remote = Arc::new(MemoryRemoteTree::new());
        remote.insert_folder("Vault");
        let state = Arc::new(RwLock::new(SyncState::new()));
        let executor = ActionExecutor::new(
            local.clone(),
            remote.clone(),
            p("Vault"),
            state.clone(),
            Arc::new(AutoConfirm(true)),
        );

        let err = executor.upload(&p("a.md")).await.unwrap_err();

        assert!(matches!(err, Error::LocalIo(_)));
        assert!(remote.file("Vault/a.md").is_none());
        assert!(state.read().await.is_empty());
        assert_eq!(
            local.inner.file("a.md").unwrap(),
            (b"EDITED".to_vec(), Timestamp::from_millis(200))
        );
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_state() {
        let fx = Fixture::new();
        fx.local.insert_file("a.md", "hello", 100);
        fx.remote.fail_on("Vault/a.md");

        let err = fx.executor(true).upload(&p("a.md")).await.unwrap_err();

        assert!(matches!(err, Error::RemoteIo(_)));
        assert!(fx.state.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_download_creates_local_parents() {
        let fx = Fixture::new();
        fx.remote.insert_file("Vault/deep/dir/b.md", "remote", 200);

        fx.executor(true).download(&p("deep/dir/b.md"), false).await.unwrap();

        assert!(fx.local.has_folder("deep/dir"));
        let (data, modified) = fx.local.file("deep/dir/b.md").unwrap();
        assert_eq!(data, b"remote");
        assert_eq!(modified, Timestamp::from_millis(200));
        assert_eq!(
            fx.state.read().await.get(&p("deep/dir/b.md")),
            Some(Timestamp::from_millis(200))
        );
    }

    #[tokio::test]
    async fn test_download_overwrites_existing() {
        let fx = Fixture::new();
        fx.local.insert_file("a.md", "old", 100);
        fx.remote.insert_file("Vault/a.md", "new", 200);

        fx.executor(true).download(&p("a.md"), true).await.unwrap();

        assert_eq!(fx.local.file("a.md").unwrap(), (b"new".to_vec(), Timestamp::from_millis(200)));
    }

    #[tokio::test]
    async fn test_download_missing_remote_is_remote_error() {
        let fx = Fixture::new();

        let err = fx.executor(true).download(&p("gone.md"), false).await.unwrap_err();

        assert!(matches!(err, Error::RemoteIo(_)));
        assert!(fx.local.file("gone.md").is_none());
    }

    #[tokio::test]
    async fn test_delete_local_accepted() {
        let fx = Fixture::new();
        fx.local.insert_file("a.md", "x", 100);
        fx.state.write().await.set(&p("a.md"), Timestamp::from_millis(100));

        let outcome = fx.executor(true).delete_local(&p("a.md")).await.unwrap();

        assert_eq!(outcome, Confirmation::Accepted);
        assert!(fx.local.file("a.md").is_none());
        assert!(fx.state.read().await.get(&p("a.md")).is_none());
    }

    #[tokio::test]
    async fn test_delete_remote_declined_is_noop() {
        let fx = Fixture::new();
        fx.remote.insert_file("Vault/a.md", "x", 100);
        fx.state.write().await.set(&p("a.md"), Timestamp::from_millis(100));

        let outcome = fx.executor(false).delete_remote(&p("a.md")).await.unwrap();

        assert_eq!(outcome, Confirmation::Declined);
        assert!(fx.remote.file("Vault/a.md").is_some());
        assert_eq!(
            fx.state.read().await.get(&p("a.md")),
            Some(Timestamp::from_millis(100))
        );
    }

    #[tokio::test]
    async fn test_execute_rejects_conflict() {
        let fx = Fixture::new();
        let record = PathRecord {
            path: p("a.md"),
            local: None,
            remote: None,
            last_synced: None,
        };

        let result = fx
            .executor(true)
            .execute(&record, Decision::Conflict(crate::classify::ConflictReason::NoHistory))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
