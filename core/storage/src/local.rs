//! Filesystem-backed replicas.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::provider::{FileEntry, FileStat, LocalTree, RemoteEntry, RemoteId, RemoteTree};
use vaultsync_common::{Error, Result, SyncPath, Timestamp};

/// Convert a SyncPath to a filesystem path below `root`.
fn to_fs_path(root: &Path, path: &SyncPath) -> PathBuf {
    let mut fs_path = root.to_path_buf();
    for component in path.components() {
        fs_path.push(component);
    }
    fs_path
}

fn create_stat(fs_meta: &std::fs::Metadata) -> FileStat {
    let modified = fs_meta
        .modified()
        .map(Timestamp::from_system_time)
        .unwrap_or_else(|_| Timestamp::from_millis(0));

    FileStat {
        modified,
        size: if fs_meta.is_file() {
            Some(fs_meta.len())
        } else {
            None
        },
        is_directory: fs_meta.is_dir(),
    }
}

/// Write a file and pin its modification time.
async fn write_with_mtime(fs_path: PathBuf, data: Vec<u8>, modified: Timestamp) -> Result<()> {
    fs::write(&fs_path, &data).await?;

    let mtime = modified.to_system_time();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = std::fs::File::options().write(true).open(&fs_path)?;
        file.set_modified(mtime)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))??;

    Ok(())
}

/// Walk a directory tree, returning every item below `base` with its
/// slash-separated path relative to `base`.
///
/// Entries whose name starts with `.` are skipped along with their
/// descendants.
async fn walk(base: &Path) -> Result<Vec<(Vec<String>, std::fs::Metadata)>> {
    let mut results = Vec::new();
    let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(base.to_path_buf(), Vec::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                debug!("Skipping non-UTF-8 entry in {}", dir.display());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let mut components = prefix.clone();
            components.push(name);
            let fs_meta = entry.metadata().await?;
            if fs_meta.is_dir() {
                pending.push((entry.path(), components.clone()));
            }
            results.push((components, fs_meta));
        }
    }

    Ok(results)
}

async fn ensure_dir(fs_path: &Path, path: &SyncPath) -> Result<()> {
    match fs::metadata(fs_path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::AlreadyExists(format!("File exists at {}", path))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(fs_path).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn stat_path(fs_path: &Path, path: &SyncPath) -> Result<FileStat> {
    match fs::metadata(fs_path).await {
        Ok(meta) => Ok(create_stat(&meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(format!("Path not found: {}", path)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn read_file(fs_path: &Path, path: &SyncPath) -> Result<Vec<u8>> {
    if fs_path.is_dir() {
        return Err(Error::InvalidInput(format!("Cannot read directory: {}", path)));
    }
    match fs::read(fs_path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(format!("File not found: {}", path)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete_file(fs_path: &Path, path: &SyncPath) -> Result<()> {
    if fs_path.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Refusing to delete directory: {}",
            path
        )));
    }
    match fs::remove_file(fs_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::NotFound(format!("File not found: {}", path)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Local working copy stored in a directory.
///
/// Hidden entries (names starting with `.`) are not part of the tree, so
/// editor metadata folders and VCS directories are never synchronized.
pub struct FsLocalTree {
    root: PathBuf,
}

impl FsLocalTree {
    /// Create a local tree rooted at the given directory.
    ///
    /// # Errors
    /// - Root does not exist or is not a directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "Local root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The directory this tree is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl LocalTree for FsLocalTree {
    fn name(&self) -> &str {
        "fs"
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        for (components, fs_meta) in walk(&self.root).await? {
            if !fs_meta.is_file() {
                continue;
            }
            files.push(FileEntry {
                path: SyncPath::from_components(components)?,
                modified: create_stat(&fs_meta).modified,
            });
        }
        Ok(files)
    }

    async fn stat(&self, path: &SyncPath) -> Result<FileStat> {
        stat_path(&to_fs_path(&self.root, path), path).await
    }

    async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
        read_file(&to_fs_path(&self.root, path), path).await
    }

    async fn write(&self, path: &SyncPath, data: Vec<u8>, modified: Timestamp) -> Result<()> {
        let fs_path = to_fs_path(&self.root, path);

        if let Some(parent) = fs_path.parent() {
            if !parent.is_dir() {
                return Err(Error::NotFound(format!(
                    "Parent directory not found: {}",
                    parent.display()
                )));
            }
        }

        write_with_mtime(fs_path, data, modified).await
    }

    async fn delete(&self, path: &SyncPath) -> Result<()> {
        delete_file(&to_fs_path(&self.root, path), path).await
    }

    async fn ensure_folder(&self, path: &SyncPath) -> Result<()> {
        ensure_dir(&to_fs_path(&self.root, path), path).await
    }

    async fn exists(&self, path: &SyncPath) -> Result<bool> {
        Ok(fs::try_exists(to_fs_path(&self.root, path)).await?)
    }
}

/// Remote replica backed by a directory, such as a mounted network share
/// or a cloud drive's local mount point.
///
/// Directory identifiers are the directory's path relative to the store
/// root.
pub struct FsRemoteTree {
    root: PathBuf,
}

impl FsRemoteTree {
    /// Create a remote tree over the given store directory.
    ///
    /// # Postconditions
    /// - Store directory is created if it doesn't exist
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    fn id_to_fs_path(&self, id: &RemoteId) -> Result<PathBuf> {
        let path = SyncPath::parse(id.as_str())?;
        Ok(to_fs_path(&self.root, &path))
    }
}

#[async_trait]
impl RemoteTree for FsRemoteTree {
    fn name(&self) -> &str {
        "local"
    }

    async fn resolve_root(&self, path: &SyncPath) -> Result<Option<RemoteId>> {
        match fs::metadata(to_fs_path(&self.root, path)).await {
            Ok(meta) if meta.is_dir() => Ok(Some(RemoteId::new(path.as_relative()))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_recursive(&self, root: &RemoteId) -> Result<Vec<RemoteEntry>> {
        let base = self.id_to_fs_path(root)?;
        Ok(walk(&base)
            .await?
            .into_iter()
            .map(|(components, fs_meta)| {
                let stat = create_stat(&fs_meta);
                RemoteEntry {
                    path: format!("/{}", components.join("/")),
                    modified: stat.modified,
                    is_directory: stat.is_directory,
                }
            })
            .collect())
    }

    async fn stat(&self, path: &SyncPath) -> Result<FileStat> {
        stat_path(&to_fs_path(&self.root, path), path).await
    }

    async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
        read_file(&to_fs_path(&self.root, path), path).await
    }

    async fn write(
        &self,
        parent: &RemoteId,
        name: &str,
        data: Vec<u8>,
        modified: Timestamp,
    ) -> Result<()> {
        let parent_path = self.id_to_fs_path(parent)?;
        if !parent_path.is_dir() {
            return Err(Error::NotFound(format!(
                "Parent directory not found: {}",
                parent
            )));
        }
        let target = SyncPath::parse(parent.as_str())?.join(name)?;

        write_with_mtime(to_fs_path(&self.root, &target), data, modified).await
    }

    async fn delete(&self, path: &SyncPath) -> Result<()> {
        delete_file(&to_fs_path(&self.root, path), path).await
    }

    async fn ensure_folder(&self, path: &SyncPath) -> Result<RemoteId> {
        ensure_dir(&to_fs_path(&self.root, path), path).await?;
        Ok(RemoteId::new(path.as_relative()))
    }
}
