//! In-memory replicas for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::provider::{FileEntry, FileStat, LocalTree, RemoteEntry, RemoteId, RemoteTree};
use vaultsync_common::{Error, Result, SyncPath, Timestamp};

/// A stored file.
#[derive(Debug, Clone)]
struct StoredFile {
    data: Vec<u8>,
    modified: Timestamp,
}

impl StoredFile {
    fn stat(&self) -> FileStat {
        FileStat {
            modified: self.modified,
            size: Some(self.data.len() as u64),
            is_directory: false,
        }
    }
}

fn parse(path: &str) -> SyncPath {
    SyncPath::parse(path).unwrap_or_else(|e| panic!("invalid test path {:?}: {}", path, e))
}

fn ancestors(path: &SyncPath) -> Vec<SyncPath> {
    let mut out = Vec::new();
    let mut current = path.parent();
    while let Some(p) = current {
        current = p.parent();
        out.push(p);
    }
    out
}

#[derive(Debug, Default)]
struct LocalInner {
    files: HashMap<SyncPath, StoredFile>,
    folders: HashSet<SyncPath>,
    failing: HashSet<SyncPath>,
}

/// In-memory local replica.
///
/// Useful for testing. Files carry explicit modification times so tests can
/// script exact timestamp triples. Paths registered with [`fail_on`] make
/// every operation on them fail, simulating I/O errors.
///
/// [`fail_on`]: MemoryLocalTree::fail_on
#[derive(Debug, Default)]
pub struct MemoryLocalTree {
    inner: RwLock<LocalInner>,
}

impl MemoryLocalTree {
    /// Create a new empty local tree.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, LocalInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, LocalInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a file, creating its parent folders.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>, modified: i64) {
        let path = parse(path);
        let mut inner = self.write_inner();
        for folder in ancestors(&path) {
            inner.folders.insert(folder);
        }
        inner.files.insert(
            path,
            StoredFile {
                data: data.into(),
                modified: Timestamp::from_millis(modified),
            },
        );
    }

    /// Get a file's content and modification time.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, Timestamp)> {
        self.read_inner()
            .files
            .get(&parse(path))
            .map(|f| (f.data.clone(), f.modified))
    }

    /// Whether a folder exists.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn has_folder(&self, path: &str) -> bool {
        let path = parse(path);
        path.is_root() || self.read_inner().folders.contains(&path)
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.read_inner().files.keys().map(|p| p.to_string()).collect();
        paths.sort();
        paths
    }

    /// Make every operation on `path` fail.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn fail_on(&self, path: &str) {
        self.write_inner().failing.insert(parse(path));
    }

    fn check(&self, path: &SyncPath) -> Result<()> {
        if self.read_inner().failing.contains(path) {
            return Err(Error::Io(std::io::Error::other(format!(
                "injected failure: {}",
                path
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalTree for MemoryLocalTree {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        Ok(self
            .read_inner()
            .files
            .iter()
            .map(|(path, file)| FileEntry {
                path: path.clone(),
                modified: file.modified,
            })
            .collect())
    }

    async fn stat(&self, path: &SyncPath) -> Result<FileStat> {
        self.check(path)?;
        let inner = self.read_inner();
        if let Some(file) = inner.files.get(path) {
            return Ok(file.stat());
        }
        if path.is_root() || inner.folders.contains(path) {
            return Ok(FileStat {
                modified: Timestamp::from_millis(0),
                size: None,
                is_directory: true,
            });
        }
        Err(Error::NotFound(format!("Path not found: {}", path)))
    }

    async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
        self.check(path)?;
        match self.read_inner().files.get(path) {
            Some(file) => Ok(file.data.clone()),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn write(&self, path: &SyncPath, data: Vec<u8>, modified: Timestamp) -> Result<()> {
        self.check(path)?;
        let mut inner = self.write_inner();

        if let Some(parent) = path.parent() {
            if !parent.is_root() && !inner.folders.contains(&parent) {
                return Err(Error::NotFound(format!(
                    "Parent directory not found: {}",
                    parent
                )));
            }
        }
        if inner.folders.contains(path) {
            return Err(Error::InvalidInput(format!("Is a directory: {}", path)));
        }

        inner.files.insert(path.clone(), StoredFile { data, modified });
        Ok(())
    }

    async fn delete(&self, path: &SyncPath) -> Result<()> {
        self.check(path)?;
        match self.write_inner().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn ensure_folder(&self, path: &SyncPath) -> Result<()> {
        let mut inner = self.write_inner();
        if inner.files.contains_key(path) {
            return Err(Error::AlreadyExists(format!("File exists at {}", path)));
        }
        if !path.is_root() {
            inner.folders.insert(path.clone());
        }
        for folder in ancestors(path) {
            inner.folders.insert(folder);
        }
        Ok(())
    }

    async fn exists(&self, path: &SyncPath) -> Result<bool> {
        let inner = self.read_inner();
        Ok(path.is_root() || inner.files.contains_key(path) || inner.folders.contains(path))
    }
}

#[derive(Debug)]
struct RemoteInner {
    files: HashMap<SyncPath, StoredFile>,
    folders: HashMap<SyncPath, RemoteId>,
    ids: HashMap<RemoteId, SyncPath>,
    failing: HashSet<SyncPath>,
    failing_writes: HashSet<SyncPath>,
}

impl RemoteInner {
    fn add_folder(&mut self, path: SyncPath) -> RemoteId {
        if let Some(id) = self.folders.get(&path) {
            return id.clone();
        }
        let id = RemoteId::new(Uuid::new_v4().to_string());
        self.folders.insert(path.clone(), id.clone());
        self.ids.insert(id.clone(), path);
        id
    }
}

/// In-memory remote replica.
///
/// Folders receive random identifiers, mirroring cloud backends that address
/// directories by id. Listings report paths with a leading `/`.
#[derive(Debug)]
pub struct MemoryRemoteTree {
    inner: RwLock<RemoteInner>,
}

impl MemoryRemoteTree {
    /// Create a new remote tree containing only the store root.
    pub fn new() -> Self {
        let mut inner = RemoteInner {
            files: HashMap::new(),
            folders: HashMap::new(),
            ids: HashMap::new(),
            failing: HashSet::new(),
            failing_writes: HashSet::new(),
        };
        inner.add_folder(SyncPath::root());
        Self {
            inner: RwLock::new(inner),
        }
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, RemoteInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, RemoteInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a folder and its parents.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn insert_folder(&self, path: &str) {
        let path = parse(path);
        let mut inner = self.write_inner();
        for folder in ancestors(&path) {
            inner.add_folder(folder);
        }
        inner.add_folder(path);
    }

    /// Insert a file, creating its parent folders.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>, modified: i64) {
        let path = parse(path);
        let mut inner = self.write_inner();
        for folder in ancestors(&path) {
            inner.add_folder(folder);
        }
        inner.files.insert(
            path,
            StoredFile {
                data: data.into(),
                modified: Timestamp::from_millis(modified),
            },
        );
    }

    /// Get a file's content and modification time.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, Timestamp)> {
        self.read_inner()
            .files
            .get(&parse(path))
            .map(|f| (f.data.clone(), f.modified))
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.read_inner().files.keys().map(|p| p.to_string()).collect();
        paths.sort();
        paths
    }

    /// Make every operation on `path` fail.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn fail_on(&self, path: &str) {
        self.write_inner().failing.insert(parse(path));
    }

    /// Make writes to `path` fail while reads keep working.
    ///
    /// # Panics
    /// - `path` is not a valid `SyncPath` (e.g. contains `..`)
    pub fn fail_writes_on(&self, path: &str) {
        self.write_inner().failing_writes.insert(parse(path));
    }

    fn check(&self, path: &SyncPath) -> Result<()> {
        if self.read_inner().failing.contains(path) {
            return Err(Error::Io(std::io::Error::other(format!(
                "injected failure: {}",
                path
            ))));
        }
        Ok(())
    }
}

impl Default for MemoryRemoteTree {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTree for MemoryRemoteTree {
    fn name(&self) -> &str {
        "memory"
    }

    async fn resolve_root(&self, path: &SyncPath) -> Result<Option<RemoteId>> {
        Ok(self.read_inner().folders.get(path).cloned())
    }

    async fn list_recursive(&self, root: &RemoteId) -> Result<Vec<RemoteEntry>> {
        let inner = self.read_inner();
        let root_path = inner
            .ids
            .get(root)
            .ok_or_else(|| Error::NotFound(format!("Directory not found: {}", root)))?;
        let depth = root_path.components().len();

        let relative = |path: &SyncPath| -> Option<String> {
            if path.components().len() > depth && path.components().starts_with(root_path.components()) {
                Some(format!("/{}", path.components()[depth..].join("/")))
            } else {
                None
            }
        };

        let mut entries = Vec::new();
        for (path, file) in &inner.files {
            if let Some(rel) = relative(path) {
                entries.push(RemoteEntry {
                    path: rel,
                    modified: file.modified,
                    is_directory: false,
                });
            }
        }
        for path in inner.folders.keys() {
            if let Some(rel) = relative(path) {
                entries.push(RemoteEntry {
                    path: rel,
                    modified: Timestamp::from_millis(0),
                    is_directory: true,
                });
            }
        }
        Ok(entries)
    }

    async fn stat(&self, path: &SyncPath) -> Result<FileStat> {
        self.check(path)?;
        let inner = self.read_inner();
        if let Some(file) = inner.files.get(path) {
            return Ok(file.stat());
        }
        if inner.folders.contains_key(path) {
            return Ok(FileStat {
                modified: Timestamp::from_millis(0),
                size: None,
                is_directory: true,
            });
        }
        Err(Error::NotFound(format!("Path not found: {}", path)))
    }

    async fn read(&self, path: &SyncPath) -> Result<Vec<u8>> {
        self.check(path)?;
        match self.read_inner().files.get(path) {
            Some(file) => Ok(file.data.clone()),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn write(
        &self,
        parent: &RemoteId,
        name: &str,
        data: Vec<u8>,
        modified: Timestamp,
    ) -> Result<()> {
        let path = {
            let inner = self.read_inner();
            let parent_path = inner
                .ids
                .get(parent)
                .ok_or_else(|| Error::NotFound(format!("Parent directory not found: {}", parent)))?;
            parent_path.join(name)?
        };
        self.check(&path)?;

        let mut inner = self.write_inner();
        if inner.failing_writes.contains(&path) {
            return Err(Error::Io(std::io::Error::other(format!(
                "injected write failure: {}",
                path
            ))));
        }
        if inner.folders.contains_key(&path) {
            return Err(Error::InvalidInput(format!("Is a directory: {}", path)));
        }
        inner.files.insert(path, StoredFile { data, modified });
        Ok(())
    }

    async fn delete(&self, path: &SyncPath) -> Result<()> {
        self.check(path)?;
        match self.write_inner().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn ensure_folder(&self, path: &SyncPath) -> Result<RemoteId> {
        let mut inner = self.write_inner();
        if inner.files.contains_key(path) {
            return Err(Error::AlreadyExists(format!("File exists at {}", path)));
        }
        let mut chain = ancestors(path);
        chain.reverse();
        for folder in chain {
            inner.add_folder(folder);
        }
        Ok(inner.add_folder(path.clone()))
    }
}
