//! Replica capability interfaces for VaultSync.
//!
//! The reconciliation engine never touches a filesystem or a cloud client
//! directly. It talks to two trait objects: a [`LocalTree`] for the working
//! copy and a [`RemoteTree`] for the remote replica. This crate defines those
//! traits, in-memory doubles for tests, filesystem-backed implementations,
//! and a registry that resolves remote backends by name.
//!
//! # Design Principles
//! - Replica isolation: no backend-specific logic leaks into the engine
//! - Async operations: all I/O operations are async
//! - Explicit mtimes: every write carries the modification time to apply
//! - Unified error semantics: backends report through the common `Error`

pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;

pub use local::{FsLocalTree, FsRemoteTree};
pub use memory::{MemoryLocalTree, MemoryRemoteTree};
pub use provider::{FileEntry, FileStat, LocalTree, RemoteEntry, RemoteId, RemoteTree};
pub use registry::{create_default_registry, RemoteFactory, RemoteRegistry};
