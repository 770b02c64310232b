//! VaultSync reconciliation engine
//!
//! This crate keeps a local file tree and a remote file tree in agreement:
//! - Tree aggregation into one record per path
//! - A pure decision table driven by per-path last-synced timestamps
//! - Confirmed deletions and prompted conflict resolution
//! - Persistent sync state, flushed once per pass

pub mod classify;
pub mod conflict;
pub mod engine;
pub mod executor;
pub mod interaction;
pub mod state;
pub mod tree;

// Re-export main types
pub use classify::{classify, ConflictReason, Decision};
pub use conflict::{ConflictInfo, ConflictResolver, ResolutionResult};
pub use engine::{SyncConfig, SyncEngine, SyncPhase, SyncReport, DEFAULT_REMOTE_ROOT};
pub use executor::{ActionExecutor, ActionOutcome};
pub use interaction::{
    AutoConfirm, CollectingNotifier, Confirmation, Confirmer, ConflictChoice, ConflictPrompt,
    ConflictStrategy, DeleteSide, LogNotifier, Notifier,
};
pub use state::{JsonStateStore, MemoryStateStore, StateStore, SyncState};
pub use tree::{merge, PathRecord, Presence, TreeAggregator};
