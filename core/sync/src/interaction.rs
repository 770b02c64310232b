//! Decisions delegated to the user or to a policy.
//!
//! The engine never renders a dialog. It asks a [`Confirmer`] before
//! deleting anything, a [`ConflictPrompt`] when neither replica can be
//! proven authoritative, and reports progress through a [`Notifier`].
//! Dismissing a prompt resolves to `Declined`/`Skip`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::info;

use vaultsync_common::SyncPath;

/// Which replica a deletion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteSide {
    Local,
    Remote,
}

impl fmt::Display for DeleteSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteSide::Local => f.write_str("locally"),
            DeleteSide::Remote => f.write_str("on remote"),
        }
    }
}

/// Answer to a deletion prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    Accepted,
    Declined,
}

/// Answer to a conflict prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Overwrite the remote copy with the local one.
    AcceptLocal,
    /// Overwrite the local copy with the remote one.
    AcceptRemote,
    /// Overwrite both copies with merged content.
    Manual(Vec<u8>),
    /// Leave both copies alone until the next pass.
    Skip,
}

/// Confirms destructive actions before they run.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm_delete(&self, path: &SyncPath, side: DeleteSide) -> Confirmation;
}

/// Chooses how a conflicting path is resolved.
#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    async fn resolve_conflict(&self, path: &SyncPath, local: &[u8], remote: &[u8]) -> ConflictChoice;
}

/// Receives user-facing progress messages. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Answers every deletion prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm_delete(&self, path: &SyncPath, side: DeleteSide) -> Confirmation {
        if self.0 {
            info!("Auto-confirming deletion of {} {}", path, side);
            Confirmation::Accepted
        } else {
            info!("Auto-declining deletion of {} {}", path, side);
            Confirmation::Declined
        }
    }
}

/// Non-interactive conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Prefer local version, overwrite remote.
    PreferLocal,
    /// Prefer remote version, overwrite local.
    PreferRemote,
    /// Leave conflicts for a later pass.
    Skip,
}

#[async_trait]
impl ConflictPrompt for ConflictStrategy {
    async fn resolve_conflict(&self, _path: &SyncPath, _local: &[u8], _remote: &[u8]) -> ConflictChoice {
        match self {
            ConflictStrategy::PreferLocal => ConflictChoice::AcceptLocal,
            ConflictStrategy::PreferRemote => ConflictChoice::AcceptRemote,
            ConflictStrategy::Skip => ConflictChoice::Skip,
        }
    }
}

/// Forwards notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("{}", message);
    }
}

/// Records notifications in order.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}
