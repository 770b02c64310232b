//! Per-path action classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use vaultsync_common::Timestamp;

/// Why a path was classified as conflicting.
///
/// Both reasons are handled identically; the reason only feeds diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictReason {
    /// Both replicas hold the path but it was never synchronized.
    NoHistory,
    /// At least one side no longer matches the last-synced timestamp in a
    /// way that proves the other side unchanged.
    Diverged,
}

/// The action a reconciliation pass takes for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Replicas agree.
    Nothing,
    /// Copy the local file to the remote replica.
    Upload,
    /// Copy the remote file to the local replica.
    Download,
    /// Propagate a remote deletion by deleting the local file.
    DeleteLocal,
    /// Propagate a local deletion by deleting the remote file.
    DeleteRemote,
    /// Neither side can be proven authoritative.
    Conflict(ConflictReason),
}

impl Decision {
    /// Whether the decision requires dispatching work.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Decision::Nothing)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Decision::Nothing => "nothing",
            Decision::Upload => "upload",
            Decision::Download => "download",
            Decision::DeleteLocal => "delete-local",
            Decision::DeleteRemote => "delete-remote",
            Decision::Conflict(_) => "conflict",
        };
        f.write_str(name)
    }
}

/// Classify one path from its local mtime, remote mtime and last-synced
/// timestamp. `None` means absent, which is distinct from any timestamp.
///
/// A side is only considered unchanged when its mtime equals `last_synced`;
/// every case that fails that proof is a conflict. A path absent on both
/// sides never forms a record, and classifies as [`Decision::Nothing`].
pub fn classify(
    local: Option<Timestamp>,
    remote: Option<Timestamp>,
    last_synced: Option<Timestamp>,
) -> Decision {
    match (local, remote, last_synced) {
        (None, None, _) => Decision::Nothing,
        (None, Some(_), None) => Decision::Download,
        (None, Some(_), Some(_)) => Decision::DeleteRemote,
        (Some(_), None, None) => Decision::Upload,
        (Some(_), None, Some(_)) => Decision::DeleteLocal,
        (Some(_), Some(_), None) => Decision::Conflict(ConflictReason::NoHistory),
        (Some(l), Some(r), Some(s)) if l == s && r == s => Decision::Nothing,
        (Some(l), Some(r), Some(s)) if r == s && l > r => Decision::Upload,
        (Some(l), Some(r), Some(s)) if l == s && r > l => Decision::Download,
        (Some(_), Some(_), Some(_)) => Decision::Conflict(ConflictReason::Diverged),
    }
}
