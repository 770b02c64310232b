//! Reconciliation driver that orchestrates one full sync pass.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use vaultsync_common::{Error, Result, SyncPath};
use vaultsync_storage::{LocalTree, RemoteTree};

use crate::classify::Decision;
use crate::conflict::ConflictResolver;
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::interaction::{ConflictPrompt, Confirmer, Notifier};
use crate::state::StateStore;
use crate::tree::{PathRecord, TreeAggregator};

/// Remote directory used when none is configured.
pub const DEFAULT_REMOTE_ROOT: &str = "Obsidian Vault";

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote directory mirrored by the local tree.
    pub remote_root: SyncPath,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_root: SyncPath::from_components(vec![DEFAULT_REMOTE_ROOT.to_string()])
                .unwrap_or_else(|_| SyncPath::root()),
        }
    }
}

/// Where a pass currently is. Transitions are strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Idle,
    Aggregating,
    Classifying,
    Dispatching,
    Settling,
    Reporting,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Uploads dispatched.
    pub uploads: usize,
    /// Downloads dispatched.
    pub downloads: usize,
    pub local_deletes: usize,
    pub remote_deletes: usize,
    /// Deletions the user declined.
    pub declined: usize,
    /// Conflicts detected during classification.
    pub conflicts: usize,
    pub conflicts_resolved: usize,
    pub conflicts_skipped: usize,
    /// Actions that failed and will be reclassified next pass.
    pub failed: usize,
    /// Actions dispatched in total.
    pub actions: usize,
    pub duration: Duration,
}

impl SyncReport {
    /// Whether the pass found nothing to do.
    pub fn is_up_to_date(&self) -> bool {
        self.actions == 0
    }

    /// One-line description of the pass.
    pub fn summary(&self) -> String {
        if self.is_up_to_date() {
            return "Up to date.".to_string();
        }
        format!(
            "{} up, {} down, {} deleted locally, {} deleted on remote, {} declined, {} of {} conflicts resolved, {} failed",
            self.uploads,
            self.downloads,
            self.local_deletes,
            self.remote_deletes,
            self.declined,
            self.conflicts_resolved,
            self.conflicts,
            self.failed
        )
    }

    fn record(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Uploaded | ActionOutcome::Downloaded => {}
            ActionOutcome::DeletedLocal => self.local_deletes += 1,
            ActionOutcome::DeletedRemote => self.remote_deletes += 1,
            ActionOutcome::Declined => self.declined += 1,
            ActionOutcome::ConflictResolved => self.conflicts_resolved += 1,
            ActionOutcome::ConflictSkipped => self.conflicts_skipped += 1,
            ActionOutcome::Failed => self.failed += 1,
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.summary(), self.duration)
    }
}

/// Main sync engine for reconciling a local tree with a remote tree.
///
/// Every collaborator is injected; the engine owns no global state. One
/// engine runs one pass at a time; callers serialize concurrent `sync` calls.
pub struct SyncEngine {
    local: Arc<dyn LocalTree>,
    remote: Arc<dyn RemoteTree>,
    store: Arc<dyn StateStore>,
    confirmer: Arc<dyn Confirmer>,
    prompt: Arc<dyn ConflictPrompt>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    phase: RwLock<SyncPhase>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        local: Arc<dyn LocalTree>,
        remote: Arc<dyn RemoteTree>,
        store: Arc<dyn StateStore>,
        confirmer: Arc<dyn Confirmer>,
        prompt: Arc<dyn ConflictPrompt>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            remote,
            store,
            confirmer,
            prompt,
            notifier,
            config,
            phase: RwLock::new(SyncPhase::Idle),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current phase of the running pass.
    pub async fn phase(&self) -> SyncPhase {
        *self.phase.read().await
    }

    async fn enter(&self, phase: SyncPhase) {
        debug!("Sync phase: {:?}", phase);
        *self.phase.write().await = phase;
    }

    fn notify(&self, message: &str) {
        self.notifier.notify(message);
    }

    /// Run one full reconciliation pass.
    ///
    /// Per-path failures are logged and counted but never abort the pass.
    ///
    /// # Errors
    /// - `RootNotFound` if the remote root does not exist; nothing is
    ///   classified or written
    /// - listing or state loading failures, before any action runs
    /// - state persistence failure, after all actions have settled
    pub async fn sync(&self) -> Result<SyncReport> {
        let result = self.run_pass().await;
        self.enter(SyncPhase::Idle).await;
        result
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        info!("Starting sync against remote root {}", self.config.remote_root);

        self.enter(SyncPhase::Aggregating).await;
        let state = self.store.load().await?;
        let aggregator = TreeAggregator::new(
            self.local.clone(),
            self.remote.clone(),
            self.config.remote_root.clone(),
        );
        let records = match aggregator.aggregate(&state).await {
            Ok(records) => records,
            Err(Error::RootNotFound(root)) => {
                error!("Remote root {} does not exist", root);
                self.notify(&format!("Invalid remote root {}: does not exist", root));
                return Err(Error::RootNotFound(root));
            }
            Err(e) => {
                error!("Failed to list replicas: {}", e);
                return Err(e);
            }
        };

        self.enter(SyncPhase::Classifying).await;
        let plan = self.classify(records, &mut report);
        report.actions = plan.len();
        if report.uploads + report.downloads > 0 {
            self.notify(&format!("{} up, {} down", report.uploads, report.downloads));
        }

        self.enter(SyncPhase::Dispatching).await;
        let state = Arc::new(RwLock::new(state));
        let executor = Arc::new(ActionExecutor::new(
            self.local.clone(),
            self.remote.clone(),
            self.config.remote_root.clone(),
            state.clone(),
            self.confirmer.clone(),
        ));
        let resolver = ConflictResolver::new(executor.clone(), self.prompt.clone());
        let tasks = plan
            .iter()
            .map(|(record, decision)| self.run_action(&executor, &resolver, record, *decision));

        let outcomes = join_all(tasks).await;

        self.enter(SyncPhase::Settling).await;
        for outcome in outcomes {
            report.record(outcome);
        }

        self.enter(SyncPhase::Reporting).await;
        let persisted = if report.is_up_to_date() {
            Ok(())
        } else {
            let state = state.read().await;
            self.store.save(&state).await.map_err(|e| {
                error!("Failed to persist sync state: {}", e);
                e
            })
        };

        report.duration = start.elapsed();
        info!("Sync finished: {}", report);
        self.notify(if report.is_up_to_date() { "Up to date." } else { "Done." });

        persisted.map(|()| report)
    }

    /// Classify every record, returning the ones that need work.
    fn classify(&self, records: Vec<PathRecord>, report: &mut SyncReport) -> Vec<(PathRecord, Decision)> {
        let mut plan = Vec::new();
        for record in records {
            let decision = record.decision();
            if !decision.is_actionable() {
                continue;
            }
            match decision {
                Decision::Upload => report.uploads += 1,
                Decision::Download => report.downloads += 1,
                Decision::Conflict(reason) => {
                    report.conflicts += 1;
                    warn!("Sync conflict on {} ({:?})", record.path, reason);
                    self.notify(&format!("Sync conflict on file: {}", record.path));
                }
                Decision::Nothing | Decision::DeleteLocal | Decision::DeleteRemote => {}
            }
            debug!("{} -> {}", record.path, decision);
            plan.push((record, decision));
        }
        plan
    }

    /// Run one path's action to completion. Never fails: errors are logged
    /// and reported as [`ActionOutcome::Failed`].
    async fn run_action(
        &self,
        executor: &ActionExecutor,
        resolver: &ConflictResolver,
        record: &PathRecord,
        decision: Decision,
    ) -> ActionOutcome {
        let result = match decision {
            Decision::Conflict(_) => resolver
                .resolve(&record.path, record.last_synced)
                .await
                .map(|resolution| {
                    if resolution.is_resolved() {
                        ActionOutcome::ConflictResolved
                    } else {
                        ActionOutcome::ConflictSkipped
                    }
                }),
            _ => executor.execute(record, decision).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to {} {}: {}", decision, record.path, e);
                ActionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{AutoConfirm, CollectingNotifier, ConflictStrategy};
    use crate::state::MemoryStateStore;
    use vaultsync_common::Timestamp;
    use vaultsync_storage::{MemoryLocalTree, MemoryRemoteTree};

    fn engine(
        local: Arc<MemoryLocalTree>,
        remote: Arc<MemoryRemoteTree>,
        store: Arc<MemoryStateStore>,
        notifier: Arc<CollectingNotifier>,
    ) -> SyncEngine {
        SyncEngine::new(
            local,
            remote,
            store,
            Arc::new(AutoConfirm(true)),
            Arc::new(ConflictStrategy::Skip),
            notifier,
            SyncConfig {
                remote_root: SyncPath::parse("Vault").unwrap(),
            },
        )
    }

    #[test]
    fn test_default_config() {
        assert_eq!(SyncConfig::default().remote_root.to_string(), "Obsidian Vault");
    }

    #[test]
    fn test_report_summary() {
        let report = SyncReport::default();
        assert!(report.is_up_to_date());
        assert_eq!(report.summary(), "Up to date.");

        let report = SyncReport {
            uploads: 2,
            downloads: 1,
            actions: 3,
            ..SyncReport::default()
        };
        assert!(report.summary().starts_with("2 up, 1 down"));
    }

    #[tokio::test]
    async fn test_empty_pass_is_up_to_date() {
        let remote = Arc::new(MemoryRemoteTree::new());
        remote.insert_folder("Vault");
        let store = Arc::new(MemoryStateStore::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let engine = engine(Arc::new(MemoryLocalTree::new()), remote, store.clone(), notifier.clone());

        let report = engine.sync().await.unwrap();

        assert_eq!(report.uploads, 0);
        assert_eq!(report.downloads, 0);
        assert!(report.is_up_to_date());
        assert_eq!(notifier.messages(), vec!["Up to date."]);
        assert_eq!(store.save_count(), 0);
        assert_eq!(engine.phase().await, SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_missing_root_aborts() {
        let local = Arc::new(MemoryLocalTree::new());
        local.insert_file("a.md", "a", 100);
        let store = Arc::new(MemoryStateStore::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let engine = engine(local, Arc::new(MemoryRemoteTree::new()), store.clone(), notifier.clone());

        let err = engine.sync().await.unwrap_err();

        assert!(matches!(err, Error::RootNotFound(_)));
        assert_eq!(
            notifier.messages(),
            vec!["Invalid remote root Vault: does not exist"]
        );
        assert_eq!(store.save_count(), 0);
        assert_eq!(engine.phase().await, SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_upload_pass_persists_once() {
        let local = Arc::new(MemoryLocalTree::new());
        local.insert_file("a.md", "a", 100);
        local.insert_file("b.md", "b", 200);
        let remote = Arc::new(MemoryRemoteTree::new());
        remote.insert_folder("Vault");
        let store = Arc::new(MemoryStateStore::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let engine = engine(local, remote.clone(), store.clone(), notifier.clone());

        let report = engine.sync().await.unwrap();

        assert_eq!(report.uploads, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.save_count(), 1);
        assert_eq!(
            store.snapshot().get(&SyncPath::parse("b.md").unwrap()),
            Some(Timestamp::from_millis(200))
        );
        assert_eq!(remote.paths(), vec!["Vault/a.md", "Vault/b.md"]);
        assert_eq!(
            notifier.messages(),
            vec!["2 up, 0 down", "Done."]
        );
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_after_actions() {
        let local = Arc::new(MemoryLocalTree::new());
        local.insert_file("a.md", "a", 100);
        let remote = Arc::new(MemoryRemoteTree::new());
        remote.insert_folder("Vault");
        let notifier = Arc::new(CollectingNotifier::new());
        let engine = engine(local, remote.clone(), Arc::new(MemoryStateStore::failing()), notifier);

        assert!(engine.sync().await.is_err());
        assert_eq!(remote.paths(), vec!["Vault/a.md"]);
    }
}
