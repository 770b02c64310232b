//! VaultSync CLI - Command line interface for note vault synchronization.
//!
//! This tool reconciles a local directory with a remote store and manages
//! the persisted sync settings.

mod prompts;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vaultsync_common::SyncPath;
use vaultsync_storage::{create_default_registry, FsLocalTree, RemoteTree};
use vaultsync_sync::{
    AutoConfirm, ConflictPrompt, ConflictStrategy, Confirmer, SyncConfig, SyncEngine,
};

use prompts::{ConsoleNotifier, TerminalPrompt};
use settings::{Settings, SettingsStateStore};

#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(about = "VaultSync - Two-way note vault synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (default: platform config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a local directory with the remote root.
    Sync {
        /// Local vault directory.
        #[arg(short, long)]
        local: PathBuf,

        /// Accept every deletion without asking.
        #[arg(short, long)]
        yes: bool,

        /// Resolve conflicts by policy instead of asking.
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Set the remote directory to synchronize with.
    SetRoot {
        /// Remote directory, relative to the store root.
        path: String,
    },

    /// Show the current settings and sync state.
    Status,

    /// Forget the last-synced time of one path, or of all paths.
    Forget {
        /// Path relative to the vault root (default: all paths).
        path: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    PreferLocal,
    PreferRemote,
    Skip,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PreferLocal => ConflictStrategy::PreferLocal,
            StrategyArg::PreferRemote => ConflictStrategy::PreferRemote,
            StrategyArg::Skip => ConflictStrategy::Skip,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path().context("Failed to locate settings file")?,
    };

    match cli.command {
        Commands::Sync {
            local,
            yes,
            strategy,
        } => cmd_sync(&settings_path, &local, yes, strategy).await,

        Commands::SetRoot { path } => cmd_set_root(&settings_path, &path).await,

        Commands::Status => cmd_status(&settings_path).await,

        Commands::Forget { path } => cmd_forget(&settings_path, path.as_deref()).await,
    }
}

/// Load settings from disk.
async fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path)
        .await
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

/// Build the configured remote backend.
fn open_remote(settings: &Settings) -> Result<Arc<dyn RemoteTree>> {
    let registry = create_default_registry().context("Failed to create remote registry")?;
    registry
        .resolve(&settings.remote.provider, settings.remote.config.clone())
        .with_context(|| format!("Failed to open remote backend '{}'", settings.remote.provider))
}

/// Run one reconciliation pass.
async fn cmd_sync(
    settings_path: &Path,
    local: &Path,
    yes: bool,
    strategy: Option<StrategyArg>,
) -> Result<()> {
    let settings = load_settings(settings_path).await?;
    info!(
        "Syncing {} with remote root {}",
        local.display(),
        settings.remote_root
    );

    let local_tree = FsLocalTree::new(local).context("Failed to open local directory")?;
    let remote = open_remote(&settings)?;

    let terminal = Arc::new(TerminalPrompt::new());
    let confirmer: Arc<dyn Confirmer> = if yes {
        Arc::new(AutoConfirm(true))
    } else {
        terminal.clone()
    };
    let prompt: Arc<dyn ConflictPrompt> = match strategy {
        Some(strategy) => Arc::new(ConflictStrategy::from(strategy)),
        None => terminal,
    };

    let engine = SyncEngine::new(
        Arc::new(local_tree),
        remote,
        Arc::new(SettingsStateStore::new(settings_path)),
        confirmer,
        prompt,
        Arc::new(ConsoleNotifier),
        SyncConfig {
            remote_root: settings.remote_root,
        },
    );

    let report = engine.sync().await.context("Sync failed")?;
    info!("{}", report);

    Ok(())
}

/// Validate and save a new remote root.
async fn cmd_set_root(settings_path: &Path, path: &str) -> Result<()> {
    let mut settings = load_settings(settings_path).await?;
    let root = SyncPath::parse(path).context("Invalid remote root")?;

    let remote = open_remote(&settings)?;
    validate_root(remote.as_ref(), &root).await?;

    settings.remote_root = root;
    settings
        .save(settings_path)
        .await
        .context("Failed to save settings")?;

    println!("Remote root set to {}", settings.remote_root);

    Ok(())
}

/// Check that `root` names an existing remote directory.
async fn validate_root(remote: &dyn RemoteTree, root: &SyncPath) -> Result<()> {
    let resolved = remote
        .resolve_root(root)
        .await
        .context("Failed to look up remote root")?;
    if resolved.is_some() {
        return Ok(());
    }

    match remote.stat(root).await {
        Ok(stat) if !stat.is_directory => {
            anyhow::bail!("Invalid remote root {}: is not a directory", root)
        }
        _ => anyhow::bail!("Invalid remote root {}: does not exist", root),
    }
}

/// Show settings and tracked paths.
async fn cmd_status(settings_path: &Path) -> Result<()> {
    let settings = load_settings(settings_path).await?;
    let state = &settings.last_synced_times;

    println!("Settings: {}", settings_path.display());
    println!("  Remote root: {}", settings.remote_root);
    println!("  Backend: {}", settings.remote.provider);
    println!("  Tracked paths: {}", state.len());

    let mut paths = state.paths();
    paths.sort();
    for path in paths {
        let synced = SyncPath::parse(&path)
            .ok()
            .and_then(|p| state.get(&p))
            .map(|t| t.to_string())
            .unwrap_or_default();
        println!("    {}  {}", path, synced);
    }

    Ok(())
}

/// Drop last-synced entries so the paths are treated as never synced.
async fn cmd_forget(settings_path: &Path, path: Option<&str>) -> Result<()> {
    let mut settings = load_settings(settings_path).await?;

    match path {
        Some(path) => {
            let path = SyncPath::parse(path).context("Invalid path")?;
            if settings.last_synced_times.remove(&path).is_none() {
                anyhow::bail!("No sync record for {}", path);
            }
            println!("Forgot {}", path);
        }
        None => {
            let count = settings.last_synced_times.len();
            settings.last_synced_times.clear();
            println!("Forgot {} paths", count);
        }
    }

    settings
        .save(settings_path)
        .await
        .context("Failed to save settings")?;

    Ok(())
}
