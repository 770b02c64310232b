//! Terminal prompts for deletions and conflicts.

use async_trait::async_trait;
use similar::{ChangeTag, TextDiff};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{error, warn};

use vaultsync_common::SyncPath;
use vaultsync_sync::{ConflictChoice, ConflictPrompt, Confirmation, Confirmer, DeleteSide, Notifier};

/// One line of a two-way diff, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Same(String),
    LocalOnly(String),
    RemoteOnly(String),
}

/// What the conflict dialog shows for two versions of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictView {
    /// Line diff of two UTF-8 texts.
    Text(Vec<DiffLine>),
    /// At least one side is not UTF-8; only sizes are shown.
    Binary { local: usize, remote: usize },
}

/// Line diff of two texts (Myers, linear memory).
pub fn line_diff(local: &str, remote: &str) -> Vec<DiffLine> {
    TextDiff::from_lines(local, remote)
        .iter_all_changes()
        .map(|change| {
            let line = change.value().trim_end_matches(['\n', '\r']).to_string();
            match change.tag() {
                ChangeTag::Equal => DiffLine::Same(line),
                ChangeTag::Delete => DiffLine::LocalOnly(line),
                ChangeTag::Insert => DiffLine::RemoteOnly(line),
            }
        })
        .collect()
}

/// Build the dialog view for two versions of a file.
pub fn conflict_view(local: &[u8], remote: &[u8]) -> ConflictView {
    match (std::str::from_utf8(local), std::str::from_utf8(remote)) {
        (Ok(local), Ok(remote)) => ConflictView::Text(line_diff(local, remote)),
        _ => ConflictView::Binary {
            local: local.len(),
            remote: remote.len(),
        },
    }
}

/// Parsed answer to the conflict prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAnswer {
    Local,
    Remote,
    Manual(PathBuf),
    Skip,
}

/// Parse a conflict answer: `l`, `r`, `m <file>` or `s`.
pub fn parse_conflict_answer(input: &str) -> Option<ConflictAnswer> {
    let input = input.trim();
    let (cmd, arg) = match input.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };
    match (cmd.to_ascii_lowercase().as_str(), arg) {
        ("l" | "local", "") => Some(ConflictAnswer::Local),
        ("r" | "remote", "") => Some(ConflictAnswer::Remote),
        ("s" | "skip", "") => Some(ConflictAnswer::Skip),
        ("m" | "manual", file) if !file.is_empty() => Some(ConflictAnswer::Manual(PathBuf::from(file))),
        _ => None,
    }
}

/// Parse a yes/no answer. Anything but an explicit yes declines.
pub fn parse_confirmation(input: &str) -> Confirmation {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Confirmation::Accepted,
        _ => Confirmation::Declined,
    }
}

/// Prompts on stdin/stdout.
///
/// Passes run their per-path tasks concurrently, so every dialog holds a
/// lock for its whole duration. End of input dismisses the dialog.
#[derive(Default)]
pub struct TerminalPrompt {
    lock: Mutex<()>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print `question` and read one line. `None` on end of input.
    async fn ask(&self, question: String) -> Option<String> {
        let result = tokio::task::spawn_blocking(move || {
            print!("{}", question);
            std::io::stdout().flush()?;
            let mut line = String::new();
            let read = std::io::stdin().lock().read_line(&mut line)?;
            Ok::<_, std::io::Error>((read > 0).then_some(line))
        })
        .await;

        match result {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                error!("Failed to read answer: {}", e);
                None
            }
            Err(e) => {
                error!("Prompt task failed: {}", e);
                None
            }
        }
    }
}

fn print_diff(path: &SyncPath, local: &[u8], remote: &[u8]) {
    println!();
    println!("Conflict on {}:", path);
    match conflict_view(local, remote) {
        ConflictView::Text(lines) => {
            println!("--- local");
            println!("+++ remote");
            for line in lines {
                match line {
                    DiffLine::Same(l) => println!("  {}", l),
                    DiffLine::LocalOnly(l) => println!("- {}", l),
                    DiffLine::RemoteOnly(l) => println!("+ {}", l),
                }
            }
        }
        ConflictView::Binary { local, remote } => {
            println!("binary content differs ({} vs {} bytes)", local, remote);
        }
    }
}

#[async_trait]
impl Confirmer for TerminalPrompt {
    async fn confirm_delete(&self, path: &SyncPath, side: DeleteSide) -> Confirmation {
        let _guard = self.lock.lock().await;
        match self.ask(format!("Delete {} {}? [y/N] ", path, side)).await {
            Some(answer) => parse_confirmation(&answer),
            None => Confirmation::Declined,
        }
    }
}

#[async_trait]
impl ConflictPrompt for TerminalPrompt {
    async fn resolve_conflict(&self, path: &SyncPath, local: &[u8], remote: &[u8]) -> ConflictChoice {
        let _guard = self.lock.lock().await;
        print_diff(path, local, remote);

        loop {
            let Some(answer) = self
                .ask("Keep [l]ocal, [r]emote, [m]anual <file>, or [s]kip? ".to_string())
                .await
            else {
                return ConflictChoice::Skip;
            };

            match parse_conflict_answer(&answer) {
                Some(ConflictAnswer::Local) => return ConflictChoice::AcceptLocal,
                Some(ConflictAnswer::Remote) => return ConflictChoice::AcceptRemote,
                Some(ConflictAnswer::Skip) => return ConflictChoice::Skip,
                Some(ConflictAnswer::Manual(file)) => match tokio::fs::read(&file).await {
                    Ok(merged) => return ConflictChoice::Manual(merged),
                    Err(e) => warn!("Cannot read merged file {}: {}", file.display(), e),
                },
                None => println!("Unrecognized answer."),
            }
        }
    }
}

/// Prints notifications to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        println!("{}", message);
    }
}
