// tabvault-cli: command-line frontend for tabvault
// Argument parsing, store wiring, terminal output

mod cli;
mod output;

use chrono::Utc;
use clap::Parser;
use cli::{Cli, Command};
use log::{debug, warn};
use std::io::{self, ErrorKind, IsTerminal, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tabvault_core::model::group_by_time;
use tabvault_core::{Config, Item, LoadPhase, LocalBackend, StateStore, resolve_home};

/// Prompt user for confirmation (y/N). Returns true if user confirms.
/// If stdin is not a terminal (piped input), returns false.
fn confirm_action(prompt: &str) -> bool {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return false;
    }

    eprint!("{} [y/N] ", prompt);
    io::stderr().flush().ok();

    let mut input = String::new();
    if stdin.read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn read_payload(path: &Path) -> io::Result<serde_json::Value> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    serde_json::from_str(&text).map_err(|e| {
        io::Error::new(
            ErrorKind::InvalidData,
            format!("{}: not valid JSON: {}", path.display(), e),
        )
    })
}

fn not_found(what: &str) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("{} not found", what))
}

async fn execute(command: Command, store: &StateStore) -> io::Result<()> {
    match command {
        Command::Status { json } => {
            let report = store.check_status().await.map_err(io::Error::other)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).map_err(io::Error::other)?
                );
            } else {
                println!("{}", output::render_status(&report));
            }
        }
        Command::List { search, by_time } => {
            let mut snapshot = store.snapshot().await;
            if let Some(search) = search {
                snapshot.search_query = search;
            }
            let now = Utc::now();
            let groups = snapshot.filtered_groups();
            if by_time {
                for (bucket, members) in group_by_time(&groups, now) {
                    println!("{}", output::render_bucket(bucket, &members, now));
                }
            } else {
                for group in &groups {
                    println!("{}", output::render_group(group, now));
                }
            }
            println!("{}", output::render_stats(&snapshot.stats(now)));
        }
        Command::Add { url, title } => {
            let title = title.unwrap_or_else(|| url.clone());
            let item = Item::new(url, title, None);
            let id = item.id.clone();
            store
                .mutate(|s| s.save_to_ungrouped(vec![item]))
                .await
                .map_err(io::Error::other)?;
            println!("Saved {}", id);
        }
        Command::Import { file } => {
            let payload = read_payload(&file)?;
            let summary = store
                .import_external(&payload)
                .await
                .map_err(io::Error::other)?;
            println!(
                "Imported {} groups with {} items",
                summary.groups, summary.items
            );
            if summary.dropped_items > 0 || summary.dropped_groups > 0 {
                println!(
                    "Skipped {} invalid items and {} empty groups",
                    summary.dropped_items, summary.dropped_groups
                );
            }
        }
        Command::Export { file } => {
            let value = store.export().await.map_err(io::Error::other)?;
            let text = serde_json::to_string_pretty(&value).map_err(io::Error::other)?;
            match file {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{}", text),
            }
        }
        Command::Backup => {
            let backup = store.create_backup().await.map_err(io::Error::other)?;
            println!("Backup written ({} groups)", backup.state.groups.len());
        }
        Command::Restore => {
            if store.restore_from_backup().await.map_err(io::Error::other)? {
                println!("Restored from backup");
            } else {
                return Err(not_found("Backup"));
            }
        }
        Command::Clear { yes } => {
            if !yes && !confirm_action("Delete all saved data, including the backup?") {
                println!("Aborted");
                return Ok(());
            }
            let removed = store.clear().await.map_err(io::Error::other)?;
            println!("Removed {} keys", removed);
        }
        Command::Remove { group, item } => {
            let removed = store
                .mutate(|s| match &item {
                    Some(item) => s.delete_item(&group, item),
                    None => s.delete_group(&group),
                })
                .await
                .map_err(io::Error::other)?;
            if !removed {
                return Err(not_found(match item {
                    Some(_) => "Item",
                    None => "Group",
                }));
            }
            println!("Removed");
        }
        Command::Rename { group, name } => {
            if !store
                .mutate(|s| s.rename_group(&group, &name))
                .await
                .map_err(io::Error::other)?
            {
                return Err(not_found("Group"));
            }
            println!("Renamed");
        }
        Command::Move { from, item, to } => {
            if !store
                .mutate(|s| s.move_item(&from, &item, &to))
                .await
                .map_err(io::Error::other)?
            {
                return Err(not_found("Item or target group"));
            }
            println!("Moved");
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> io::Result<()> {
    let home = resolve_home(cli.home)?;
    let config = Config::load(&home)?;
    debug!("home: {}", home.display());

    let backend = LocalBackend::with_limits(home.join("store"), config.backend.limits());
    let store = StateStore::new(Arc::new(backend), config.storage);

    // status audits what is on disk; everything else works on the loaded model
    if !matches!(cli.command, Command::Status { .. }) {
        let report = store.load().await;
        for fault in &report.faults {
            warn!("{}", fault);
        }
        match report.phase {
            LoadPhase::Failed => {
                return Err(io::Error::other("could not load stored data"));
            }
            LoadPhase::Repaired | LoadPhase::RecoveredFromBackup => {
                eprintln!("[{}]", report.phase);
            }
            _ => {}
        }
    }

    execute(cli.command, &store).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
