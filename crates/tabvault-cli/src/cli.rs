//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const CLI_AFTER_HELP: &str = "\
Data lives in <home>/store, one file per key. <home> is --home, else
$TABVAULT_HOME, else ~/.tabvault. Optional settings go in <home>/config.toml.

Set RUST_LOG=debug (or pass -v) for detailed logs.";

/// tabvault - inspect and maintain a saved-tabs store
#[derive(Parser, Debug)]
#[command(name = "tabvault", version, about = "Inspect and maintain a saved-tabs store", after_help = CLI_AFTER_HELP)]
pub struct Cli {
    /// Override the tabvault home directory
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Show debug logs
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Audit the stored data without changing it
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List saved groups
    List {
        /// Only items whose title or url contains TEXT
        #[arg(short = 's', long = "search", value_name = "TEXT")]
        search: Option<String>,

        /// Bucket groups by age (today, yesterday, ...)
        #[arg(long = "by-time")]
        by_time: bool,
    },

    /// Save a page into the Ungrouped group
    Add {
        url: String,

        /// Page title (defaults to the url)
        #[arg(short = 't', long = "title")]
        title: Option<String>,
    },

    /// Replace all data with the contents of FILE ("-" for stdin)
    Import { file: PathBuf },

    /// Write all data as JSON to FILE, or stdout
    Export { file: Option<PathBuf> },

    /// Back up the current data now
    Backup,

    /// Replace the current data with the last backup
    Restore,

    /// Delete everything, backup included
    Clear {
        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },

    /// Remove a group, or one item from it
    Remove {
        group: String,
        item: Option<String>,
    },

    /// Rename a group
    Rename { group: String, name: String },

    /// Move an item to another group
    Move {
        from: String,
        item: String,
        to: String,
    },
}
