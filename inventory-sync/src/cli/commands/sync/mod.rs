//! The `sync` command: arguments and handler

pub mod handler;

use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};

use crate::sync::{ConflictResolution, SyncDirection};

pub use handler::handle_sync_command;

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Plan and report without writing to either backend
    #[arg(long)]
    pub dry_run: bool,

    /// Which way changes may flow (overrides the config file)
    #[arg(long, value_enum)]
    pub direction: Option<SyncDirection>,

    /// How conflicting items are resolved (overrides the config file)
    #[arg(long, value_enum)]
    pub conflict_resolution: Option<ConflictResolution>,

    /// Write the sync report to this file
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Report file format; inferred from the output extension when omitted
    #[arg(long, value_enum, requires = "output")]
    pub format: Option<OutputFormat>,

    /// Config file (default: <config dir>/inventory-sync/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Report export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    /// `csv` for a `.csv` path, `json` for anything else
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Json,
        }
    }
}
