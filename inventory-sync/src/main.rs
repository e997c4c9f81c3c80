//! inventory-sync: keep the Inventory Service and the Lab Registry in step
//!
//! Exit codes: 0 when every action succeeded, 1 when an action failed or the
//! run was cancelled, 2 when the run could not start or read a backend.

use clap::Parser;
use colored::*;
use std::process::ExitCode;

mod api;
mod cli;
mod config;
mod sync;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli::commands::sync::handle_sync_command(cli.sync).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            log::debug!("Fatal: {:?}", err);
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}
