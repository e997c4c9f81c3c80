//! Sync command handler

use anyhow::{Context, Result};
use colored::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::{OutputFormat, SyncArgs};
use crate::api::{InventoryServiceClient, LabRegistryClient};
use crate::config::{Config, Credentials};
use crate::sync::{Backends, SyncRun, run_sync};

/// Run one sync. Returns whether the run succeeded: nothing failed and it
/// was not cancelled. Startup and fetch problems are errors.
pub async fn handle_sync_command(args: SyncArgs) -> Result<bool> {
    if args.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(args.config.as_deref())?;
    let mut settings = config.settings();
    if let Some(direction) = args.direction {
        settings.policy.direction = direction;
    }
    if let Some(resolution) = args.conflict_resolution {
        settings.policy.conflict_resolution = resolution;
    }

    let credentials = Credentials::from_env(&config)?;

    let inventory = InventoryServiceClient::new(
        credentials.inventory_api_url.as_str(),
        credentials.inventory_api_key.as_str(),
        Duration::from_secs(config.inventory_service.timeout_secs),
    )?;
    let registry = LabRegistryClient::new(
        credentials.registry_api_url.as_str(),
        credentials.registry_api_key.as_str(),
        Duration::from_secs(config.lab_registry.timeout_secs),
    )?;

    inventory
        .connect()
        .await
        .context("Failed to connect to the Inventory Service")?;

    let backends = Backends::new(Arc::new(inventory), Arc::new(registry));

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, finishing in-flight calls and stopping");
                cancel.cancel();
            }
        }
    });

    if args.dry_run {
        println!("{}", "Dry run: no changes will be written".cyan().bold());
    }
    println!(
        "Syncing ({}, {})",
        settings.policy.direction.label().bright_white(),
        settings.policy.conflict_resolution.label().bright_white()
    );
    println!();

    let start = Instant::now();
    let result = run_sync(&backends, &settings, args.dry_run, &cancel).await;
    signal_task.abort();
    let run = result?;

    print_run(&run);
    println!("{}", format!("Finished in {:.1}s", start.elapsed().as_secs_f64()).dimmed());

    if let Some(path) = &args.output {
        match args.format.unwrap_or_else(|| OutputFormat::for_path(path)) {
            OutputFormat::Json => run.report.export_json(path)?,
            OutputFormat::Csv => run.report.export_csv(path)?,
        }
        println!("Report saved to: {}", path.display().to_string().bright_green());
    }

    Ok(run.report.is_success())
}

fn print_run(run: &SyncRun) {
    println!("{} {}", "Diff:".bold(), run.stats);
    println!();
    run.report.print();
    println!();
    run.report.summary().print(run.report.is_dry_run());
    if run.report.is_cancelled() {
        println!("{}", "Run cancelled before all actions were processed".yellow().bold());
    }
    if !run.rejected.is_empty() {
        println!(
            "  Malformed records excluded: {}",
            run.rejected.len().to_string().yellow()
        );
        for err in &run.rejected {
            println!("    {}", err.to_string().dimmed());
        }
    }
}
