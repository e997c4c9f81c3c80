//! Sync report
//!
//! The executor records one entry per processed action. Reports can be
//! summarized for the terminal or exported as JSON or CSV.

use anyhow::{Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::types::SyncAction;

/// What happened to one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The backend accepted the change (or already had it)
    Applied,
    /// Computed but not sent, because the run was a dry run
    DryRun,
    /// A planned skip, carried out in a real run
    Skipped,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Applied => "applied",
            SyncOutcome::DryRun => "dry-run",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

/// One action and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub action: SyncAction,
    pub outcome: SyncOutcome,
}

/// Ordered record of everything a run did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    entries: Vec<ReportEntry>,
    dry_run: bool,
    /// Set when cancellation stopped the run before every action was processed
    cancelled: bool,
}

impl SyncReport {
    pub fn new(entries: Vec<ReportEntry>, dry_run: bool, cancelled: bool) -> Self {
        Self {
            entries,
            dry_run,
            cancelled,
        }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_failed())
    }

    /// A run succeeds when nothing failed and it ran to completion
    pub fn is_success(&self) -> bool {
        !self.has_failures() && !self.cancelled
    }

    pub fn summary(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for entry in &self.entries {
            match (&entry.action, &entry.outcome) {
                (_, SyncOutcome::Failed(_)) => summary.failed += 1,
                (_, SyncOutcome::DryRun) => match entry.action {
                    SyncAction::Skip { .. } => summary.skipped += 1,
                    _ => summary.planned += 1,
                },
                (SyncAction::CreateIn { .. }, _) => summary.created += 1,
                (SyncAction::UpdateIn { .. }, _) => summary.updated += 1,
                (SyncAction::Skip { .. }, _) => summary.skipped += 1,
            }
        }
        summary
    }

    /// Write the report as pretty JSON
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize sync report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;
        log::info!("Sync report written to: {}", path.display());
        Ok(())
    }

    /// Write one CSV row per action
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;

        writer.write_record(["action", "target", "identity_key", "detail", "outcome", "reason"])?;
        for entry in &self.entries {
            let target = entry.action.target().map(|t| t.label()).unwrap_or("");
            let detail = match &entry.action {
                SyncAction::CreateIn { item, .. } => item.attributes.keys().cloned().collect::<Vec<_>>().join(";"),
                SyncAction::UpdateIn { field_changes, .. } => {
                    field_changes.keys().cloned().collect::<Vec<_>>().join(";")
                }
                SyncAction::Skip { reason, .. } => reason.clone(),
            };
            let reason = match &entry.outcome {
                SyncOutcome::Failed(reason) => reason.as_str(),
                _ => "",
            };
            writer.write_record([
                entry.action.kind(),
                target,
                entry.action.identity_key(),
                detail.as_str(),
                entry.outcome.label(),
                reason,
            ])?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;
        log::info!("Sync report written to: {}", path.display());
        Ok(())
    }

    /// Print one line per entry
    pub fn print(&self) {
        for entry in self.entries() {
            let outcome = match &entry.outcome {
                SyncOutcome::Applied => "APPLIED".green(),
                SyncOutcome::DryRun => "DRY-RUN".cyan(),
                SyncOutcome::Skipped => "SKIPPED".yellow(),
                SyncOutcome::Failed(_) => "FAILED".red().bold(),
            };
            match &entry.outcome {
                SyncOutcome::Failed(reason) => {
                    println!("{:>8}  {} ({})", outcome, entry.action, reason.dimmed())
                }
                _ => println!("{:>8}  {}", outcome, entry.action),
            }
        }
    }
}

/// Summary counts for a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Creates and updates a dry run would have sent
    pub planned: usize,
}

impl SyncSummary {
    pub fn print(&self, dry_run: bool) {
        println!("{}", "SYNC SUMMARY".bold());
        println!("  Created: {}", self.created.to_string().green());
        println!("  Updated: {}", self.updated.to_string().green());
        println!("  Skipped: {}", self.skipped.to_string().yellow());
        let failed = if self.failed > 0 {
            self.failed.to_string().red().bold()
        } else {
            self.failed.to_string().normal()
        };
        println!("  Failed:  {}", failed);
        if dry_run {
            println!("  Planned: {} {}", self.planned.to_string().cyan(), "(dry run, nothing sent)".dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{Attributes, InventoryItem, SourceSystem};
    use chrono::{DateTime, Utc};

    fn create(key: &str) -> SyncAction {
        SyncAction::CreateIn {
            target: SourceSystem::LabRegistry,
            item: InventoryItem {
                identity_key: key.to_string(),
                attributes: Attributes::new(),
                source_system: SourceSystem::InventoryService,
                last_modified: DateTime::<Utc>::default(),
                raw_id: "1".to_string(),
            },
        }
    }

    fn update(key: &str) -> SyncAction {
        SyncAction::UpdateIn {
            target: SourceSystem::InventoryService,
            identity_key: key.to_string(),
            raw_id: "9".to_string(),
            field_changes: Attributes::new(),
        }
    }

    fn skip(key: &str) -> SyncAction {
        SyncAction::Skip {
            identity_key: key.to_string(),
            reason: "unresolved conflict".to_string(),
        }
    }

    fn entry(action: SyncAction, outcome: SyncOutcome) -> ReportEntry {
        ReportEntry { action, outcome }
    }

    #[test]
    fn test_summary_counts() {
        let report = SyncReport::new(
            vec![
                entry(create("a"), SyncOutcome::Applied),
                entry(update("b"), SyncOutcome::Applied),
                entry(update("c"), SyncOutcome::Failed("backend rejected request".to_string())),
                entry(skip("d"), SyncOutcome::Skipped),
            ],
            false,
            false,
        );

        assert_eq!(
            report.summary(),
            SyncSummary {
                created: 1,
                updated: 1,
                skipped: 1,
                failed: 1,
                planned: 0,
            }
        );
        assert!(report.has_failures());
        assert!(!report.is_success());
    }

    #[test]
    fn test_dry_run_summary() {
        let report = SyncReport::new(
            vec![
                entry(create("a"), SyncOutcome::DryRun),
                entry(skip("b"), SyncOutcome::DryRun),
            ],
            true,
            false,
        );
        let summary = report.summary();
        assert_eq!(summary.planned, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.created, 0);
        assert!(report.is_success());
    }

    #[test]
    fn test_cancelled_run_is_not_success() {
        let report = SyncReport::new(vec![entry(create("a"), SyncOutcome::Applied)], false, true);
        assert!(!report.has_failures());
        assert!(!report.is_success());
    }

    #[test]
    fn test_export_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let report = SyncReport::new(
            vec![
                entry(create("a"), SyncOutcome::Applied),
                entry(update("b"), SyncOutcome::Failed("HTTP 400: bad, worse".to_string())),
            ],
            false,
            false,
        );

        let json_path = dir.path().join("report.json");
        report.export_json(&json_path).unwrap();
        let parsed: SyncReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed, report);

        let csv_path = dir.path().join("report.csv");
        report.export_csv(&csv_path).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "create");
        assert_eq!(&rows[0][1], "Lab Registry");
        assert_eq!(&rows[1][4], "failed");
        assert_eq!(&rows[1][5], "HTTP 400: bad, worse");
    }
}
