//! Full-load and incremental command implementation.

use super::validate::print_report;
use super::{open_source, open_target, settle};
use serde::Serialize;
use starsync_engine::{EngineConfig, LoadMode, Orchestrator, RunReport};
use starsync_store::format_timestamp;
use std::path::Path;

/// Options shared by `full-load` and `incremental`.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Reconcile after loading.
    pub validate: bool,
    /// Fail if reconciliation finds a mismatch.
    pub fail_on_mismatch: bool,
    /// Output format (text, json).
    pub format: String,
}

/// Summary of one loader, as printed.
#[derive(Debug, Serialize)]
pub struct LoaderSummary {
    /// Target table.
    pub table: String,
    /// Source rows read.
    pub read: u64,
    /// Records written.
    pub written: u64,
    /// Bridge links already present.
    pub unchanged: u64,
    /// Rows skipped for a missing dependency.
    pub skipped: u64,
    /// Watermark after the loader, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    /// Elapsed milliseconds.
    pub elapsed_ms: u64,
}

/// Summary of a run, as printed.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// `full` or `incremental`.
    pub mode: String,
    /// Per-loader summaries in execution order.
    pub loaders: Vec<LoaderSummary>,
    /// Elapsed milliseconds.
    pub elapsed_ms: u64,
}

impl From<&RunReport> for RunSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            mode: report.mode.to_string(),
            loaders: report
                .loaders
                .iter()
                .map(|l| LoaderSummary {
                    table: l.table.to_string(),
                    read: l.read,
                    written: l.written,
                    unchanged: l.unchanged,
                    skipped: l.skipped,
                    watermark: l.watermark_after.map(format_timestamp),
                    elapsed_ms: l.elapsed.as_millis() as u64,
                })
                .collect(),
            elapsed_ms: report.elapsed.as_millis() as u64,
        }
    }
}

/// Runs the full-load or incremental command.
pub fn run(
    source: &Path,
    target: &Path,
    mode: LoadMode,
    options: &LoadOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::new()
        .with_validation(options.validate)
        .with_fail_on_mismatch(options.fail_on_mismatch);
    let orchestrator = Orchestrator::new(config, open_source(source)?, open_target(target)?);

    let result = orchestrator.run(mode);
    let report = settle(result, orchestrator.close())?;

    let summary = RunSummary::from(&report);
    match options.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            print_text_output(&summary);
        }
    }
    if let Some(reconciliation) = &report.reconciliation {
        print_report(reconciliation, &options.format)?;
    }
    Ok(())
}

fn print_text_output(summary: &RunSummary) {
    println!("=== {} load ===", summary.mode);
    println!(
        "{:<22} {:>8} {:>8} {:>9} {:>8}  watermark",
        "table", "read", "written", "unchanged", "skipped"
    );
    for l in &summary.loaders {
        println!(
            "{:<22} {:>8} {:>8} {:>9} {:>8}  {}",
            l.table,
            l.read,
            l.written,
            l.unchanged,
            l.skipped,
            l.watermark.as_deref().unwrap_or("-")
        );
    }
    println!("Completed in {} ms", summary.elapsed_ms);
}
