//! Validate command implementation.

use super::{open_source, open_target, settle};
use starsync_engine::{
    default_specs, parse_specs, EngineConfig, Orchestrator, ReconciliationReport,
    ReconciliationSpec,
};
use std::path::Path;

/// Runs the validate command.
pub fn run(
    source: &Path,
    target: &Path,
    specs: Option<&Path>,
    fail_on_mismatch: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let specs = load_specs(specs)?;
    let orchestrator = Orchestrator::new(
        EngineConfig::new().with_specs(specs),
        open_source(source)?,
        open_target(target)?,
    );
    let result = orchestrator.reconcile();
    let report = settle(result, orchestrator.close())?;

    print_report(&report, format)?;
    if fail_on_mismatch {
        report.fail_on_mismatch()?;
    }
    Ok(())
}

fn load_specs(path: Option<&Path>) -> Result<Vec<ReconciliationSpec>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read specs file {:?}: {e}", path))?;
            Ok(parse_specs(&json)?)
        }
        None => Ok(default_specs()),
    }
}

/// Prints a reconciliation report as text or JSON.
pub fn print_report(report: &ReconciliationReport, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        _ => {
            print!("{}", render_text(report));
        }
    }
    Ok(())
}

fn render_text(report: &ReconciliationReport) -> String {
    let mut out = String::from("--- Validation Results ---\n");
    for table in &report.tables {
        if let Some(error) = &table.error {
            out.push_str(&format!("ERROR    {}: {error}\n", table.table));
            continue;
        }
        if let Some(count) = &table.count {
            out.push_str(&format!(
                "{:<8} {}: source={} target={} ({:.1}% diff)\n",
                status(count.passed()),
                table.table,
                count.source,
                count.target,
                count.percent_diff * 100.0
            ));
        }
        for aggregate in &table.aggregates {
            let c = &aggregate.comparison;
            out.push_str(&format!(
                "{:<8} {}.{}: source={:.2} target={:.2} ({:.1}% diff)\n",
                status(c.passed()),
                table.table,
                aggregate.name,
                c.source,
                c.target,
                c.percent_diff * 100.0
            ));
        }
    }
    if report.passed() {
        out.push_str("All validation checks passed\n");
    } else {
        out.push_str(&format!(
            "Validation found inconsistencies in: {}\n",
            report.failures().join(", ")
        ));
    }
    out
}

fn status(passed: bool) -> &'static str {
    if passed {
        "OK"
    } else {
        "MISMATCH"
    }
}
