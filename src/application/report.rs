//! Writes the JSON run report next to the artifacts.

use crate::application::validation::ArtifactCheck;
use crate::domain::entities::{ScanBounds, StrategyResult};
use crate::domain::errors::{BenchError, Result, ResultExt};
use log::info;
use serde_json::{json, Value};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Builds the report document. `checks` is empty when verification did not run.
pub fn build_report(
    results: &[StrategyResult],
    checks: &[ArtifactCheck],
    bounds: &ScanBounds,
    duration_secs: f64,
) -> Value {
    let success = results.iter().filter(|r| r.is_success()).count();
    let failed = results.len() - success;
    let total_rows: u64 = results
        .iter()
        .filter_map(|r| r.stats.as_ref())
        .map(|s| s.rows)
        .sum();

    let details: Vec<Value> = results
        .iter()
        .map(|r| {
            let check = checks.iter().find(|c| c.strategy == r.strategy);
            json!({
                "strategy": r.strategy.name(),
                "status": if r.is_success() { "SUCCESS" } else { "FAILED" },
                "rows": r.stats.as_ref().map(|s| s.rows),
                "batches": r.stats.as_ref().map(|s| s.batches),
                "duration_seconds": r.stats.as_ref().map(|s| s.duration),
                "artifact": r.stats.as_ref().map(|s| s.output_file.display().to_string()),
                "error": r.error.as_ref().map(|e| e.to_string()),
                "verification": check,
            })
        })
        .collect();

    json!({
        "summary": {
            "total_strategies": results.len(),
            "success": success,
            "failed": failed,
            "total_rows": total_rows,
            "total_duration_seconds": duration_secs,
            "limit": bounds.limit,
            "batch_size": bounds.batch_size,
            "verified": !checks.is_empty(),
            "verification_passed": checks.iter().all(|c| c.passed()),
        },
        "details": details
    })
}

/// Writes `report_<YYYYmmdd_HHMMSS>.json` into `output_dir`.
pub fn write_report(output_dir: &Path, report: &Value) -> Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let report_path = output_dir.join(format!("report_{}.json", timestamp));

    let file = File::create(&report_path).context("error creating report")?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| BenchError::ArtifactError(e.to_string()))?;

    info!("Report written to {}", report_path.display());
    Ok(report_path)
}
