//! # Artifact Verification
//!
//! Re-reads every successful artifact and checks it against the invariants
//! all four strategies share:
//!
//! 1. **Bound**: every key is `<= limit`.
//! 2. **Order**: keys are strictly ascending.
//! 3. **Equivalence**: row count, key sum and value sum are identical across
//!    strategies and match the aggregates the data source reports.

use crate::domain::entities::{AccountRow, ScanBounds, Strategy, StrategyResult};
use crate::domain::errors::{BenchError, Result, ResultExt};
use crate::ports::row_source::{RowSource, SourceStats};
use csv::ReaderBuilder;
use log::{info, warn};
use serde::{Serialize, Serializer};
use std::path::Path;

/// Aggregates computed from one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactStats {
    pub row_count: i64,
    #[serde(serialize_with = "serialize_wide")]
    pub key_sum: i128,
    #[serde(serialize_with = "serialize_wide")]
    pub value_sum: i128,
    pub first_key: Option<i64>,
    pub last_key: Option<i64>,
    /// Rows whose key exceeds the limit.
    pub out_of_bound: u64,
    /// Rows whose key is not greater than the previous one.
    pub out_of_order: u64,
}

// Sums fall back to a decimal string once they leave the i64 range.
fn serialize_wide<S: Serializer>(
    value: &i128,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match i64::try_from(*value) {
        Ok(v) => serializer.serialize_i64(v),
        Err(_) => serializer.collect_str(value),
    }
}

impl ArtifactStats {
    fn matches(&self, other: &ArtifactStats) -> bool {
        self.row_count == other.row_count
            && self.key_sum == other.key_sum
            && self.value_sum == other.value_sum
    }

    fn matches_source(&self, source: &SourceStats) -> bool {
        self.row_count == source.row_count
            && self.key_sum == i128::from(source.key_sum)
            && self.value_sum == i128::from(source.value_sum)
    }
}

/// Verification outcome for one strategy's artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactCheck {
    pub strategy: Strategy,
    pub stats: Option<ArtifactStats>,
    /// Empty when the artifact passed every check.
    pub problems: Vec<String>,
}

impl ArtifactCheck {
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Reads an artifact written as `aid,bid,abalance` records.
pub fn scan_artifact(path: &Path, bounds: &ScanBounds) -> Result<ArtifactStats> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .context("error opening artifact")?;

    let mut stats = ArtifactStats {
        row_count: 0,
        key_sum: 0,
        value_sum: 0,
        first_key: None,
        last_key: None,
        out_of_bound: 0,
        out_of_order: 0,
    };

    for record in rdr.deserialize::<AccountRow>() {
        let row = record.context("error reading artifact record")?;
        if !bounds.admits(row.aid) {
            stats.out_of_bound += 1;
        }
        if let Some(prev) = stats.last_key {
            if row.aid <= prev {
                stats.out_of_order += 1;
            }
        }
        stats.first_key.get_or_insert(row.aid);
        stats.last_key = Some(row.aid);
        stats.row_count += 1;
        stats.key_sum += i128::from(row.aid);
        stats.value_sum += i128::from(row.abalance);
    }

    Ok(stats)
}

/// Verifies every successful result's artifact. Failed strategies are
/// skipped. `source` stats, when available, are the reference; otherwise the
/// first successful artifact is.
pub fn verify_artifacts(
    results: &[StrategyResult],
    bounds: &ScanBounds,
    source: Option<&SourceStats>,
) -> Vec<ArtifactCheck> {
    let mut checks = Vec::new();
    let mut reference: Option<(Strategy, ArtifactStats)> = None;

    for result in results.iter().filter(|r| r.is_success()) {
        let Some(output) = result.stats.as_ref().map(|s| &s.output_file) else {
            continue;
        };
        let mut problems = Vec::new();

        let stats = match scan_artifact(output, bounds) {
            Ok(stats) => Some(stats),
            Err(e) => {
                problems.push(e.to_string());
                None
            }
        };

        if let Some(stats) = &stats {
            if stats.out_of_bound > 0 {
                problems.push(format!(
                    "{} rows exceed the limit {}",
                    stats.out_of_bound, bounds.limit
                ));
            }
            if stats.out_of_order > 0 {
                problems.push(format!("{} rows are out of key order", stats.out_of_order));
            }
            match source {
                Some(src) if !stats.matches_source(src) => problems.push(format!(
                    "artifact has {} rows (key sum {}, value sum {}), source has {} rows (key sum {}, value sum {})",
                    stats.row_count,
                    stats.key_sum,
                    stats.value_sum,
                    src.row_count,
                    src.key_sum,
                    src.value_sum
                )),
                Some(_) => {}
                None => match &reference {
                    Some((other, ref_stats)) if !stats.matches(ref_stats) => {
                        problems.push(format!("artifact differs from {}'s", other))
                    }
                    Some(_) => {}
                    None => reference = Some((result.strategy, *stats)),
                },
            }
        }

        for problem in &problems {
            warn!("verify {}: {}", result.strategy, problem);
        }
        checks.push(ArtifactCheck {
            strategy: result.strategy,
            stats,
            problems,
        });
    }

    let passed = checks.iter().filter(|c| c.passed()).count();
    info!("Verified {}/{} artifacts", passed, checks.len());
    checks
}

/// Fetches the reference aggregates from the data source.
pub fn source_reference(source: &dyn RowSource, bounds: &ScanBounds) -> Result<SourceStats> {
    source.source_stats(bounds).map_err(|e| {
        BenchError::ValidationError(format!("failed to compute source stats: {}", e))
    })
}
