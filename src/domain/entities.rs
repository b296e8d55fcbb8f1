//! # Domain Entities
//!
//! Entities are the "Nouns" of the benchmark: the rows we extract, the bounds
//! every strategy scans with, the strategies themselves and the results they
//! report back to the harness.

use crate::domain::errors::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A single `pgbench_accounts` row: account id, branch id and balance.
///
/// Field order matches the CSV layout `aid,bid,abalance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRow {
    /// Primary key.
    pub aid: i64,
    /// Grouping key (branch).
    pub bid: i64,
    pub abalance: i64,
}

impl AccountRow {
    pub fn new(aid: i64, bid: i64, abalance: i64) -> Self {
        Self { aid, bid, abalance }
    }
}

/// Read-only scan parameters shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanBounds {
    /// Only rows with `aid <= limit` are extracted.
    pub limit: i64,
    /// Rows requested per round-trip.
    pub batch_size: i64,
}

impl ScanBounds {
    /// Validates and builds the scan parameters.
    pub fn new(limit: i64, batch_size: i64) -> Result<Self> {
        if batch_size < 1 {
            return Err(BenchError::ConfigError(format!(
                "batch size must be at least 1, got {}",
                batch_size
            )));
        }
        if batch_size > i64::from(i32::MAX) {
            return Err(BenchError::ConfigError(format!(
                "batch size must not exceed {}, got {}",
                i32::MAX,
                batch_size
            )));
        }
        Ok(Self { limit, batch_size })
    }

    /// Batch size as the protocol-level row count used by portals.
    pub fn max_rows(&self) -> i32 {
        // ScanBounds::new keeps batch_size within i32.
        i32::try_from(self.batch_size).unwrap_or(i32::MAX)
    }

    /// Whether a key falls inside the extraction bound.
    pub fn admits(&self, aid: i64) -> bool {
        aid <= self.limit
    }
}

/// The four row-retrieval techniques under benchmark.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Transaction-scoped server-side cursor.
    #[value(name = "cursor")]
    Cursor,
    /// Client-driven keyset pagination on the last seen key.
    #[value(name = "custom_cursor")]
    CustomCursor,
    /// OFFSET/LIMIT pagination.
    #[value(name = "offset_limit")]
    OffsetLimit,
    /// Single-pass `COPY ... TO STDOUT`.
    #[value(name = "copy")]
    Copy,
}

impl Strategy {
    /// Every strategy, in launch order.
    pub const ALL: [Strategy; 4] = [
        Strategy::Cursor,
        Strategy::CustomCursor,
        Strategy::OffsetLimit,
        Strategy::Copy,
    ];

    /// Stable identifier, also the artifact file stem.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Cursor => "cursor",
            Strategy::CustomCursor => "custom_cursor",
            Strategy::OffsetLimit => "offset_limit",
            Strategy::Copy => "copy",
        }
    }

    /// Human-readable label used in console output.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Cursor => "cursor",
            Strategy::CustomCursor => "custom cursor",
            Strategy::OffsetLimit => "offset limit",
            Strategy::Copy => "copy",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a successful strategy run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionStats {
    /// Rows written to the artifact.
    pub rows: u64,
    /// Non-empty batches fetched (1 for the bulk export when it returned rows).
    pub batches: u64,
    /// Wall-clock seconds, from strategy start to completion.
    pub duration: f64,
    pub output_file: PathBuf,
}

/// The single terminal report a strategy sends to the harness.
#[derive(Debug)]
pub struct StrategyResult {
    pub strategy: Strategy,
    pub error: Option<BenchError>,
    /// Timing summary; empty on failure.
    pub message: String,
    pub stats: Option<ExtractionStats>,
}

impl StrategyResult {
    /// Helper to create a successful result.
    pub fn success(strategy: Strategy, stats: ExtractionStats) -> Self {
        let message = format!(
            "{} done in {:.2} second, saved to {}",
            strategy.label(),
            stats.duration,
            stats.output_file.display()
        );
        Self {
            strategy,
            error: None,
            message,
            stats: Some(stats),
        }
    }

    /// Helper to create a failure result.
    pub fn failure(strategy: Strategy, error: BenchError) -> Self {
        Self {
            strategy,
            error: Some(error),
            message: String::new(),
            stats: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The line printed for this result: the error text or the success message.
    pub fn console_line(&self) -> String {
        match &self.error {
            Some(e) => e.to_string(),
            None => self.message.clone(),
        }
    }
}
