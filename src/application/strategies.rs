//! The four extraction strategies.
//!
//! Each one pulls every row with `aid <= limit` in ascending key order from a
//! `RowSource` and writes it to its own `CsvSink`. They only differ in how
//! rows are requested from the source.

use crate::domain::entities::{ExtractionStats, ScanBounds, Strategy, StrategyResult};
use crate::domain::errors::{BenchError, Result, ResultExt};
use crate::infrastructure::local_storage::csv_sink::{CsvSink, OutputLayout};
use crate::ports::row_source::RowSource;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Instant;

/// Runs one strategy to completion and packages its single terminal result.
///
/// The clock starts before the artifact is created, so file creation and
/// connection checkout count toward the reported duration.
pub fn run_strategy(
    strategy: Strategy,
    source: &dyn RowSource,
    bounds: &ScanBounds,
    layout: &OutputLayout,
) -> StrategyResult {
    let start_time = Instant::now();
    let path = layout.path_for(strategy);
    info!("{} started, writing {}", strategy, path.display());

    let outcome = match strategy {
        Strategy::Cursor => extract_with_cursor(source, bounds, &path),
        Strategy::CustomCursor => extract_with_keyset(source, bounds, &path),
        Strategy::OffsetLimit => extract_with_offset_limit(source, bounds, &path),
        Strategy::Copy => extract_with_copy(source, bounds, &path),
    };

    match outcome {
        Ok((rows, batches)) => {
            let stats = ExtractionStats {
                rows,
                batches,
                duration: start_time.elapsed().as_secs_f64(),
                output_file: path,
            };
            info!(
                "{} finished: {} rows in {} batches ({:.2}s)",
                strategy, rows, batches, stats.duration
            );
            StrategyResult::success(strategy, stats)
        }
        Err(e) => StrategyResult::failure(
            strategy,
            BenchError::ExtractionError {
                strategy: strategy.name().to_string(),
                reason: e.to_string(),
            },
        ),
    }
}

/// Server-side cursor inside one transaction. Returns (rows, batches).
///
/// If the scan or the commit fails the artifact is truncated, so it never
/// holds rows of a transaction that was rolled back.
pub fn extract_with_cursor(
    source: &dyn RowSource,
    bounds: &ScanBounds,
    path: &Path,
) -> Result<(u64, u64)> {
    let mut sink = CsvSink::create(path).context("error creating file")?;

    let scanned = source.with_cursor(bounds, &mut |cursor| {
        let mut batches = 0;
        loop {
            let batch = cursor.fetch_next()?;
            if batch.is_empty() {
                return Ok(batches);
            }
            sink.write_batch(&batch).context("error writing record to CSV")?;
            batches += 1;
            debug!("cursor: batch {} ({} rows)", batches, batch.len());
        }
    });

    match scanned {
        Ok(batches) => {
            let rows = sink.finish().context("error flushing CSV")?;
            Ok((rows, batches))
        }
        Err(e) => {
            let written = sink.rows();
            if let Err(discard_err) = sink.discard() {
                warn!(
                    "cursor: could not truncate {} after rollback: {}",
                    path.display(),
                    discard_err
                );
            } else {
                warn!(
                    "cursor: rolled back, discarded {} rows from {}",
                    written,
                    path.display()
                );
            }
            Err(e)
        }
    }
}

/// Keyset pagination on the last seen key. No transaction; a failing page
/// leaves earlier pages in the artifact.
pub fn extract_with_keyset(
    source: &dyn RowSource,
    bounds: &ScanBounds,
    path: &Path,
) -> Result<(u64, u64)> {
    let mut sink = CsvSink::create(path).context("error creating file")?;
    let mut watermark = i64::MIN;
    let mut batches = 0;

    loop {
        let batch = source.fetch_after(bounds, watermark)?;
        let Some(last) = batch.last() else {
            break;
        };
        sink.write_batch(&batch).context("error writing record to CSV")?;
        watermark = last.aid;
        batches += 1;
        debug!("custom_cursor: batch {} up to aid {}", batches, watermark);
    }

    let rows = sink.finish().context("error flushing CSV")?;
    Ok((rows, batches))
}

/// OFFSET/LIMIT pagination. Each page makes the server walk past every row
/// of the pages before it.
pub fn extract_with_offset_limit(
    source: &dyn RowSource,
    bounds: &ScanBounds,
    path: &Path,
) -> Result<(u64, u64)> {
    let mut sink = CsvSink::create(path).context("error creating file")?;
    let mut offset: i64 = 0;
    let mut batches = 0;

    loop {
        let batch = source.fetch_page(bounds, offset)?;
        if batch.is_empty() {
            break;
        }
        sink.write_batch(&batch).context("error writing record to CSV")?;
        batches += 1;
        debug!("offset_limit: batch {} at offset {}", batches, offset);
        offset = offset.checked_add(bounds.batch_size).ok_or_else(|| {
            BenchError::SourceError(format!("offset overflow after {}", offset))
        })?;
    }

    let rows = sink.finish().context("error flushing CSV")?;
    Ok((rows, batches))
}

/// Single bulk export streamed straight into the artifact.
pub fn extract_with_copy(
    source: &dyn RowSource,
    bounds: &ScanBounds,
    path: &Path,
) -> Result<(u64, u64)> {
    let sink = CsvSink::create(path).context("error creating file")?;
    let rows = sink.pass_through(|out| source.copy_out(bounds, out))?;
    let batches = u64::from(rows > 0);
    Ok((rows, batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::AccountRow;
    use crate::infrastructure::memory::memory_source::{
        FaultPlan, InMemoryRowSource, SourceCall,
    };

    fn read_rows(path: &Path) -> Vec<AccountRow> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.deserialize::<AccountRow>().map(|r| r.unwrap()).collect()
    }

    fn scenario_source() -> InMemoryRowSource {
        InMemoryRowSource::from_rows(
            (1..=10_000).map(|aid| AccountRow::new(aid, aid % 7, aid * 3 - 17)),
        )
    }

    #[test]
    fn test_every_strategy_exports_bounded_ordered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = scenario_source();
        let bounds = ScanBounds::new(5000, 500).unwrap();

        let expected: Vec<AccountRow> =
            (1..=5000).map(|aid| AccountRow::new(aid, aid % 7, aid * 3 - 17)).collect();

        for strategy in Strategy::ALL {
            let result = run_strategy(strategy, &source, &bounds, &layout);
            assert!(result.is_success(), "{}: {}", strategy, result.console_line());

            let stats = result.stats.unwrap();
            assert_eq!(stats.rows, 5000, "{}", strategy);
            assert_eq!(read_rows(&layout.path_for(strategy)), expected, "{}", strategy);
        }
    }

    #[test]
    fn test_batch_counts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = scenario_source();
        let bounds = ScanBounds::new(5000, 500).unwrap();

        let batches = |s| run_strategy(s, &source, &bounds, &layout).stats.unwrap().batches;
        assert_eq!(batches(Strategy::Cursor), 10);
        assert_eq!(batches(Strategy::CustomCursor), 10);
        assert_eq!(batches(Strategy::OffsetLimit), 10);
        assert_eq!(batches(Strategy::Copy), 1);
    }

    #[test]
    fn test_empty_range_produces_empty_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source =
            InMemoryRowSource::from_rows((100..=200).map(|aid| AccountRow::new(aid, 1, 0)));
        let bounds = ScanBounds::new(99, 10).unwrap();

        for strategy in Strategy::ALL {
            let result = run_strategy(strategy, &source, &bounds, &layout);
            assert!(result.is_success(), "{}", strategy);
            assert_eq!(result.stats.unwrap().rows, 0);
            let path = layout.path_for(strategy);
            assert_eq!(std::fs::metadata(&path).unwrap().len(), 0, "{}", strategy);
        }
    }

    #[test]
    fn test_batch_size_of_one_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::pgbench_accounts(50);
        let bounds = ScanBounds::new(25, 1).unwrap();

        for strategy in [Strategy::CustomCursor, Strategy::OffsetLimit, Strategy::Cursor] {
            let result = run_strategy(strategy, &source, &bounds, &layout);
            let stats = result.stats.unwrap();
            assert_eq!(stats.rows, 25);
            assert_eq!(stats.batches, 25);
            let keys: Vec<i64> = read_rows(&layout.path_for(strategy))
                .iter()
                .map(|r| r.aid)
                .collect();
            assert_eq!(keys, (1..=25).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_sparse_and_negative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::from_rows(
            [-40, -3, 0, 9, 10, 250, 251, 9_999]
                .into_iter()
                .map(|aid| AccountRow::new(aid, 1, aid)),
        );
        let bounds = ScanBounds::new(250, 3).unwrap();

        for strategy in Strategy::ALL {
            run_strategy(strategy, &source, &bounds, &layout);
            let keys: Vec<i64> = read_rows(&layout.path_for(strategy))
                .iter()
                .map(|r| r.aid)
                .collect();
            assert_eq!(keys, vec![-40, -3, 0, 9, 10, 250], "{}", strategy);
        }
    }

    #[test]
    fn test_cursor_failure_truncates_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::pgbench_accounts(1000).with_fault(FaultPlan {
            call: SourceCall::CursorFetch,
            after: 3,
        });
        let bounds = ScanBounds::new(1000, 100).unwrap();

        let result = run_strategy(Strategy::Cursor, &source, &bounds, &layout);
        assert!(!result.is_success());
        let line = result.console_line();
        assert!(line.starts_with("Extraction failed for cursor:"), "{}", line);
        assert!(line.contains("connection closed"), "{}", line);

        let path = layout.path_for(Strategy::Cursor);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_cursor_commit_failure_truncates_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::pgbench_accounts(300).with_fault(FaultPlan {
            call: SourceCall::Commit,
            after: 0,
        });
        let bounds = ScanBounds::new(300, 50).unwrap();

        let result = run_strategy(Strategy::Cursor, &source, &bounds, &layout);
        assert!(!result.is_success());
        assert!(result.stats.is_none());
        let line = result.console_line();
        assert!(line.starts_with("Extraction failed for cursor:"), "{}", line);
        assert!(line.contains("Commit"), "{}", line);

        let path = layout.path_for(Strategy::Cursor);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_keyset_failure_keeps_written_pages() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::pgbench_accounts(1000).with_fault(FaultPlan {
            call: SourceCall::KeysetPage,
            after: 2,
        });
        let bounds = ScanBounds::new(1000, 100).unwrap();

        let result = run_strategy(Strategy::CustomCursor, &source, &bounds, &layout);
        assert!(!result.is_success());
        let keys: Vec<i64> = read_rows(&layout.path_for(Strategy::CustomCursor))
            .iter()
            .map(|r| r.aid)
            .collect();
        assert_eq!(keys, (1..=200).collect::<Vec<_>>());
    }

    #[test]
    fn test_offset_failure_keeps_written_pages() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::pgbench_accounts(100).with_fault(FaultPlan {
            call: SourceCall::OffsetPage,
            after: 2,
        });
        let bounds = ScanBounds::new(100, 10).unwrap();

        let result = run_strategy(Strategy::OffsetLimit, &source, &bounds, &layout);
        assert!(!result.is_success());
        let line = result.console_line();
        assert!(line.starts_with("Extraction failed for offset_limit:"), "{}", line);
        assert!(line.contains("OffsetPage #3"), "{}", line);

        let keys: Vec<i64> = read_rows(&layout.path_for(Strategy::OffsetLimit))
            .iter()
            .map(|r| r.aid)
            .collect();
        assert_eq!(keys, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_copy_failure_keeps_partial_stream() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let source = InMemoryRowSource::pgbench_accounts(100).with_fault(FaultPlan {
            call: SourceCall::CopyRow,
            after: 40,
        });
        let bounds = ScanBounds::new(100, 10).unwrap();

        let result = run_strategy(Strategy::Copy, &source, &bounds, &layout);
        assert!(!result.is_success());
        assert!(result.stats.is_none());
        let keys: Vec<i64> = read_rows(&layout.path_for(Strategy::Copy))
            .iter()
            .map(|r| r.aid)
            .collect();
        assert_eq!(keys, (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn test_missing_output_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("not-created"));
        let source = InMemoryRowSource::pgbench_accounts(10);
        let bounds = ScanBounds::new(10, 5).unwrap();

        let result = run_strategy(Strategy::OffsetLimit, &source, &bounds, &layout);
        let line = result.console_line();
        assert!(line.contains("error creating file"), "{}", line);
    }
}
