//! The benchmark harness: launches every strategy concurrently and drains
//! their results in completion order.
//!
//! Lifecycle: `new` validates the shared read-only inputs, `launch` starts one
//! thread per strategy plus a supervisor, and `run` consumes the result
//! channel until the supervisor closes it.

use crate::application::strategies::run_strategy;
use crate::domain::entities::{ScanBounds, Strategy, StrategyResult};
use crate::domain::errors::{BenchError, Result};
use crate::infrastructure::local_storage::csv_sink::OutputLayout;
use crate::ports::row_source::RowSource;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Runs a set of extraction strategies against one shared row source.
pub struct BenchmarkHarness {
    source: Arc<dyn RowSource>,
    bounds: ScanBounds,
    layout: OutputLayout,
    strategies: Vec<Strategy>,
}

impl BenchmarkHarness {
    /// Rejects an empty strategy list and duplicates, since two runs of the
    /// same strategy would write the same artifact.
    pub fn new(
        source: Arc<dyn RowSource>,
        bounds: ScanBounds,
        layout: OutputLayout,
        strategies: Vec<Strategy>,
    ) -> Result<Self> {
        if strategies.is_empty() {
            return Err(BenchError::ConfigError(
                "at least one strategy must be selected".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for strategy in &strategies {
            if !seen.insert(*strategy) {
                return Err(BenchError::ConfigError(format!(
                    "strategy {} selected more than once",
                    strategy
                )));
            }
        }
        Ok(Self {
            source,
            bounds,
            layout,
            strategies,
        })
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn bounds(&self) -> &ScanBounds {
        &self.bounds
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Starts every strategy on its own thread and returns the receiving end
    /// of the shared result channel.
    ///
    /// Exactly one `StrategyResult` per strategy arrives on the channel, in
    /// completion order, after which the channel is closed.
    pub fn launch(&self) -> Result<Receiver<StrategyResult>> {
        let (tx, rx) = unbounded();
        let mut workers = Vec::with_capacity(self.strategies.len());

        for &strategy in &self.strategies {
            let source = Arc::clone(&self.source);
            let layout = self.layout.clone();
            let bounds = self.bounds;
            let worker_tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("extract-{}", strategy))
                .spawn(move || {
                    let result = run_strategy(strategy, source.as_ref(), &bounds, &layout);
                    if worker_tx.send(result).is_err() {
                        warn!("{}: result channel closed before send", strategy);
                    }
                });

            match spawned {
                Ok(handle) => workers.push((strategy, handle)),
                Err(e) => {
                    error!("{}: failed to spawn worker: {}", strategy, e);
                    // The receiver is still held locally, so this cannot fail.
                    let _ = tx.send(StrategyResult::failure(
                        strategy,
                        BenchError::ExtractionError {
                            strategy: strategy.name().to_string(),
                            reason: format!("failed to spawn worker: {}", e),
                        },
                    ));
                }
            }
        }
        info!("Launched {} strategies", workers.len());

        thread::Builder::new()
            .name("extract-supervisor".to_string())
            .spawn(move || supervise(workers, tx))
            .map_err(|e| {
                BenchError::ExtractionError {
                    strategy: "supervisor".to_string(),
                    reason: format!("failed to spawn supervisor: {}", e),
                }
            })?;

        Ok(rx)
    }

    /// Launches all strategies and drains every result, calling `on_result`
    /// for each one as it arrives.
    pub fn run<F>(&self, mut on_result: F) -> Result<Vec<StrategyResult>>
    where
        F: FnMut(&StrategyResult),
    {
        let start_time = Instant::now();
        let rx = self.launch()?;

        let mut results = Vec::with_capacity(self.strategies.len());
        for result in rx.iter() {
            on_result(&result);
            results.push(result);
        }

        let success = results.iter().filter(|r| r.is_success()).count();
        info!(
            "Benchmark finished in {:.2}s. {}/{} strategies successful.",
            start_time.elapsed().as_secs_f64(),
            success,
            results.len()
        );
        Ok(results)
    }
}

/// Waits for every worker, stands in for any that panicked, then closes the
/// channel by dropping the last sender.
fn supervise(workers: Vec<(Strategy, JoinHandle<()>)>, tx: Sender<StrategyResult>) {
    for (strategy, handle) in workers {
        if let Err(payload) = handle.join() {
            let reason = panic_message(payload.as_ref());
            error!("{}: worker panicked: {}", strategy, reason);
            let _ = tx.send(StrategyResult::failure(
                strategy,
                BenchError::ExtractionError {
                    strategy: strategy.name().to_string(),
                    reason: format!("worker panicked: {}", reason),
                },
            ));
        }
    }
    debug!("All strategies signalled completion; closing result channel");
    drop(tx);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::AccountRow;
    use crate::infrastructure::memory::memory_source::{
        FaultPlan, InMemoryRowSource, SourceCall,
    };
    use crate::ports::row_source::{ServerCursor, SourceStats};
    use std::io::Write;

    fn harness(source: Arc<dyn RowSource>, dir: &std::path::Path) -> BenchmarkHarness {
        BenchmarkHarness::new(
            source,
            ScanBounds::new(5000, 500).unwrap(),
            OutputLayout::new(dir),
            Strategy::ALL.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_one_result_per_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Arc::new(InMemoryRowSource::pgbench_accounts(10_000)), dir.path());

        let mut printed = Vec::new();
        let results = h.run(|r| printed.push(r.console_line())).unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(printed.len(), 4);
        let names: HashSet<Strategy> = results.iter().map(|r| r.strategy).collect();
        assert_eq!(names.len(), 4);
        for result in &results {
            assert!(result.is_success(), "{}", result.console_line());
            assert_eq!(result.stats.as_ref().unwrap().rows, 5000);
        }
        for line in &printed {
            assert!(line.contains(" done in "), "{}", line);
            assert!(line.contains(" second, saved to "), "{}", line);
        }
    }

    #[test]
    fn test_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemoryRowSource::pgbench_accounts(10_000).with_fault(FaultPlan {
            call: SourceCall::OffsetPage,
            after: 3,
        });
        let h = harness(Arc::new(source), dir.path());

        let results = h.run(|_| {}).unwrap();
        assert_eq!(results.len(), 4);
        for result in &results {
            if result.strategy == Strategy::OffsetLimit {
                assert!(!result.is_success());
                assert!(result.console_line().contains("offset_limit"));
            } else {
                assert!(result.is_success(), "{}", result.console_line());
                assert_eq!(result.stats.as_ref().unwrap().rows, 5000);
            }
        }
    }

    /// Panics on the keyset path, works everywhere else.
    struct PanickingSource(InMemoryRowSource);

    impl RowSource for PanickingSource {
        fn with_cursor(
            &self,
            bounds: &ScanBounds,
            scan: &mut dyn FnMut(&mut dyn ServerCursor) -> Result<u64>,
        ) -> Result<u64> {
            self.0.with_cursor(bounds, scan)
        }
        fn fetch_after(&self, _bounds: &ScanBounds, _watermark: i64) -> Result<Vec<AccountRow>> {
            panic!("keyset page exploded");
        }
        fn fetch_page(&self, bounds: &ScanBounds, offset: i64) -> Result<Vec<AccountRow>> {
            self.0.fetch_page(bounds, offset)
        }
        fn copy_out(&self, bounds: &ScanBounds, out: &mut dyn Write) -> Result<u64> {
            self.0.copy_out(bounds, out)
        }
        fn source_stats(&self, bounds: &ScanBounds) -> Result<SourceStats> {
            self.0.source_stats(bounds)
        }
    }

    #[test]
    fn test_panicking_strategy_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let source = PanickingSource(InMemoryRowSource::pgbench_accounts(6000));
        let h = harness(Arc::new(source), dir.path());

        let results = h.run(|_| {}).unwrap();
        assert_eq!(results.len(), 4);
        let failed: Vec<&StrategyResult> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].strategy, Strategy::CustomCursor);
        assert!(failed[0].console_line().contains("keyset page exploded"));
    }

    #[test]
    fn test_channel_closes_after_all_results() {
        let dir = tempfile::tempdir().unwrap();
        let h = BenchmarkHarness::new(
            Arc::new(InMemoryRowSource::pgbench_accounts(100)),
            ScanBounds::new(100, 7).unwrap(),
            OutputLayout::new(dir.path()),
            vec![Strategy::Copy, Strategy::Cursor],
        )
        .unwrap();

        let rx = h.launch().unwrap();
        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_ne!(first.strategy, second.strategy);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_rejects_empty_and_duplicate_selection() {
        let source: Arc<dyn RowSource> = Arc::new(InMemoryRowSource::pgbench_accounts(1));
        let bounds = ScanBounds::new(1, 1).unwrap();

        let empty = BenchmarkHarness::new(
            Arc::clone(&source),
            bounds,
            OutputLayout::new("./output"),
            vec![],
        );
        assert!(matches!(empty, Err(BenchError::ConfigError(_))));

        let duplicate = BenchmarkHarness::new(
            source,
            bounds,
            OutputLayout::new("./output"),
            vec![Strategy::Copy, Strategy::Cursor, Strategy::Copy],
        );
        assert!(matches!(duplicate, Err(BenchError::ConfigError(_))));
    }
}
