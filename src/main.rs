//! # PostgreSQL Extraction Benchmark (Rust)
//!
//! Runs the cursor, keyset, offset/limit and COPY extraction strategies
//! concurrently against `pgbench_accounts` and prints one line per strategy as
//! each one finishes.

use clap::Parser;
use log::{debug, error, info};
use pg_extract_bench::application::harness::BenchmarkHarness;
use pg_extract_bench::application::report::{build_report, write_report};
use pg_extract_bench::application::runtime::RuntimeContext;
use pg_extract_bench::application::validation::{source_reference, verify_artifacts};
use pg_extract_bench::config::{AppConfig, CliArgs};
use pg_extract_bench::infrastructure::local_storage::csv_sink::OutputLayout;
use std::process;
use std::time::Instant;

fn main() {
    // 1. Initialize Logging
    env_logger::init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Load Config
    let mut config = if let Some(config_path) = &args.config {
        match AppConfig::from_file(config_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config: {}", e);
                process::exit(1);
            }
        }
    } else {
        AppConfig::default_from_cli(&args)
    };

    // Merge CLI overrides
    config.merge_cli(&args);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    let bounds = match config.scan_bounds() {
        Ok(b) => b,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let layout = OutputLayout::new(&config.benchmark.output_dir);
    if let Err(e) = std::fs::create_dir_all(layout.dir()) {
        error!(
            "Unable to create output directory {}: {}",
            layout.dir().display(),
            e
        );
        process::exit(1);
    }

    // 4. Initialize Hexagonal Components
    let ctx = match RuntimeContext::init(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Initialization failed: {}", e);
            process::exit(1);
        }
    };

    let harness = match BenchmarkHarness::new(
        ctx.source.clone(),
        bounds,
        layout,
        config.strategies(),
    ) {
        Ok(h) => h,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    // 5. Run Benchmark
    info!(
        "Extracting aid <= {} in batches of {} with {} strategies...",
        bounds.limit,
        bounds.batch_size,
        harness.strategies().len()
    );
    let start_time = Instant::now();
    let results = match harness.run(|r| println!("{}", r.console_line())) {
        Ok(r) => r,
        Err(e) => {
            error!("Benchmark failed: {}", e);
            process::exit(1);
        }
    };
    let duration_secs = start_time.elapsed().as_secs_f64();

    if let Some(pool) = &ctx.pool {
        let state = pool.state();
        debug!(
            "Pool state: {} connections, {} idle",
            state.connections, state.idle_connections
        );
    }

    // 6. Verify Artifacts
    let checks = if config.verify_enabled() {
        match source_reference(ctx.source.as_ref(), &bounds) {
            Ok(reference) => verify_artifacts(&results, &bounds, Some(&reference)),
            Err(e) => {
                error!("{}; comparing artifacts with each other only", e);
                verify_artifacts(&results, &bounds, None)
            }
        }
    } else {
        Vec::new()
    };

    // 7. Write Report
    if config.report_enabled() {
        let report = build_report(&results, &checks, &bounds, duration_secs);
        if let Err(e) = write_report(harness.layout().dir(), &report) {
            error!("Failed to write report: {}", e);
        }
    }
}
