// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Runtime Context
//!
//! Builds the shared resources that exist for the whole run: the row source
//! every strategy reads from and, for PostgreSQL runs, the `r2d2` connection
//! pool behind it. Failures here are fatal and happen before any strategy is
//! launched.

use crate::config::AppConfig;
use crate::domain::errors::{BenchError, Result};
use crate::infrastructure::memory::memory_source::InMemoryRowSource;
use crate::infrastructure::postgres::connection_manager::PostgresConnectionManager;
use crate::infrastructure::postgres::extraction_adapter::PostgresExtractionAdapter;
use crate::ports::row_source::RowSource;
use log::info;
use r2d2::Pool;
use std::sync::Arc;

/// `RuntimeContext` holds shared resources that exist for the entire life of the app.
pub struct RuntimeContext {
    /// Shared by every strategy thread.
    pub source: Arc<dyn RowSource>,
    /// Present only when running against PostgreSQL.
    pub pool: Option<Arc<Pool<PostgresConnectionManager>>>,
}

impl RuntimeContext {
    /// Builds the row source selected by the configuration.
    pub fn init(config: &AppConfig) -> Result<Self> {
        if let Some(rows) = config.benchmark.synthetic_rows {
            info!("Using synthetic in-memory table with {} rows", rows);
            return Ok(Self {
                source: Arc::new(InMemoryRowSource::pgbench_accounts(rows)),
                pool: None,
            });
        }

        let pg_config = config.database.postgres_config()?;
        let manager = PostgresConnectionManager::new(pg_config);

        // One connection per strategy plus a spare for source statistics.
        let pool_size = config
            .database
            .pool_size
            .unwrap_or(config.strategies().len() as u32 + 1);

        info!(
            "Initializing connection pool ({} connections) for {}...",
            pool_size,
            config.database.get_connection_string()
        );
        if let Some(timeout) = config.database.statement_timeout() {
            info!("Statement timeout: {:?}", timeout);
        }

        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| {
                BenchError::PoolError(format!("Unable to create connection pool: {}", e))
            })?;
        let pool = Arc::new(pool);

        Ok(Self {
            source: Arc::new(PostgresExtractionAdapter::new(Arc::clone(&pool))),
            pool: Some(pool),
        })
    }
}
