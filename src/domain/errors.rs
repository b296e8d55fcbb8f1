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

//! Core error definitions for the extraction benchmark.
//!
//! This module provides a centralized `BenchError` enum and a `Result` type
//! used throughout the application to handle PostgreSQL, I/O, CSV and logic
//! errors.

use thiserror::Error;

/// Error types encountered while configuring or running the benchmark.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Data source error: {0}")]
    SourceError(String),

    #[error("Extraction failed for {strategy}: {reason}")]
    ExtractionError { strategy: String, reason: String },

    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] postgres::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<BenchError>,
    },
}

impl From<r2d2::Error> for BenchError {
    fn from(e: r2d2::Error) -> Self {
        BenchError::PoolError(e.to_string())
    }
}

/// A specialized Result type for the extraction benchmark.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Attaches a description of the failing step to an error.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BenchError>,
{
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| BenchError::Context {
            context: context.to_string(),
            source: Box::new(e.into()),
        })
    }
}
