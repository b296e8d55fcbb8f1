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

//! # Row Source Port
//!
//! This Port defines the query interface the extraction strategies talk to.
//! It doesn't care IF the rows come from PostgreSQL or from an in-memory
//! table used for synthetic runs and tests. Each method is one kind of
//! round-trip; the strategies own the loops around them.

use crate::domain::entities::{AccountRow, ScanBounds};
use crate::domain::errors::Result;
use serde::Serialize;
use std::io::Write;

/// A server-side cursor opened by [`RowSource::with_cursor`].
pub trait ServerCursor {
    /// Fetches the next `batch_size` rows. An empty batch means exhausted.
    fn fetch_next(&mut self) -> Result<Vec<AccountRow>>;
}

/// Aggregates over the bounded range, used to verify artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub row_count: i64,
    pub key_sum: i64,
    pub value_sum: i64,
}

/// `RowSource` must be `Send + Sync`: one instance is shared by every
/// strategy thread, each of which acquires its own connection.
pub trait RowSource: Send + Sync {
    /// Opens a private transaction and a cursor over
    /// `aid <= limit ORDER BY aid`, then runs `scan` against it.
    ///
    /// The cursor is closed and the transaction committed only when `scan`
    /// returns `Ok`; any error rolls the transaction back. Returns whatever
    /// `scan` returned.
    fn with_cursor(
        &self,
        bounds: &ScanBounds,
        scan: &mut dyn FnMut(&mut dyn ServerCursor) -> Result<u64>,
    ) -> Result<u64>;

    /// One keyset page: `aid > watermark AND aid <= limit`, ascending,
    /// at most `batch_size` rows.
    fn fetch_after(&self, bounds: &ScanBounds, watermark: i64) -> Result<Vec<AccountRow>>;

    /// One OFFSET/LIMIT page of the bounded, ascending range.
    fn fetch_page(&self, bounds: &ScanBounds, offset: i64) -> Result<Vec<AccountRow>>;

    /// Streams the whole bounded, ascending range as CSV into `out`.
    /// Returns the number of rows written.
    fn copy_out(&self, bounds: &ScanBounds, out: &mut dyn Write) -> Result<u64>;

    /// Count and sums over the bounded range.
    fn source_stats(&self, bounds: &ScanBounds) -> Result<SourceStats>;
}
