//! In-process implementation of `RowSource`.
//!
//! Backs synthetic benchmark runs (`--synthetic-rows`) and the test suite.
//! The table is an ordered map keyed by `aid`, so every query shape the
//! strategies issue can be answered with a range scan.

use crate::domain::entities::{AccountRow, ScanBounds};
use crate::domain::errors::{BenchError, Result};
use crate::ports::row_source::{RowSource, ServerCursor, SourceStats};
use csv::WriterBuilder;
use log::debug;
use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Accounts per branch in the pgbench layout.
const ACCOUNTS_PER_BRANCH: i64 = 100_000;

/// The kind of round-trip a fault is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCall {
    /// `ServerCursor::fetch_next`
    CursorFetch,
    /// `RowSource::fetch_after`
    KeysetPage,
    /// `RowSource::fetch_page`
    OffsetPage,
    /// One row streamed by `RowSource::copy_out`
    CopyRow,
    /// Commit at the end of a successful `RowSource::with_cursor` scan
    Commit,
}

/// Fails the `after`-th+1 call of one kind, simulating a connection that
/// breaks mid-scan. Earlier calls succeed.
#[derive(Debug, Clone, Copy)]
pub struct FaultPlan {
    pub call: SourceCall,
    pub after: usize,
}

/// Ordered in-memory `pgbench_accounts` table.
pub struct InMemoryRowSource {
    rows: BTreeMap<i64, AccountRow>,
    fault: Option<FaultPlan>,
    calls: AtomicUsize,
}

impl InMemoryRowSource {
    pub fn from_rows(rows: impl IntoIterator<Item = AccountRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.aid, r)).collect(),
            fault: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// `count` accounts keyed `1..=count`, laid out the way `pgbench -i`
    /// populates them (zero balances, 100k accounts per branch).
    pub fn pgbench_accounts(count: i64) -> Self {
        Self::from_rows((1..=count).map(|aid| {
            AccountRow::new(aid, (aid - 1) / ACCOUNTS_PER_BRANCH + 1, 0)
        }))
    }

    pub fn with_fault(mut self, fault: FaultPlan) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_fault(&self, call: SourceCall) -> Result<()> {
        match self.fault {
            Some(plan) if plan.call == call => {
                let seen = self.calls.fetch_add(1, Ordering::SeqCst);
                if seen >= plan.after {
                    return Err(BenchError::SourceError(format!(
                        "connection closed during {:?} #{}",
                        call,
                        seen + 1
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn bounded(&self, bounds: &ScanBounds) -> impl Iterator<Item = &AccountRow> {
        self.rows
            .range((Bound::Unbounded, Bound::Included(bounds.limit)))
            .map(|(_, row)| row)
    }

    fn page_len(bounds: &ScanBounds) -> usize {
        usize::try_from(bounds.batch_size).unwrap_or(usize::MAX)
    }
}

impl RowSource for InMemoryRowSource {
    fn with_cursor(
        &self,
        bounds: &ScanBounds,
        scan: &mut dyn FnMut(&mut dyn ServerCursor) -> Result<u64>,
    ) -> Result<u64> {
        let mut cursor = MemoryCursor {
            source: self,
            snapshot: self.bounded(bounds).copied().collect(),
            position: 0,
            batch: Self::page_len(bounds),
        };
        let res = scan(&mut cursor)?;
        self.check_fault(SourceCall::Commit)?;
        debug!("in-memory cursor closed at row {}", cursor.position);
        Ok(res)
    }

    fn fetch_after(&self, bounds: &ScanBounds, watermark: i64) -> Result<Vec<AccountRow>> {
        self.check_fault(SourceCall::KeysetPage)?;
        if watermark >= bounds.limit {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .range((Bound::Excluded(watermark), Bound::Included(bounds.limit)))
            .map(|(_, row)| *row)
            .take(Self::page_len(bounds))
            .collect())
    }

    fn fetch_page(&self, bounds: &ScanBounds, offset: i64) -> Result<Vec<AccountRow>> {
        self.check_fault(SourceCall::OffsetPage)?;
        let skip = usize::try_from(offset).map_err(|_| {
            BenchError::SourceError(format!("OFFSET must not be negative, got {}", offset))
        })?;
        Ok(self
            .bounded(bounds)
            .skip(skip)
            .take(Self::page_len(bounds))
            .copied()
            .collect())
    }

    fn copy_out(&self, bounds: &ScanBounds, out: &mut dyn Write) -> Result<u64> {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
        let mut rows = 0;
        for row in self.bounded(bounds) {
            self.check_fault(SourceCall::CopyRow)?;
            wtr.serialize(row)?;
            rows += 1;
        }
        wtr.flush()?;
        Ok(rows)
    }

    fn source_stats(&self, bounds: &ScanBounds) -> Result<SourceStats> {
        let mut stats = SourceStats {
            row_count: 0,
            key_sum: 0,
            value_sum: 0,
        };
        for row in self.bounded(bounds) {
            stats.row_count += 1;
            stats.key_sum = stats
                .key_sum
                .checked_add(row.aid)
                .ok_or_else(|| BenchError::SourceError("key sum overflows bigint".into()))?;
            stats.value_sum = stats
                .value_sum
                .checked_add(row.abalance)
                .ok_or_else(|| BenchError::SourceError("value sum overflows bigint".into()))?;
        }
        Ok(stats)
    }
}

/// Snapshot taken when the cursor opens, like a transaction-scoped cursor.
struct MemoryCursor<'a> {
    source: &'a InMemoryRowSource,
    snapshot: Vec<AccountRow>,
    position: usize,
    batch: usize,
}

impl ServerCursor for MemoryCursor<'_> {
    fn fetch_next(&mut self) -> Result<Vec<AccountRow>> {
        self.source.check_fault(SourceCall::CursorFetch)?;
        let end = self.position.saturating_add(self.batch).min(self.snapshot.len());
        let batch = self.snapshot[self.position..end].to_vec();
        self.position = end;
        Ok(batch)
    }
}
