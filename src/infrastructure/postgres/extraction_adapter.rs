//! Infrastructure adapter that answers `RowSource` calls from PostgreSQL.

use crate::domain::entities::{AccountRow, ScanBounds};
use crate::domain::errors::{Result, ResultExt};
use crate::infrastructure::local_storage::csv_sink::LineCounter;
use crate::infrastructure::postgres::connection_manager::PostgresConnectionManager;
use crate::infrastructure::postgres::sql::{
    copy_statement, SQL_CURSOR_SCAN, SQL_KEYSET_PAGE, SQL_OFFSET_PAGE, SQL_SOURCE_STATS,
};
use crate::ports::row_source::{RowSource, ServerCursor, SourceStats};
use log::debug;
use postgres::{Portal, Row, Transaction};
use r2d2::{Pool, PooledConnection};
use std::io::{self, Write};
use std::sync::Arc;

/// Concrete implementation of `RowSource` for PostgreSQL.
///
/// Every call checks a connection out of the shared pool and returns it when
/// done, so the four strategies never share a session.
pub struct PostgresExtractionAdapter {
    pool: Arc<Pool<PostgresConnectionManager>>,
}

impl PostgresExtractionAdapter {
    pub fn new(pool: Arc<Pool<PostgresConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> Result<PooledConnection<PostgresConnectionManager>> {
        self.pool.get().context("failed to acquire connection")
    }
}

fn decode_row(row: &Row) -> std::result::Result<AccountRow, postgres::Error> {
    Ok(AccountRow {
        aid: row.try_get(0)?,
        bid: row.try_get(1)?,
        abalance: row.try_get(2)?,
    })
}

fn decode_rows(rows: &[Row]) -> Result<Vec<AccountRow>> {
    rows.iter()
        .map(decode_row)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to scan row")
}

/// A portal bound inside the strategy's private transaction.
struct PortalCursor<'a, 't> {
    tx: &'a mut Transaction<'t>,
    portal: Portal,
    max_rows: i32,
}

impl ServerCursor for PortalCursor<'_, '_> {
    fn fetch_next(&mut self) -> Result<Vec<AccountRow>> {
        let rows = self
            .tx
            .query_portal(&self.portal, self.max_rows)
            .context("failed to fetch data")?;
        decode_rows(&rows)
    }
}

impl RowSource for PostgresExtractionAdapter {
    fn with_cursor(
        &self,
        bounds: &ScanBounds,
        scan: &mut dyn FnMut(&mut dyn ServerCursor) -> Result<u64>,
    ) -> Result<u64> {
        let mut conn = self.get_conn()?;
        // Dropping `tx` without commit rolls back.
        let mut tx = conn.transaction().context("failed to begin transaction")?;
        let portal = tx
            .bind(SQL_CURSOR_SCAN, &[&bounds.limit])
            .context("failed to declare cursor")?;

        let fetched = {
            let mut cursor = PortalCursor {
                tx: &mut tx,
                portal,
                max_rows: bounds.max_rows(),
            };
            scan(&mut cursor)?
        };

        tx.commit().context("failed to commit transaction")?;
        debug!("cursor scan committed after {} batches", fetched);
        Ok(fetched)
    }

    fn fetch_after(&self, bounds: &ScanBounds, watermark: i64) -> Result<Vec<AccountRow>> {
        let mut conn = self.get_conn()?;
        let rows = conn
            .query(
                SQL_KEYSET_PAGE,
                &[&watermark, &bounds.limit, &bounds.batch_size],
            )
            .context("failed to fetch data")?;
        decode_rows(&rows)
    }

    fn fetch_page(&self, bounds: &ScanBounds, offset: i64) -> Result<Vec<AccountRow>> {
        let mut conn = self.get_conn()?;
        let rows = conn
            .query(SQL_OFFSET_PAGE, &[&bounds.limit, &offset, &bounds.batch_size])
            .context("failed to fetch data")?;
        decode_rows(&rows)
    }

    fn copy_out(&self, bounds: &ScanBounds, out: &mut dyn Write) -> Result<u64> {
        let mut conn = self.get_conn()?;
        let mut reader = conn
            .copy_out(copy_statement(bounds.limit).as_str())
            .context("failed to start COPY")?;
        let mut counter = LineCounter::new(out);
        io::copy(&mut reader, &mut counter).context("failed to stream COPY output")?;
        debug!("COPY streamed {} bytes", counter.bytes());
        Ok(counter.lines())
    }

    fn source_stats(&self, bounds: &ScanBounds) -> Result<SourceStats> {
        let mut conn = self.get_conn()?;
        let row = conn
            .query_one(SQL_SOURCE_STATS, &[&bounds.limit])
            .context("failed to compute source stats")?;
        Ok(SourceStats {
            row_count: row.try_get(0)?,
            key_sum: row.try_get(1)?,
            value_sum: row.try_get(2)?,
        })
    }
}
