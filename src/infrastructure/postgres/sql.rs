//! SQL text issued against `pgbench_accounts`.
//!
//! Every value that varies per call is a bound placeholder except in the COPY
//! statement, which the server does not let us parameterize.

/// Bounded, ordered scan used by the server-side cursor. `$1` = limit.
pub const SQL_CURSOR_SCAN: &str = "SELECT aid::bigint, bid::bigint, abalance::bigint \
     FROM pgbench_accounts \
     WHERE aid <= $1::bigint \
     ORDER BY aid ASC";

/// Keyset page. `$1` = watermark (exclusive), `$2` = limit, `$3` = batch size.
pub const SQL_KEYSET_PAGE: &str = "SELECT aid::bigint, bid::bigint, abalance::bigint \
     FROM pgbench_accounts \
     WHERE aid > $1::bigint AND aid <= $2::bigint \
     ORDER BY aid ASC \
     LIMIT $3::bigint";

/// Offset/limit page. `$1` = limit, `$2` = offset, `$3` = batch size.
pub const SQL_OFFSET_PAGE: &str = "SELECT aid::bigint, bid::bigint, abalance::bigint \
     FROM pgbench_accounts \
     WHERE aid <= $1::bigint \
     ORDER BY aid ASC \
     OFFSET $2::bigint LIMIT $3::bigint";

/// Count and sums of the bounded range. `$1` = limit.
pub const SQL_SOURCE_STATS: &str = "SELECT COUNT(*)::bigint, \
     COALESCE(SUM(aid), 0)::bigint, \
     COALESCE(SUM(abalance), 0)::bigint \
     FROM pgbench_accounts \
     WHERE aid <= $1::bigint";

/// Bulk CSV export of the bounded, ordered range.
///
/// `limit` is a typed integer, so rendering it cannot inject SQL.
pub fn copy_statement(limit: i64) -> String {
    format!(
        "COPY (SELECT aid, bid, abalance FROM pgbench_accounts \
         WHERE aid <= {} ORDER BY aid ASC) TO STDOUT WITH (FORMAT csv)",
        limit
    )
}
