//! # PostgreSQL Extraction Benchmark
//!
//! Exports the first `limit` rows of `pgbench_accounts` to CSV four different
//! ways (server-side cursor, keyset pagination, offset/limit pagination and
//! `COPY ... TO STDOUT`) concurrently and reports how long each one took.
//!
//! The crate follows the **Hexagonal Architecture** (Ports and Adapters): the
//! strategies only see the `RowSource` port, which is backed by PostgreSQL or
//! by an in-memory table.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;
