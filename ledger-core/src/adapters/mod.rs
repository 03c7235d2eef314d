//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LedgerStore port
//! - An in-process lock table for row-level exclusion

pub mod duckdb;
pub mod row_locks;
