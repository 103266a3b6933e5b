//! SQL query implementations.
//!
//! Read queries run against the pool; write queries take a connection so
//! they can run inside a transaction.

pub mod app;
pub mod relation;
pub mod scope;

/// Converts an unpaged row count into the `i64` carried by `Page`.
pub(crate) fn total(count: Option<i64>) -> i64 {
    count.unwrap_or(0)
}
