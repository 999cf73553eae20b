//! The raw pool interface a `PoolHandle` drives.
//!
//! A backend owns one underlying connection pool and performs the actual
//! I/O. It knows nothing about tenants or tracing; `Traced` layers spans
//! on top and `PoolHandle` shapes the results for callers.

use async_trait::async_trait;

use crate::args::{CommandTag, PoolStats, SqlArg};

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// A result row as produced by the pool.
    type Row: Send;
    /// An open transaction leased from the pool.
    type Transaction: Send;

    /// Database product, reported as `db.system` on spans.
    const SYSTEM: &'static str;

    /// Run a statement expected to yield at most one row.
    async fn query_row(
        &self,
        statement: &str,
        args: &[SqlArg],
    ) -> Result<Option<Self::Row>, sqlx::Error>;

    /// Run a statement and collect every row.
    async fn query(&self, statement: &str, args: &[SqlArg])
        -> Result<Vec<Self::Row>, sqlx::Error>;

    /// Run a statement that returns no rows.
    async fn exec(&self, statement: &str, args: &[SqlArg]) -> Result<CommandTag, sqlx::Error>;

    /// Start a transaction on a leased connection.
    async fn begin(&self) -> Result<Self::Transaction, sqlx::Error>;

    fn stats(&self) -> PoolStats {
        PoolStats::default()
    }

    /// Close the pool, waiting for leased connections to come back.
    async fn close(&self) {}
}
