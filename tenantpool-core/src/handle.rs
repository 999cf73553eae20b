//! Per-tenant pool handle.

use crate::args::{CommandTag, PoolStats, Rows, SingleRow, SqlArg};
use crate::backend::Backend;
use crate::pg::PgBackend;
use crate::traced::Traced;

/// One tenant's pool, with traced `query_row`, `query`, `exec` and `begin`.
///
/// The handle owns the underlying pool, never individual connections;
/// each call leases a connection for its own duration. Errors come back
/// exactly as the pool produced them.
///
/// Cancel an operation by dropping its future; bound it with
/// `tokio::time::timeout`. The handle adds no deadline of its own.
#[derive(Debug)]
pub struct PoolHandle<B: Backend = PgBackend> {
    backend: Traced<B>,
}

impl<B: Backend> PoolHandle<B> {
    pub fn new(project: impl Into<String>, backend: B) -> Self {
        Self {
            backend: Traced::new(project, backend),
        }
    }

    /// Tenant this handle was built for (used to label spans).
    pub fn project(&self) -> &str {
        self.backend.project()
    }

    /// The raw backend, bypassing tracing.
    pub fn backend(&self) -> &B {
        self.backend.inner()
    }

    /// Run a statement expected to return a single row.
    ///
    /// Never fails here; read the returned [`SingleRow`] to see the row,
    /// `RowNotFound`, or the database error.
    pub async fn query_row(&self, statement: &str, args: &[SqlArg]) -> SingleRow<B::Row> {
        SingleRow::new(self.backend.query_row(statement, args).await)
    }

    pub async fn query(&self, statement: &str, args: &[SqlArg]) -> Result<Rows<B::Row>, sqlx::Error> {
        self.backend.query(statement, args).await.map(Rows::new)
    }

    pub async fn exec(&self, statement: &str, args: &[SqlArg]) -> Result<CommandTag, sqlx::Error> {
        self.backend.exec(statement, args).await
    }

    pub async fn begin(&self) -> Result<B::Transaction, sqlx::Error> {
        self.backend.begin().await
    }

    pub fn stats(&self) -> PoolStats {
        self.backend.stats()
    }

    /// Close the underlying pool. Registry removal does not do this.
    pub async fn close(&self) {
        self.backend.close().await
    }
}
