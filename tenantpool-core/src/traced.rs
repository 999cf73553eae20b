//! Tracing decorator for a [`Backend`].
//!
//! Each call opens one span named after the operation, tagged with the
//! tenant, the literal statement, and the bound arguments. The span is
//! the child of whatever span the caller is in and closes when the call
//! returns. Spans are observability only: nothing here changes a result
//! or an error.

use async_trait::async_trait;
use tracing::field::Empty;
use tracing::Instrument;

use crate::args::{ArgList, CommandTag, PoolStats, SqlArg};
use crate::backend::Backend;

macro_rules! statement_span {
    ($name:literal, $system:expr, $project:expr, $statement:expr, $args:expr) => {
        tracing::info_span!(
            $name,
            otel.kind = "client",
            db.system = $system,
            project = %$project,
            db.statement = %$statement,
            db.args = %ArgList($args),
        )
    };
}

/// Wraps a backend so every operation is traced.
#[derive(Debug)]
pub struct Traced<B> {
    project: String,
    inner: B,
}

impl<B> Traced<B> {
    pub fn new(project: impl Into<String>, inner: B) -> Self {
        Self {
            project: project.into(),
            inner,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: Backend> Backend for Traced<B> {
    type Row = B::Row;
    type Transaction = B::Transaction;

    const SYSTEM: &'static str = B::SYSTEM;

    async fn query_row(
        &self,
        statement: &str,
        args: &[SqlArg],
    ) -> Result<Option<B::Row>, sqlx::Error> {
        let span = statement_span!("query_row", B::SYSTEM, self.project, statement, args);
        self.inner.query_row(statement, args).instrument(span).await
    }

    async fn query(&self, statement: &str, args: &[SqlArg]) -> Result<Vec<B::Row>, sqlx::Error> {
        let span = statement_span!("query", B::SYSTEM, self.project, statement, args);
        self.inner.query(statement, args).instrument(span).await
    }

    async fn exec(&self, statement: &str, args: &[SqlArg]) -> Result<CommandTag, sqlx::Error> {
        let span = statement_span!("exec", B::SYSTEM, self.project, statement, args);
        self.inner.exec(statement, args).instrument(span).await
    }

    async fn begin(&self) -> Result<B::Transaction, sqlx::Error> {
        let span = tracing::info_span!(
            "begin",
            otel.kind = "client",
            db.system = B::SYSTEM,
            project = %self.project,
            error = Empty,
        );
        let result = self.inner.begin().instrument(span.clone()).await;
        if let Err(err) = &result {
            span.record("error", true);
            tracing::error!(parent: &span, error.message = %err, "begin failed");
        }
        result
    }

    fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
