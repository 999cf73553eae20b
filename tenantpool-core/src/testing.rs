//! Test doubles: an in-memory backend and a span-recording subscriber layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::args::{CommandTag, PoolStats, SqlArg};
use crate::backend::Backend;

/// Backend serving canned string rows. With `failing`, every call
/// returns `sqlx::Error::PoolTimedOut`.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    rows: Vec<String>,
    failing: bool,
    closed: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_rows(rows: &[&str]) -> Self {
        Self {
            rows: rows.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) -> Result<(), sqlx::Error> {
        self.calls.lock().unwrap().push(call.into());
        if self.failing {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    type Row = String;
    type Transaction = FakeTransaction;
    const SYSTEM: &'static str = "other_sql";

    async fn query_row(
        &self,
        statement: &str,
        _args: &[SqlArg],
    ) -> Result<Option<String>, sqlx::Error> {
        self.record(statement)?;
        Ok(self.rows.first().cloned())
    }

    async fn query(&self, statement: &str, _args: &[SqlArg]) -> Result<Vec<String>, sqlx::Error> {
        self.record(statement)?;
        Ok(self.rows.clone())
    }

    async fn exec(&self, statement: &str, _args: &[SqlArg]) -> Result<CommandTag, sqlx::Error> {
        self.record(statement)?;
        Ok(CommandTag::for_statement(statement, self.rows.len() as u64))
    }

    async fn begin(&self) -> Result<FakeTransaction, sqlx::Error> {
        self.record("BEGIN")?;
        Ok(FakeTransaction)
    }

    fn stats(&self) -> PoolStats {
        PoolStats { size: 2, idle: 1 }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FakeTransaction;

/// Everything observed about one span.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedSpan {
    pub name: &'static str,
    pub fields: HashMap<String, String>,
    pub events: Vec<HashMap<String, String>>,
    pub closed: bool,
}

/// Layer that records span fields, child events, and close notifications.
#[derive(Clone, Default)]
pub(crate) struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().unwrap().clone()
    }
}

struct SpanIndex(usize);

#[derive(Default)]
struct FieldMap(HashMap<String, String>);

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for SpanCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        attrs.record(&mut fields);

        let mut spans = self.spans.lock().unwrap();
        spans.push(CapturedSpan {
            name: attrs.metadata().name(),
            fields: fields.0,
            ..CapturedSpan::default()
        });
        let index = spans.len() - 1;
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanIndex(index));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let Some(index) = span.extensions().get::<SpanIndex>().map(|i| i.0) else {
            return;
        };
        let mut fields = FieldMap::default();
        values.record(&mut fields);
        self.spans.lock().unwrap()[index].fields.extend(fields.0);
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.event_span(event) else { return };
        let Some(index) = span.extensions().get::<SpanIndex>().map(|i| i.0) else {
            return;
        };
        let mut fields = FieldMap::default();
        event.record(&mut fields);
        self.spans.lock().unwrap()[index].events.push(fields.0);
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let Some(index) = span.extensions().get::<SpanIndex>().map(|i| i.0) else {
            return;
        };
        self.spans.lock().unwrap()[index].closed = true;
    }
}

/// Install a capturing subscriber for the current thread.
pub(crate) fn capture_spans() -> (SpanCapture, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let capture = SpanCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
