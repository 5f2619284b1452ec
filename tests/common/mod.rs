//! Test utilities for span assertions.
//!
//! Provides:
//! - An in-memory OpenTelemetry pipeline scoped to the current test thread
//! - Attribute lookup helpers for exported spans
//! - A scripted `QueryClient` that needs no database

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opentelemetry::trace::{Event, TracerProvider as _};
use opentelemetry::Value;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use sql_query_tracing::{
    ActivationError, ClientTransaction, ConnectionDescriptor, DriverError, Query, QueryClient,
    TransactionalClient,
};
use thiserror::Error;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;

/// Upper bound on how long a test waits for a span to be exported.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Span pipeline that exports into memory.
///
/// The subscriber is installed as the thread default for as long as the
/// harness lives, so tests must run on a current-thread runtime.
pub struct Harness {
    exporter: InMemorySpanExporter,
    _provider: TracerProvider,
    _guard: DefaultGuard,
}

impl Harness {
    pub fn new() -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("sql-query-tracing-tests");

        // Drivers emit their own trace-level spans; keep only ours.
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::INFO)
            .with(tracing_opentelemetry::layer().with_tracer(tracer));
        let guard = tracing::subscriber::set_default(subscriber);

        Self {
            exporter,
            _provider: provider,
            _guard: guard,
        }
    }

    /// All spans ended so far.
    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter
            .get_finished_spans()
            .expect("failed to read finished spans")
    }

    /// The single finished span named `name`.
    pub fn span(&self, name: &str) -> SpanData {
        let mut matching: Vec<_> = self
            .spans()
            .into_iter()
            .filter(|span| span.name == name)
            .collect();
        assert_eq!(matching.len(), 1, "expected exactly one span named {name:?}");
        matching.remove(0)
    }

    /// Wait until a span named `name` has ended, then return it.
    ///
    /// Drivers with their own worker thread may hold a handle to the query
    /// span and release it just after replying, so the span can end a
    /// moment after the query future has completed.
    pub async fn wait_for_span(&self, name: &str) -> SpanData {
        self.wait_until(|spans| spans.iter().any(|span| span.name == name))
            .await;
        self.span(name)
    }

    /// Wait until at least `count` spans have ended.
    pub async fn wait_for_spans(&self, count: usize) -> Vec<SpanData> {
        self.wait_until(|spans| spans.len() >= count).await;
        self.spans()
    }

    async fn wait_until(&self, done: impl Fn(&[SpanData]) -> bool) {
        let deadline = Instant::now() + EXPORT_TIMEOUT;
        while !done(&self.spans()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn reset(&self) {
        self.exporter.reset();
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute `key` of `span`, if recorded.
pub fn attr(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

/// Events named `exception` on `span`.
pub fn exceptions(span: &SpanData) -> Vec<Event> {
    span.events
        .iter()
        .filter(|event| event.name == "exception")
        .cloned()
        .collect()
}

/// Attribute `key` of `event`, if recorded.
pub fn event_attr(event: &Event, key: &str) -> Option<Value> {
    event
        .attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

pub fn string(value: &str) -> Option<Value> {
    Some(Value::from(value.to_string()))
}

/// Error produced by [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MockError {
    pub code: Option<String>,
    pub message: String,
}

impl DriverError for MockError {
    fn code(&self) -> Option<String> {
        self.code.clone()
    }
}

#[derive(Debug, Default)]
struct Counters {
    executed: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Scripted client.
///
/// Statements starting with `SLECT` fail with a SQLite-style error; any
/// other statement succeeds and returns its own recorded text.
#[derive(Debug, Clone)]
pub struct MockClient {
    driver: &'static str,
    settings: ConnectionDescriptor,
    compatible: bool,
    counters: Arc<Counters>,
}

impl MockClient {
    pub fn sqlite() -> Self {
        Self::new(
            "sqlite3",
            ConnectionDescriptor::new().with("filename", ":memory:"),
        )
    }

    pub fn new(driver: &'static str, settings: ConnectionDescriptor) -> Self {
        Self {
            driver,
            settings,
            compatible: true,
            counters: Arc::default(),
        }
    }

    pub fn incompatible(mut self) -> Self {
        self.compatible = false;
        self
    }

    pub fn executed(&self) -> usize {
        self.counters.executed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn syntax_error() -> MockError {
        MockError {
            code: Some("SQLITE_ERROR".to_string()),
            message: "SQLITE_ERROR: near \"SLECT\": syntax error".to_string(),
        }
    }
}

#[async_trait]
impl QueryClient for MockClient {
    type Output = String;
    type Error = MockError;

    fn driver_name(&self) -> &str {
        self.driver
    }

    fn connection_settings(&self) -> &ConnectionDescriptor {
        &self.settings
    }

    fn check_compatibility(&self) -> Result<(), ActivationError> {
        if self.compatible {
            Ok(())
        } else {
            Err(ActivationError::UnsupportedVersion {
                driver: self.driver.to_string(),
                version: "0.1".to_string(),
            })
        }
    }

    async fn query(&self, query: &Query) -> Result<String, MockError> {
        tokio::task::yield_now().await;
        self.counters.executed.fetch_add(1, Ordering::SeqCst);

        if query.sql().starts_with("SLECT") {
            Err(Self::syntax_error())
        } else {
            Ok(query.statement_text())
        }
    }
}

/// Transaction opened by [`MockClient`].
#[derive(Debug)]
pub struct MockTransaction {
    client: MockClient,
}

#[async_trait]
impl QueryClient for MockTransaction {
    type Output = String;
    type Error = MockError;

    fn driver_name(&self) -> &str {
        self.client.driver_name()
    }

    fn connection_settings(&self) -> &ConnectionDescriptor {
        self.client.connection_settings()
    }

    async fn query(&self, query: &Query) -> Result<String, MockError> {
        self.client.query(query).await
    }
}

#[async_trait]
impl ClientTransaction for MockTransaction {
    async fn commit(self) -> Result<(), MockError> {
        self.client.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), MockError> {
        self.client.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransactionalClient for MockClient {
    type Transaction = MockTransaction;

    async fn begin(&self) -> Result<MockTransaction, MockError> {
        Ok(MockTransaction {
            client: self.clone(),
        })
    }
}
