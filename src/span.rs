//! Span lifecycle for a single query execution.
//!
//! A [`QuerySpan`] moves through `Started -> {Succeeded | Failed} -> Ended`.
//! It only ever observes the outcome of the wrapped call; results and errors
//! are handed back to the caller untouched.

use std::time::{Duration, Instant};

use tracing::Span;

use crate::attributes::{ConnectionAttributes, DB_QUERY_TEXT};
use crate::config::TracingConfig;
use crate::error::DriverError;
use crate::query::Query;

/// Create a client span with every database field declared up front.
///
/// Fields left `Empty` are never exported, so attributes are only added
/// once a value is known.
macro_rules! db_span {
    ($name:literal, $parent:expr, $otel_name:expr, $system:expr) => {
        tracing::info_span!(
            target: "sql_query_tracing",
            parent: $parent,
            $name,
            "otel.name" = $otel_name,
            "otel.kind" = "client",
            "otel.status_code" = ::tracing::field::Empty,
            "otel.status_message" = ::tracing::field::Empty,
            "db.system" = $system,
            "db.namespace" = ::tracing::field::Empty,
            "db.user" = ::tracing::field::Empty,
            "server.address" = ::tracing::field::Empty,
            "server.port" = ::tracing::field::Empty,
            "db.query.text" = ::tracing::field::Empty,
        )
    };
}

/// Where a [`QuerySpan`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Started,
    Succeeded,
    Failed,
    Ended,
}

/// One span covering one execution of the wrapped client.
///
/// The span is ended exactly once: by [`QuerySpan::finish`], by an explicit
/// [`QuerySpan::end`], or on drop if the execution future was cancelled.
#[derive(Debug)]
pub struct QuerySpan {
    span: Span,
    state: LifecycleState,
    started: Instant,
    slow_query_threshold: Duration,
}

impl QuerySpan {
    /// Start the span for `query`, named after its method or statement text.
    pub fn query(
        system: &str,
        attributes: &ConnectionAttributes,
        query: &Query,
        parent: Option<&Span>,
        config: &TracingConfig,
    ) -> Self {
        let span = db_span!(
            "db.query",
            parent.and_then(Span::id),
            query.span_name(),
            system
        );
        attributes.record(&span);

        let text = if config.log_bindings {
            query.statement_text()
        } else {
            query.sql().to_string()
        };
        span.record(DB_QUERY_TEXT, text.as_str());

        Self::started(span, config)
    }

    /// Start the span wrapping a transaction.
    pub fn transaction(
        system: &str,
        attributes: &ConnectionAttributes,
        parent: Option<&Span>,
        config: &TracingConfig,
    ) -> Self {
        let span = db_span!(
            "db.transaction",
            parent.and_then(Span::id),
            "transaction",
            system
        );
        attributes.record(&span);

        Self::started(span, config)
    }

    fn started(span: Span, config: &TracingConfig) -> Self {
        Self {
            span,
            state: LifecycleState::Started,
            started: Instant::now(),
            slow_query_threshold: config.slow_query_threshold,
        }
    }

    /// The underlying span. Disabled once the span has ended.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Mark the execution as successful.
    pub fn succeed(&mut self) {
        if self.state != LifecycleState::Started {
            return;
        }
        self.span.record("otel.status_code", "OK");
        self.state = LifecycleState::Succeeded;
    }

    /// Record `error` as an `exception` event and mark the span as failed.
    pub fn fail<E: DriverError + ?Sized>(&mut self, error: &E) {
        if self.state != LifecycleState::Started {
            return;
        }

        let message = error.to_string();
        let exception_type = error.exception_type();
        tracing::error!(
            target: "sql_query_tracing",
            parent: &self.span,
            {
                "exception.type" = exception_type.as_str(),
                "exception.message" = message.as_str()
            },
            "exception"
        );

        self.span.record("otel.status_code", "ERROR");
        self.span.record("otel.status_message", message.as_str());
        self.state = LifecycleState::Failed;
    }

    /// Close the span. Later calls are no-ops.
    ///
    /// This releases the handle held here. The span itself closes once its
    /// last handle is released, and a driver that cloned the current span
    /// into its own worker may hold one for a moment after replying.
    pub fn end(&mut self) {
        if self.state == LifecycleState::Ended {
            return;
        }
        self.state = LifecycleState::Ended;
        let span = std::mem::replace(&mut self.span, Span::none());
        drop(span);
    }

    /// Map the outcome of the wrapped call onto the span and end it.
    pub fn finish<T, E: DriverError>(mut self, result: &Result<T, E>) {
        self.warn_if_slow();
        match result {
            Ok(_) => self.succeed(),
            Err(err) => self.fail(err),
        }
        self.end();
    }

    fn warn_if_slow(&self) {
        let elapsed = self.started.elapsed();
        if elapsed < self.slow_query_threshold {
            return;
        }

        let duration_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let threshold_ms =
            i64::try_from(self.slow_query_threshold.as_millis()).unwrap_or(i64::MAX);
        tracing::warn!(
            target: "sql_query_tracing",
            parent: &self.span,
            duration_ms,
            threshold_ms,
            "slow query detected"
        );
    }
}

impl Drop for QuerySpan {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ConnectionDescriptor;
    use thiserror::Error;
    use tracing::subscriber::with_default;
    use tracing_subscriber::registry::Registry;

    #[derive(Debug, Error)]
    #[error("disk I/O error")]
    struct IoFailure;

    impl DriverError for IoFailure {}

    fn start(query: &Query) -> QuerySpan {
        let connection = ConnectionDescriptor::new().with("filename", ":memory:");
        QuerySpan::query(
            "sqlite3",
            &ConnectionAttributes::extract(&connection),
            query,
            None,
            &TracingConfig::default(),
        )
    }

    #[test]
    fn test_success_transitions() {
        with_default(Registry::default(), || {
            let mut span = start(&Query::new("select 1"));
            assert_eq!(span.state(), LifecycleState::Started);
            assert!(span.span().id().is_some());

            span.succeed();
            assert_eq!(span.state(), LifecycleState::Succeeded);

            span.end();
            assert_eq!(span.state(), LifecycleState::Ended);
            assert!(span.span().id().is_none());
        });
    }

    #[test]
    fn test_failure_is_terminal() {
        with_default(Registry::default(), || {
            let mut span = start(&Query::new("select 1"));
            span.fail(&IoFailure);
            assert_eq!(span.state(), LifecycleState::Failed);

            span.succeed();
            assert_eq!(span.state(), LifecycleState::Failed);
        });
    }

    #[test]
    fn test_end_is_idempotent() {
        with_default(Registry::default(), || {
            let mut span = start(&Query::new("select 1"));
            span.end();
            span.end();
            span.fail(&IoFailure);
            assert_eq!(span.state(), LifecycleState::Ended);
        });
    }

    #[test]
    fn test_finish_with_error() {
        with_default(Registry::default(), || {
            let span = start(&Query::new("select 1"));
            let result: Result<(), IoFailure> = Err(IoFailure);
            span.finish(&result);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_transaction_span_starts() {
        with_default(Registry::default(), || {
            let span = QuerySpan::transaction(
                "sqlite3",
                &ConnectionAttributes::default(),
                None,
                &TracingConfig::default(),
            );
            assert_eq!(span.state(), LifecycleState::Started);
        });
    }
}
