//! Traced client wrapper.
//!
//! [`QueryClient`] is the adapter interface a query library implements;
//! [`TracedClient`] wraps one and traces every query that goes through it.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::ops::Deref;
use std::pin::Pin;

use async_trait::async_trait;
use tracing::{Instrument, Span};

use crate::attributes::{ConnectionAttributes, ConnectionDescriptor};
use crate::error::{ActivationError, DriverError};
use crate::instrumentation::Instrumentation;
use crate::parent::{current_span, QueryToken};
use crate::query::{Binding, Query};
use crate::span::QuerySpan;

/// A client able to send a statement to its backing store.
#[async_trait]
pub trait QueryClient: Send + Sync {
    type Output: Send;
    type Error: DriverError + Send;

    /// Driver identifier, recorded as `db.system`.
    fn driver_name(&self) -> &str;

    /// Settings the client was created with.
    fn connection_settings(&self) -> &ConnectionDescriptor;

    /// Whether this client can be instrumented at all.
    fn check_compatibility(&self) -> Result<(), ActivationError> {
        Ok(())
    }

    /// Execute one statement.
    async fn query(&self, query: &Query) -> Result<Self::Output, Self::Error>;
}

/// A client that can open transactions.
#[async_trait]
pub trait TransactionalClient: QueryClient {
    type Transaction: ClientTransaction<Output = Self::Output, Error = Self::Error>;

    async fn begin(&self) -> Result<Self::Transaction, Self::Error>;
}

/// An open transaction.
#[async_trait]
pub trait ClientTransaction: QueryClient + Sized {
    async fn commit(self) -> Result<(), Self::Error>;

    async fn rollback(self) -> Result<(), Self::Error>;
}

/// A traced wrapper around a [`QueryClient`].
///
/// Queries are built with [`TracedClient::raw`] or [`TracedClient::query`]
/// and run when the returned [`PendingQuery`] is awaited. Each execution
/// gets its own client span. The parent is the span current at execution
/// time, or, if there is none, the span that was current when the query
/// was built.
///
/// # Example
///
/// ```rust,ignore
/// use sql_query_tracing::prelude::*;
///
/// let client = SeaOrmClient::new(db, descriptor).with_tracing();
///
/// // Built inside a request span, executed later.
/// let pending = request_span.in_scope(|| client.raw("select 2+2"));
/// let rows = pending.await?;
/// ```
#[derive(Debug, Clone)]
pub struct TracedClient<C> {
    inner: C,
    instrumentation: Instrumentation,
    active: bool,
    scope: Option<Span>,
}

impl<C: QueryClient> TracedClient<C> {
    pub(crate) fn new(inner: C, instrumentation: Instrumentation, active: bool) -> Self {
        Self {
            inner,
            instrumentation,
            active,
            scope: None,
        }
    }

    /// Get a reference to the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Consume the wrapper and return the wrapped client.
    pub fn into_inner(self) -> C {
        self.inner
    }

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    /// Whether queries issued now would be traced.
    pub fn is_active(&self) -> bool {
        self.active && self.instrumentation.is_enabled()
    }

    /// Build a raw statement without bindings.
    pub fn raw(&self, sql: impl Into<String>) -> PendingQuery<'_, C> {
        self.query(Query::new(sql))
    }

    /// Build a query. Nothing runs until the result is awaited.
    pub fn query(&self, query: impl Into<Query>) -> PendingQuery<'_, C> {
        let pending = PendingQuery {
            client: self,
            query: query.into(),
            token: self.instrumentation.registry().register(),
        };
        pending.remember_parent();
        pending
    }

    fn connection_attributes(&self) -> ConnectionAttributes {
        let settings = self.inner.connection_settings();
        let attributes = ConnectionAttributes::extract(settings);
        if self.instrumentation.config().record_user {
            attributes.with_user(settings)
        } else {
            attributes
        }
    }

    fn child<T: QueryClient>(&self, inner: T, scope: Option<Span>) -> TracedClient<T> {
        TracedClient {
            inner,
            instrumentation: self.instrumentation.clone(),
            active: self.active,
            scope,
        }
    }

    async fn execute(&self, query: Query, token: QueryToken) -> Result<C::Output, C::Error> {
        match &self.scope {
            Some(scope) => self.run(&query, &token).instrument(scope.clone()).await,
            None => self.run(&query, &token).await,
        }
    }

    async fn run(&self, query: &Query, token: &QueryToken) -> Result<C::Output, C::Error> {
        if !self.is_active() {
            return self.inner.query(query).await;
        }

        let parent = self.instrumentation.registry().resolve_parent(token);
        let span = QuerySpan::query(
            self.inner.driver_name(),
            &self.connection_attributes(),
            query,
            parent.as_ref(),
            self.instrumentation.config(),
        );

        let result = self
            .inner
            .query(query)
            .instrument(span.span().clone())
            .await;

        span.finish(&result);
        result
    }
}

impl<C: TransactionalClient> TracedClient<C> {
    /// Open a transaction traced as a `transaction` span.
    ///
    /// Queries issued through the returned handle are children of that span.
    pub async fn begin(&self) -> Result<TracedTransaction<C::Transaction>, C::Error> {
        if !self.is_active() {
            let transaction = self.inner.begin().await?;
            return Ok(TracedTransaction {
                client: self.child(transaction, None),
                span: None,
            });
        }

        let parent = current_span();
        let mut span = QuerySpan::transaction(
            self.inner.driver_name(),
            &self.connection_attributes(),
            parent.as_ref(),
            self.instrumentation.config(),
        );

        match self.inner.begin().instrument(span.span().clone()).await {
            Ok(transaction) => {
                let scope = span.span().clone();
                Ok(TracedTransaction {
                    client: self.child(transaction, Some(scope)),
                    span: Some(span),
                })
            }
            Err(err) => {
                span.fail(&err);
                Err(err)
            }
        }
    }

    /// Run `callback` inside a transaction.
    ///
    /// Commits when the callback succeeds. On error the transaction is
    /// rolled back and the callback's error is returned as is.
    pub async fn transaction<F, T>(&self, callback: F) -> Result<T, C::Error>
    where
        F: for<'t> FnOnce(
                &'t TracedClient<C::Transaction>,
            )
                -> Pin<Box<dyn Future<Output = Result<T, C::Error>> + Send + 't>>
            + Send,
        T: Send,
    {
        let mut transaction = self.begin().await?;

        let outcome = callback(&transaction.client)
            .instrument(transaction.span())
            .await;

        match outcome {
            Ok(value) => {
                transaction.commit().await?;
                Ok(value)
            }
            Err(err) => {
                transaction.record_failure(&err);
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::warn!(
                        target: "sql_query_tracing",
                        error = %rollback_err,
                        "rollback failed after transaction error"
                    );
                }
                Err(err)
            }
        }
    }
}

impl<C> AsRef<C> for TracedClient<C> {
    fn as_ref(&self) -> &C {
        &self.inner
    }
}

/// A query that has been built but not executed.
///
/// Awaiting it runs the query. Dropping it without awaiting does nothing
/// besides releasing its stored parent span.
#[must_use = "queries do nothing unless awaited"]
pub struct PendingQuery<'c, C: QueryClient> {
    client: &'c TracedClient<C>,
    query: Query,
    token: QueryToken,
}

impl<'c, C: QueryClient> PendingQuery<'c, C> {
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn token(&self) -> &QueryToken {
        &self.token
    }

    /// Replace the bindings.
    ///
    /// The query counts as rebuilt: the current span, if any, becomes its
    /// stored parent.
    pub fn bind<I, B>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Binding>,
    {
        self.query = self.query.with_bindings(bindings);
        self.remember_parent();
        self
    }

    fn remember_parent(&self) {
        if self.client.is_active() {
            self.client
                .instrumentation
                .registry()
                .associate(&self.token, current_span().as_ref());
        }
    }
}

impl<'c, C: QueryClient> IntoFuture for PendingQuery<'c, C> {
    type Output = Result<C::Output, C::Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'c>>;

    fn into_future(self) -> Self::IntoFuture {
        let PendingQuery {
            client,
            query,
            token,
        } = self;
        Box::pin(client.execute(query, token))
    }
}

impl<C: QueryClient> fmt::Debug for PendingQuery<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingQuery")
            .field("query", &self.query)
            .field("id", &self.token.id())
            .finish()
    }
}

/// An open transaction whose queries are traced under its span.
///
/// Dereferences to a [`TracedClient`] over the transaction, so queries are
/// built the same way as on the connection.
#[derive(Debug)]
pub struct TracedTransaction<T: ClientTransaction> {
    client: TracedClient<T>,
    span: Option<QuerySpan>,
}

impl<T: ClientTransaction> TracedTransaction<T> {
    /// The transaction span, or a disabled span when not traced.
    pub fn span(&self) -> Span {
        self.span
            .as_ref()
            .map_or_else(Span::none, |span| span.span().clone())
    }

    pub async fn commit(self) -> Result<(), T::Error> {
        self.close(true).await
    }

    pub async fn rollback(self) -> Result<(), T::Error> {
        self.close(false).await
    }

    fn record_failure(&mut self, cause: &T::Error) {
        if let Some(span) = self.span.as_mut() {
            span.fail(cause);
        }
    }

    async fn close(self, commit: bool) -> Result<(), T::Error> {
        let scope = self.span();
        let Self { client, span } = self;
        let transaction = client.into_inner();

        let result = if commit {
            transaction.commit().instrument(scope).await
        } else {
            transaction.rollback().instrument(scope).await
        };

        if let Some(span) = span {
            span.finish(&result);
        }
        result
    }
}

impl<T: ClientTransaction> Deref for TracedTransaction<T> {
    type Target = TracedClient<T>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Extension trait for easy wrapping of query clients.
pub trait TracingExt: QueryClient + Sized {
    /// Wrap this client with a fresh, default instrumentation.
    fn with_tracing(self) -> TracedClient<Self>;

    /// Wrap this client with a shared instrumentation.
    fn with_instrumentation(self, instrumentation: &Instrumentation) -> TracedClient<Self>;
}

impl<C: QueryClient> TracingExt for C {
    fn with_tracing(self) -> TracedClient<Self> {
        Instrumentation::default().install(self)
    }

    fn with_instrumentation(self, instrumentation: &Instrumentation) -> TracedClient<Self> {
        instrumentation.install(self)
    }
}
