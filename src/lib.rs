//! # sql-query-tracing
//!
//! OpenTelemetry-compatible tracing instrumentation for SQL clients whose
//! queries are built first and executed later.
//!
//! Queries built through a [`TracedClient`] are deferred: nothing runs until
//! the returned [`PendingQuery`] is awaited. By then the span that was active
//! when the query was built may have been exited. Every execution still gets
//! exactly one client span, parented to the span active at execution time or,
//! failing that, the span active when the query was built.
//!
//! ## Features
//!
//! - **Adapter Interface**: Any client implementing [`QueryClient`] can be traced
//! - **SeaORM Support**: [`SeaOrmClient`] adapts SeaORM connections and transactions
//! - **Deferred Parenting**: Spans keep their parent across await points
//! - **Transactions**: A `transaction` span wraps the statements run inside it
//! - **Runtime Toggle**: [`Instrumentation::enable`] / [`Instrumentation::disable`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sea_orm::Database;
//! use sql_query_tracing::prelude::*;
//!
//! let db = Database::connect("sqlite::memory:").await?;
//! let settings = ConnectionDescriptor::new().with("filename", ":memory:");
//! let client = SeaOrmClient::new(db, settings).with_tracing();
//!
//! let rows = client
//!     .query(Query::new("select 2+2").with_method("select"))
//!     .await?;
//! ```
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `db.system` | Driver name, e.g. "sqlite3" |
//! | `db.namespace` | Database or file name |
//! | `server.address` | Host or socket path |
//! | `server.port` | Network port |
//! | `db.user` | Connection user (opt-in) |
//! | `db.query.text` | Statement, with `"\nwith [<bindings>]"` when bound |
//! | `otel.status_code` | "OK" or "ERROR" |
//!
//! Failed queries also carry an `exception` event with `exception.type` and
//! `exception.message`.

mod attributes;
mod client;
mod config;
mod driver;
mod error;
mod instrumentation;
mod parent;
mod query;
mod span;

pub use attributes::{
    extract_user, AttributeValue, ConnectionAttributes, ConnectionDescriptor, ConnectionValue,
    DB_NAMESPACE, DB_QUERY_TEXT, DB_SYSTEM, DB_USER, SERVER_ADDRESS, SERVER_PORT,
};
pub use client::{
    ClientTransaction, PendingQuery, QueryClient, TracedClient, TracedTransaction, TracingExt,
    TransactionalClient,
};
pub use config::TracingConfig;
pub use driver::{db_system, SeaOrmClient};
pub use error::{ActivationError, DriverError};
pub use instrumentation::Instrumentation;
pub use parent::{ParentSpanRegistry, QueryId, QueryToken};
pub use query::{Binding, Query};
pub use span::{LifecycleState, QuerySpan};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ConnectionDescriptor, Instrumentation, Query, SeaOrmClient, TracedClient, TracingConfig,
        TracingExt,
    };
}
