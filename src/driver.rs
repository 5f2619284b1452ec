//! SeaORM connections as traced query clients.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, QueryResult,
    Statement, TransactionTrait, Value,
};

#[cfg(feature = "sqlx")]
use sea_orm::RuntimeErr;

use crate::attributes::ConnectionDescriptor;
use crate::client::{ClientTransaction, QueryClient, TracedClient, TransactionalClient};
use crate::error::DriverError;
use crate::query::{Binding, Query};

/// A SeaORM connection (or transaction) paired with the settings it was
/// opened with.
///
/// SeaORM does not expose connection settings after connecting, so they are
/// supplied alongside the connection.
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use sql_query_tracing::{ConnectionDescriptor, SeaOrmClient, TracingExt};
///
/// let db = Database::connect("sqlite::memory:").await?;
/// let settings = ConnectionDescriptor::new().with("filename", ":memory:");
/// let client = SeaOrmClient::new(db, settings).with_tracing();
/// ```
#[derive(Debug, Clone)]
pub struct SeaOrmClient<C = DatabaseConnection> {
    inner: C,
    settings: ConnectionDescriptor,
}

impl<C: ConnectionTrait> SeaOrmClient<C> {
    pub fn new(inner: C, settings: ConnectionDescriptor) -> Self {
        Self { inner, settings }
    }

    /// Get a reference to the underlying connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Consume the wrapper and return the underlying connection.
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn statement(&self, query: &Query) -> Statement {
        Statement::from_sql_and_values(
            self.inner.get_database_backend(),
            query.sql(),
            query.bindings().iter().map(to_value),
        )
    }
}

/// Driver identifier recorded as `db.system`.
pub fn db_system(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "postgresql",
        DbBackend::MySql => "mysql",
        DbBackend::Sqlite => "sqlite3",
    }
}

fn to_value(binding: &Binding) -> Value {
    match binding {
        Binding::Null => Value::String(None),
        Binding::Bool(b) => Value::from(*b),
        Binding::Int(i) => Value::from(*i),
        Binding::Float(f) => Value::from(*f),
        Binding::Text(s) => Value::from(s.clone()),
        Binding::Bytes(bytes) => Value::from(bytes.clone()),
    }
}

#[async_trait]
impl<C> QueryClient for SeaOrmClient<C>
where
    C: ConnectionTrait + Send + Sync,
{
    type Output = Vec<QueryResult>;
    type Error = DbErr;

    fn driver_name(&self) -> &str {
        db_system(self.inner.get_database_backend())
    }

    fn connection_settings(&self) -> &ConnectionDescriptor {
        &self.settings
    }

    async fn query(&self, query: &Query) -> Result<Vec<QueryResult>, DbErr> {
        self.inner.query_all(self.statement(query)).await
    }
}

#[async_trait]
impl TransactionalClient for SeaOrmClient<DatabaseConnection> {
    type Transaction = SeaOrmClient<DatabaseTransaction>;

    async fn begin(&self) -> Result<Self::Transaction, DbErr> {
        let transaction = self.inner.begin().await?;
        Ok(SeaOrmClient::new(transaction, self.settings.clone()))
    }
}

#[async_trait]
impl ClientTransaction for SeaOrmClient<DatabaseTransaction> {
    async fn commit(self) -> Result<(), DbErr> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), DbErr> {
        self.inner.rollback().await
    }
}

impl DriverError for DbErr {
    /// Vendor code of a database error raised through sqlx, e.g. `"1"` for
    /// a SQLite `SQLITE_ERROR`.
    #[cfg(feature = "sqlx")]
    fn code(&self) -> Option<String> {
        match self {
            DbErr::Conn(RuntimeErr::SqlxError(err))
            | DbErr::Exec(RuntimeErr::SqlxError(err))
            | DbErr::Query(RuntimeErr::SqlxError(err)) => err
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .map(|code| code.into_owned()),
            _ => None,
        }
    }

    fn type_name(&self) -> String {
        let variant = match self {
            DbErr::Conn(_) => "Conn",
            DbErr::Exec(_) => "Exec",
            DbErr::Query(_) => "Query",
            DbErr::RecordNotFound(_) => "RecordNotFound",
            DbErr::Custom(_) => "Custom",
            DbErr::Type(_) => "Type",
            _ => return "DbErr".to_string(),
        };
        format!("DbErr::{variant}")
    }
}

impl From<SeaOrmClient> for TracedClient<SeaOrmClient> {
    fn from(client: SeaOrmClient) -> Self {
        crate::Instrumentation::default().install(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_system_names() {
        assert_eq!(db_system(DbBackend::Sqlite), "sqlite3");
        assert_eq!(db_system(DbBackend::Postgres), "postgresql");
        assert_eq!(db_system(DbBackend::MySql), "mysql");
    }

    #[test]
    fn test_bindings_become_values() {
        assert_eq!(to_value(&Binding::Int(2)), Value::BigInt(Some(2)));
        assert_eq!(to_value(&Binding::Bool(true)), Value::Bool(Some(true)));
        assert_eq!(
            to_value(&Binding::Text("abys".to_string())),
            Value::from("abys".to_string())
        );
    }

    #[test]
    fn test_db_err_without_driver_code_uses_variant() {
        assert_eq!(DbErr::Custom("boom".to_string()).code(), None);
        assert_eq!(
            DbErr::Query(sea_orm::RuntimeErr::Internal("closed".to_string())).exception_type(),
            "DbErr::Query"
        );
    }

    #[test]
    fn test_db_err_type_name() {
        assert_eq!(
            DbErr::Custom("boom".to_string()).exception_type(),
            "DbErr::Custom"
        );
        assert_eq!(
            DbErr::RecordNotFound("cat".to_string()).exception_type(),
            "DbErr::RecordNotFound"
        );
    }
}
