//! Basic example showing how to use sql-query-tracing.
//!
//! Run with: cargo run --example basic

use sea_orm::{ConnectOptions, Database};
use sql_query_tracing::prelude::*;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sql_query_tracing=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    // SeaORM does not keep connection settings around, so pass them along
    let settings = ConnectionDescriptor::new().with("filename", ":memory:");

    // Option 1: Simple wrapping with defaults
    let client = SeaOrmClient::new(db, settings).with_tracing();

    // Option 2: Shared instrumentation with custom configuration
    // let instrumentation = Instrumentation::new(
    //     TracingConfig::development().with_slow_query_threshold(Duration::from_millis(50)),
    // );
    // let client = SeaOrmClient::new(db, settings).with_instrumentation(&instrumentation);

    let request = tracing::info_span!("handle_request", cat = "abys");

    async {
        client
            .raw("create table cats (id integer primary key, name text)")
            .await?;

        client
            .transaction(|tx| {
                Box::pin(async move {
                    tx.query(
                        Query::new("insert into cats (name) values (?)")
                            .with_bindings(["abys"])
                            .with_method("insert"),
                    )
                    .await?;
                    Ok::<_, sea_orm::DbErr>(())
                })
            })
            .await?;

        Ok::<_, sea_orm::DbErr>(())
    }
    .instrument(request.clone())
    .await?;

    // Built inside the request span, executed after it was exited
    let pending = request.in_scope(|| {
        client.query(Query::new("select count(*) as n from cats").with_method("select"))
    });
    let rows = pending.await?;
    let count: i64 = rows[0].try_get("", "n")?;

    tracing::info!(count, "cats stored");

    // Queries run untraced while disabled
    client.instrumentation().disable();
    client.raw("select 2+2").await?;

    Ok(())
}
