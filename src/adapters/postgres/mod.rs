//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - Version-checked subscription rows
//! - `PostgresPlanCatalog` / `PostgresUserDirectory` - Read-only reference data
//! - `PostgresSubscriptionEventLog` / `PostgresCancellationRecords` - Append-only audit tables

mod audit_stores;
mod plan_catalog;
mod subscription_repository;

pub use audit_stores::{PostgresCancellationRecords, PostgresSubscriptionEventLog};
pub use plan_catalog::{PostgresPlanCatalog, PostgresUserDirectory};
pub use subscription_repository::PostgresSubscriptionRepository;

use sqlx::PgPool;

use crate::config::DatabaseConfig;

/// Opens the pool and, when configured, applies pending migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );
    let pool = config.pool_options().connect(&config.url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
    }

    tracing::info!("PostgreSQL connection pool established");
    Ok(pool)
}
