//! Database Integration - connection pools and schema initialization
//!
//! The dialect is fixed when the pool is opened. `initialize_schema` is the
//! single entry point the service calls at startup; any error it returns
//! must abort startup.

use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolOptions;
use sqlx::postgres::PgPool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Database, Postgres, Sqlite};
use tracing::{debug, info};

use crate::backends::DatabaseBackendType;
use crate::config::{DatabaseConfig, PoolConfig};
use crate::dialect::{PostgresStrategy, SqliteStrategy};
use crate::error::{SchemaError, SchemaResult};
use crate::migrations::{MigrationCatalog, MigrationRunResult, MigrationRunner, MigrationStatusEntry};

/// Milliseconds SQLite waits on a locked database
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 3000;

/// Connection pool for one of the supported dialects
#[derive(Debug, Clone)]
pub enum SchemaPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl SchemaPool {
    pub fn backend_type(&self) -> DatabaseBackendType {
        match self {
            SchemaPool::Postgres(_) => DatabaseBackendType::PostgreSQL,
            SchemaPool::Sqlite(_) => DatabaseBackendType::SQLite,
        }
    }

    pub async fn close(&self) {
        match self {
            SchemaPool::Postgres(pool) => pool.close().await,
            SchemaPool::Sqlite(pool) => pool.close().await,
        }
    }
}

impl From<PgPool> for SchemaPool {
    fn from(pool: PgPool) -> Self {
        SchemaPool::Postgres(pool)
    }
}

impl From<SqlitePool> for SchemaPool {
    fn from(pool: SqlitePool) -> Self {
        SchemaPool::Sqlite(pool)
    }
}

fn pool_options<DB: Database>(config: &PoolConfig) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .idle_timeout(config.idle_timeout.map(Duration::from_secs))
        .max_lifetime(config.max_lifetime.map(Duration::from_secs))
        .test_before_acquire(config.test_before_acquire)
}

/// Open a pool for the configured backend
pub async fn connect(config: &DatabaseConfig) -> SchemaResult<SchemaPool> {
    debug!(backend = %config.backend, url = %config.redacted_url(), "Connecting to database");

    let pool = match config.backend {
        DatabaseBackendType::PostgreSQL => {
            let pool = pool_options::<Postgres>(&config.pool)
                .connect(&config.url)
                .await
                .map_err(|e| SchemaError::Connectivity(format!("Failed to connect to database: {}", e)))?;
            SchemaPool::Postgres(pool)
        }
        DatabaseBackendType::SQLite => {
            if let Some(parent) = config.sqlite_path().as_deref().and_then(|p| p.parent()) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        SchemaError::Connectivity(format!(
                            "Failed to create data directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }

            let options = SqliteConnectOptions::from_str(&config.url)
                .map_err(|e| SchemaError::Configuration(format!("Invalid SQLite URL {}: {}", config.url, e)))?
                .create_if_missing(true)
                .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));
            let pool = pool_options::<Sqlite>(&config.pool)
                .connect_with(options)
                .await
                .map_err(|e| SchemaError::Connectivity(format!("Failed to open database: {}", e)))?;
            SchemaPool::Sqlite(pool)
        }
    };

    info!(backend = %config.backend, "Database connection established");
    Ok(pool)
}

/// Bring the schema up to date with the built-in migrations
pub async fn initialize_schema(pool: &SchemaPool) -> SchemaResult<MigrationRunResult> {
    initialize_schema_with(pool, &MigrationCatalog::builtin()).await
}

/// Bring the schema up to date with an explicit catalog
pub async fn initialize_schema_with(
    pool: &SchemaPool,
    catalog: &MigrationCatalog,
) -> SchemaResult<MigrationRunResult> {
    let result = match pool {
        SchemaPool::Postgres(pool) => {
            MigrationRunner::new(PostgresStrategy::new(), pool.clone())
                .run(catalog)
                .await?
        }
        SchemaPool::Sqlite(pool) => {
            MigrationRunner::new(SqliteStrategy::new(), pool.clone())
                .run(catalog)
                .await?
        }
    };

    info!(
        backend = %pool.backend_type(),
        applied = result.applied_count,
        skipped = result.skipped_count,
        elapsed_ms = result.execution_time_ms as u64,
        "Schema initialized"
    );
    Ok(result)
}

/// State of every built-in migration in the database
pub async fn migration_status(pool: &SchemaPool) -> SchemaResult<Vec<MigrationStatusEntry>> {
    let catalog = MigrationCatalog::builtin();
    let statuses = match pool {
        SchemaPool::Postgres(pool) => {
            MigrationRunner::new(PostgresStrategy::new(), pool.clone())
                .status(&catalog)
                .await?
        }
        SchemaPool::Sqlite(pool) => {
            MigrationRunner::new(SqliteStrategy::new(), pool.clone())
                .status(&catalog)
                .await?
        }
    };

    Ok(statuses
        .into_iter()
        .map(|(migration, status)| MigrationStatusEntry {
            id: migration.id,
            name: migration.name.to_string(),
            status,
        })
        .collect())
}
