//! # sessreg-schema: schema migrations for the session registry
//!
//! Brings the `users` table of the session registry to its current shape on
//! PostgreSQL or SQLite. Migrations are forward-only, applied in id order,
//! one transaction each, and recorded in a `migrations` tracking table.
//!
//! ```no_run
//! use sessreg_schema::{connect, initialize_schema, DatabaseConfig};
//!
//! # async fn run() -> sessreg_schema::SchemaResult<()> {
//! let config = DatabaseConfig::from_env(None)?;
//! let pool = connect(&config).await?;
//! initialize_schema(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod ids;
pub mod migrations;

pub use backends::{DatabaseBackendType, DatabaseValue};
pub use config::{DatabaseConfig, PoolConfig};
pub use database::{connect, initialize_schema, initialize_schema_with, migration_status, SchemaPool};
pub use dialect::{
    apply_migration, select_mode, ApplyOutcome, DialectCapabilities, DialectStrategy, ExecutionMode,
    PostgresStrategy, RebuildOutcome, SqliteStrategy, TableRebuild,
};
pub use error::{SchemaError, SchemaResult};
pub use ids::{new_id, IdGenerator, RandomIdGenerator};
pub use migrations::{
    Migration, MigrationCatalog, MigrationRecord, MigrationRunResult, MigrationRunner, MigrationStatus,
    MigrationStatusEntry,
};
