//! Dialect Strategies
//!
//! A `DialectStrategy` knows how to introspect and modify one SQL engine.
//! The strategy is picked once when the pool is opened; migration logic
//! below only talks to the trait.

pub mod postgres;
pub mod rebuild;
pub mod sqlite;

use async_trait::async_trait;
use sqlx::Database;
use tracing::debug;

use crate::backends::{DatabaseBackendType, DatabaseValue};
use crate::error::{SchemaError, SchemaResult};
use crate::ids::IdGenerator;
use crate::migrations::definitions::{ColumnChange, Guard, Migration, MigrationRecord, SchemaChange};
use crate::migrations::schema_builder::{ColumnDef, ColumnInfo, SchemaBuilder, TableConstraints, TypeFamily};

pub use postgres::PostgresStrategy;
pub use rebuild::{RebuildOutcome, TableRebuild};
pub use sqlite::SqliteStrategy;

/// What a dialect can express natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    /// `ALTER TABLE .. ALTER COLUMN .. TYPE` or equivalent
    pub alter_column_type: bool,
    /// Dropping a column that carries a constraint
    pub drop_constrained_column: bool,
    /// DDL participates in transactions
    pub transactional_ddl: bool,
}

impl DialectCapabilities {
    pub fn postgres() -> Self {
        Self {
            alter_column_type: true,
            drop_constrained_column: true,
            transactional_ddl: true,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            alter_column_type: false,
            drop_constrained_column: false,
            transactional_ddl: true,
        }
    }
}

/// How a migration is executed on a given dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DirectDdl,
    AddColumnIfAbsent,
    Rebuild,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::DirectDdl => write!(f, "direct-ddl"),
            ExecutionMode::AddColumnIfAbsent => write!(f, "add-column-if-absent"),
            ExecutionMode::Rebuild => write!(f, "rebuild"),
        }
    }
}

/// What applying a migration actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change was found in place; nothing ran
    AlreadyPresent,
    /// Statements ran in the given mode
    Executed(ExecutionMode),
    /// The table was replaced by a rebuild
    Rebuilt { rows_copied: u64 },
}

impl std::fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyOutcome::AlreadyPresent => write!(f, "already-present"),
            ApplyOutcome::Executed(mode) => write!(f, "{}", mode),
            ApplyOutcome::Rebuilt { rows_copied } => write!(f, "rebuild ({} rows)", rows_copied),
        }
    }
}

/// Pick the execution mode for a change on a dialect
pub fn select_mode(capabilities: &DialectCapabilities, change: &SchemaChange) -> ExecutionMode {
    match change {
        SchemaChange::Sql { .. } => ExecutionMode::DirectDdl,
        SchemaChange::AddColumn { .. } => ExecutionMode::AddColumnIfAbsent,
        SchemaChange::ChangeColumnType(_) => {
            if capabilities.alter_column_type && capabilities.drop_constrained_column {
                ExecutionMode::DirectDdl
            } else {
                ExecutionMode::Rebuild
            }
        }
    }
}

/// Dialect-specific primitives used by the tracker, the runner and the
/// rebuild strategy
#[async_trait]
pub trait DialectStrategy: Send + Sync {
    type Database: Database;

    fn backend_type(&self) -> DatabaseBackendType;

    fn capabilities(&self) -> DialectCapabilities;

    /// Generator for regenerated key values
    fn id_generator(&self) -> &dyn IdGenerator;

    /// Bind parameter marker for the 1-based position
    fn placeholder(&self, index: usize) -> String;

    /// Predicate selecting one row by the key returned from `row_keys`
    fn row_key_predicate(&self, index: usize) -> String;

    async fn table_exists(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        table: &str,
    ) -> SchemaResult<bool>;

    /// Columns of a table in declaration order; empty when it does not exist
    async fn table_columns(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        table: &str,
    ) -> SchemaResult<Vec<ColumnInfo>>;

    /// UNIQUE constraints and explicit indexes a rebuild must recreate
    ///
    /// Fails with `Introspection` when the table carries constraints a
    /// rebuild cannot reproduce (CHECK, foreign keys).
    async fn table_constraints(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        table: &str,
    ) -> SchemaResult<TableConstraints>;

    /// Physical row handles, stable for the rest of the transaction
    async fn row_keys(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        table: &str,
    ) -> Result<Vec<String>, sqlx::Error>;

    async fn execute(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        sql: &str,
    ) -> Result<u64, sqlx::Error>;

    async fn execute_with(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<u64, sqlx::Error>;

    /// Rows of the tracking table, ascending by id
    async fn fetch_applied(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        tracking_table: &str,
    ) -> SchemaResult<Vec<MigrationRecord>>;

    /// Change a column's type without rebuilding the table
    async fn alter_column_in_place(
        &self,
        conn: &mut <Self::Database as Database>::Connection,
        change: &ColumnChange,
    ) -> SchemaResult<()>;
}

/// Execute a migration's effect on an open transaction
///
/// Every path checks the current shape first, so calling this for a change
/// that is already present does nothing and reports `AlreadyPresent`.
pub async fn apply_migration<S>(
    strategy: &S,
    conn: &mut <S::Database as Database>::Connection,
    migration: &Migration,
) -> SchemaResult<ApplyOutcome>
where
    S: DialectStrategy + ?Sized,
{
    let mode = select_mode(&strategy.capabilities(), &migration.change);

    let outcome = match (&migration.change, mode) {
        (SchemaChange::Sql { guard, sql }, _) => {
            if guard_satisfied(strategy, &mut *conn, guard).await? {
                strategy
                    .execute(&mut *conn, sql)
                    .await
                    .map_err(|e| SchemaError::Ddl(format!("Failed to execute migration {}: {}", migration.id, e)))?;
                ApplyOutcome::Executed(mode)
            } else {
                debug!(migration_id = migration.id, "Change already present, skipping SQL");
                ApplyOutcome::AlreadyPresent
            }
        }
        (SchemaChange::AddColumn { table, column }, _) => {
            if add_column_if_absent(strategy, &mut *conn, table, column).await? {
                ApplyOutcome::Executed(mode)
            } else {
                ApplyOutcome::AlreadyPresent
            }
        }
        (SchemaChange::ChangeColumnType(change), ExecutionMode::Rebuild) => {
            match TableRebuild::new(strategy, change).run(&mut *conn).await? {
                RebuildOutcome::AlreadyConverted => ApplyOutcome::AlreadyPresent,
                RebuildOutcome::Rebuilt { rows_copied } => ApplyOutcome::Rebuilt { rows_copied },
            }
        }
        (SchemaChange::ChangeColumnType(change), _) => {
            if column_needs_change(strategy, &mut *conn, change).await? {
                strategy.alter_column_in_place(&mut *conn, change).await?;
                ApplyOutcome::Executed(mode)
            } else {
                debug!(migration_id = migration.id, "Column already converted, skipping");
                ApplyOutcome::AlreadyPresent
            }
        }
    };

    Ok(outcome)
}

/// True when the guarded SQL still has to run
async fn guard_satisfied<S>(
    strategy: &S,
    conn: &mut <S::Database as Database>::Connection,
    guard: &Guard,
) -> SchemaResult<bool>
where
    S: DialectStrategy + ?Sized,
{
    match guard {
        Guard::TableMissing(table) => Ok(!strategy.table_exists(conn, table).await?),
    }
}

/// Adds the column unless present; true when it was added
async fn add_column_if_absent<S>(
    strategy: &S,
    conn: &mut <S::Database as Database>::Connection,
    table: &str,
    column: &ColumnDef,
) -> SchemaResult<bool>
where
    S: DialectStrategy + ?Sized,
{
    let columns = strategy.table_columns(&mut *conn, table).await?;
    if columns.is_empty() {
        return Err(SchemaError::Introspection(format!(
            "Table {} does not exist, cannot add column {}",
            table, column.name
        )));
    }
    if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
        debug!(table, column = %column.name, "Column already present");
        return Ok(false);
    }

    let mut builder = SchemaBuilder::new();
    builder.add_column(table, column);
    for statement in builder.to_sql() {
        strategy
            .execute(&mut *conn, &statement)
            .await
            .map_err(|e| SchemaError::Ddl(format!("Failed to add column {}.{}: {}", table, column.name, e)))?;
    }
    Ok(true)
}

/// True when the column still has the type the change converts from
pub(crate) async fn column_needs_change<S>(
    strategy: &S,
    conn: &mut <S::Database as Database>::Connection,
    change: &ColumnChange,
) -> SchemaResult<bool>
where
    S: DialectStrategy + ?Sized,
{
    let columns = strategy.table_columns(conn, &change.table).await?;
    let column = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(&change.column))
        .ok_or_else(|| {
            SchemaError::Introspection(format!(
                "Column {}.{} not found",
                change.table, change.column
            ))
        })?;

    Ok(column.type_family() == TypeFamily::of(&change.from_type))
}
