//! Migration Definitions - Core types and structures for migrations
//!
//! A migration pairs a stable id with a dialect-neutral description of the
//! change. Dialect strategies decide how that description is executed.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::schema_builder::ColumnDef;

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Strictly increasing, never reused
    pub id: i32,
    /// Descriptive slug, stored alongside the id when applied
    pub name: &'static str,
    /// The forward change
    pub change: SchemaChange,
    /// Declared reversal. Informational only, never executed.
    pub down_sql: Option<&'static str>,
}

impl Migration {
    pub fn new(id: i32, name: &'static str, change: SchemaChange) -> Self {
        Self {
            id,
            name,
            change,
            down_sql: None,
        }
    }

    pub fn with_down_sql(mut self, down_sql: &'static str) -> Self {
        self.down_sql = Some(down_sql);
        self
    }
}

/// Dialect-neutral description of a forward change
#[derive(Debug, Clone)]
pub enum SchemaChange {
    /// Plain SQL, skipped when the guard says the change is already present
    Sql { guard: Guard, sql: String },
    /// Add a column unless the table already has it
    AddColumn { table: String, column: ColumnDef },
    /// Change a column's type, regenerating or converting its values
    ChangeColumnType(ColumnChange),
}

impl SchemaChange {
    /// Name of the override strategy, if the change needs one
    pub fn strategy_name(&self) -> Option<&'static str> {
        match self {
            SchemaChange::Sql { .. } => None,
            SchemaChange::AddColumn { .. } => Some("add-column-if-absent"),
            SchemaChange::ChangeColumnType(_) => Some("rebuild-table"),
        }
    }
}

/// Existence check that makes plain SQL safe to rerun
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Run only when the table does not exist
    TableMissing(String),
}

/// Type change for one column of one table
#[derive(Debug, Clone)]
pub struct ColumnChange {
    pub table: String,
    pub column: String,
    /// Declared type the column must currently have for the change to run
    pub from_type: String,
    /// Final definition of the column
    pub definition: ColumnDef,
    /// How each row's new value is produced
    pub source: ValueSource,
}

/// Where the changed column's values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// A fresh opaque id per row; old values are discarded
    OpaqueId,
    /// The old value cast to the new type
    Cast,
}

/// Migration status in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Migration ID
    pub id: i32,
    /// Migration name at the time it was applied
    pub name: String,
    /// When the migration was applied
    pub applied_at: Option<NaiveDateTime>,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationRunResult {
    /// Number of migrations that were applied
    pub applied_count: usize,
    /// IDs of migrations that were applied, in application order
    pub applied_migrations: Vec<i32>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: Option<NaiveDateTime>,
    },
}

/// One catalog entry with its state in a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub id: i32,
    pub name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}
