//! Migration System
//!
//! The catalog lists every migration, the tracker records which ones a
//! database has applied and the runner applies the rest in order.

pub mod catalog;
pub mod definitions;
pub mod runner;
pub mod schema_builder;
pub mod tracker;

pub use catalog::{users_table, MigrationCatalog, USERS_TABLE};
pub use definitions::{
    ColumnChange, Guard, Migration, MigrationRecord, MigrationRunResult, MigrationStatus, MigrationStatusEntry,
    SchemaChange, ValueSource,
};
pub use runner::MigrationRunner;
pub use schema_builder::{ColumnDef, ColumnInfo, SchemaBuilder, TableBuilder, TableConstraints, TypeFamily};
pub use tracker::{MigrationTracker, TRACKING_TABLE};
