//! Migration Tracker - the ledger of applied migrations
//!
//! The ledger row for a migration is written on the same transaction as the
//! migration's own effect, so a row exists exactly when the change
//! committed.

use std::collections::HashSet;

use sqlx::Database;
use tracing::info;

use super::definitions::MigrationRecord;
use crate::backends::DatabaseValue;
use crate::dialect::DialectStrategy;
use crate::error::{SchemaError, SchemaResult};

/// Name of the tracking table
pub const TRACKING_TABLE: &str = "migrations";

/// Reads and writes the tracking table through a dialect strategy
pub struct MigrationTracker<'a, S: DialectStrategy + ?Sized> {
    strategy: &'a S,
    table: &'a str,
}

impl<'a, S: DialectStrategy + ?Sized> MigrationTracker<'a, S> {
    pub fn new(strategy: &'a S) -> Self {
        Self {
            strategy,
            table: TRACKING_TABLE,
        }
    }

    /// SQL to create the migrations tracking table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE {} (\n    \
                id INTEGER PRIMARY KEY,\n    \
                name TEXT NOT NULL,\n    \
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }

    /// Create the tracking table unless it already exists
    pub async fn ensure_tracking_table(
        &self,
        conn: &mut <S::Database as Database>::Connection,
    ) -> SchemaResult<()> {
        let exists = self
            .strategy
            .table_exists(&mut *conn, self.table)
            .await
            .map_err(|e| SchemaError::Tracking(format!("Failed to check migrations table existence: {}", e)))?;
        if exists {
            return Ok(());
        }

        self.strategy
            .execute(&mut *conn, &self.create_table_sql())
            .await
            .map_err(|e| SchemaError::Tracking(format!("Failed to create migrations table: {}", e)))?;

        info!(table = self.table, backend = %self.strategy.backend_type(), "Created migrations table");
        Ok(())
    }

    /// Ids of every applied migration
    pub async fn applied_ids(
        &self,
        conn: &mut <S::Database as Database>::Connection,
    ) -> SchemaResult<HashSet<i32>> {
        let records = self.applied_records(conn).await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Applied migrations ascending by id
    pub async fn applied_records(
        &self,
        conn: &mut <S::Database as Database>::Connection,
    ) -> SchemaResult<Vec<MigrationRecord>> {
        self.strategy.fetch_applied(conn, self.table).await
    }

    /// Record a migration as applied; call on the migration's transaction
    pub async fn record_applied(
        &self,
        conn: &mut <S::Database as Database>::Connection,
        id: i32,
        name: &str,
    ) -> SchemaResult<()> {
        let sql = format!(
            "INSERT INTO {} (id, name) VALUES ({}, {})",
            self.table,
            self.strategy.placeholder(1),
            self.strategy.placeholder(2)
        );

        self.strategy
            .execute_with(conn, &sql, &[DatabaseValue::Int32(id), DatabaseValue::from(name)])
            .await
            .map_err(|e| SchemaError::Tracking(format!("Failed to record migration {}: {}", id, e)))?;
        Ok(())
    }
}
