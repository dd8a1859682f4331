//! Table rebuild for dialects that cannot alter a column in place
//!
//! The table is replaced in six steps: introspect the current columns and
//! constraints, synthesize the final definition, create it under a temporary name, copy
//! every row, drop the original and rename the copy into place. All steps
//! run on the caller's transaction. Nothing here repairs a half-finished
//! rebuild; a leftover temporary table makes the create step fail.
//! Explicit indexes are recreated after the rename. Tables with CHECK or
//! foreign key constraints are refused during introspection.

use sqlx::Database;
use tracing::{debug, info, warn};

use super::{column_needs_change, DialectStrategy};
use crate::backends::DatabaseValue;
use crate::error::{SchemaError, SchemaResult};
use crate::migrations::definitions::{ColumnChange, ValueSource};
use crate::migrations::schema_builder::{ColumnDef, ColumnInfo, SchemaBuilder, TableBuilder, TableConstraints};

/// Suffix of the temporary table created during a rebuild
pub const REBUILD_SUFFIX: &str = "_new";

/// What a rebuild did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// The column already had its final type
    AlreadyConverted,
    /// The table was replaced
    Rebuilt { rows_copied: u64 },
}

/// Create-copy-drop-rename replacement of one table
pub struct TableRebuild<'a, S: DialectStrategy + ?Sized> {
    strategy: &'a S,
    change: &'a ColumnChange,
}

impl<'a, S: DialectStrategy + ?Sized> TableRebuild<'a, S> {
    pub fn new(strategy: &'a S, change: &'a ColumnChange) -> Self {
        Self { strategy, change }
    }

    /// Name of the temporary table
    pub fn temp_table(&self) -> String {
        format!("{}{}", self.change.table, REBUILD_SUFFIX)
    }

    /// Final definition synthesized from the current columns and constraints
    pub fn target_definition(&self, current: &[ColumnInfo], constraints: &TableConstraints) -> TableBuilder {
        let table = current.iter().fold(TableBuilder::new(&self.temp_table()), |table, column| {
            if column.name.eq_ignore_ascii_case(&self.change.column) {
                table.column(self.change.definition.renamed(&column.name))
            } else {
                table.column(ColumnDef::from(column))
            }
        });
        constraints
            .unique
            .iter()
            .fold(table, |table, columns| table.unique(columns.clone()))
    }

    pub async fn run(
        &self,
        conn: &mut <S::Database as Database>::Connection,
    ) -> SchemaResult<RebuildOutcome> {
        let table = self.change.table.as_str();

        if !column_needs_change(self.strategy, &mut *conn, self.change).await? {
            debug!(table, column = %self.change.column, "Column already converted, skipping rebuild");
            return Ok(RebuildOutcome::AlreadyConverted);
        }

        if !self.strategy.capabilities().transactional_ddl {
            warn!(table, "Dialect does not roll back DDL, a failed rebuild may leave partial state");
        }

        // a. introspect
        let current = self.strategy.table_columns(&mut *conn, table).await?;
        let constraints = self.strategy.table_constraints(&mut *conn, table).await?;

        // b. synthesize
        let target = self.target_definition(&current, &constraints);
        let temp_table = self.temp_table();

        // c. create under the temporary name
        self.strategy
            .execute(&mut *conn, &target.to_sql())
            .await
            .map_err(|e| SchemaError::Ddl(format!("Failed to create rebuild table {}: {}", temp_table, e)))?;

        // d. copy
        let copied_columns: Vec<&str> = current
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| !name.eq_ignore_ascii_case(&self.change.column))
            .collect();
        let rows_copied = self.copy_rows(&mut *conn, &temp_table, &copied_columns).await?;

        // e. drop and f. rename
        let mut swap = SchemaBuilder::new();
        swap.drop_table(table).rename_table(&temp_table, table);
        for statement in swap.to_sql() {
            self.strategy
                .execute(&mut *conn, &statement)
                .await
                .map_err(|e| SchemaError::Ddl(format!("Failed to swap rebuilt table {}: {}", table, e)))?;
        }

        for index in &constraints.indexes {
            self.strategy
                .execute(&mut *conn, index)
                .await
                .map_err(|e| SchemaError::Ddl(format!("Failed to recreate index on {}: {}", table, e)))?;
        }

        info!(table, rows_copied, "Rebuilt table");
        Ok(RebuildOutcome::Rebuilt { rows_copied })
    }

    async fn copy_rows(
        &self,
        conn: &mut <S::Database as Database>::Connection,
        temp_table: &str,
        copied_columns: &[&str],
    ) -> SchemaResult<u64> {
        let table = self.change.table.as_str();
        let column = self.change.column.as_str();

        let mut insert_columns = copied_columns.join(", ");
        let mut select_columns = insert_columns.clone();
        if !copied_columns.is_empty() {
            insert_columns.push_str(", ");
            select_columns.push_str(", ");
        }
        insert_columns.push_str(column);

        match self.change.source {
            ValueSource::Cast => {
                let sql = format!(
                    "INSERT INTO {} ({}) SELECT {}CAST({} AS {}) FROM {}",
                    temp_table, insert_columns, select_columns, column, self.change.definition.sql_type, table
                );
                self.strategy
                    .execute(&mut *conn, &sql)
                    .await
                    .map_err(|e| SchemaError::DataCopy(format!("Failed to copy rows of {}: {}", table, e)))
            }
            ValueSource::OpaqueId => {
                let keys = self
                    .strategy
                    .row_keys(&mut *conn, table)
                    .await
                    .map_err(|e| SchemaError::DataCopy(format!("Failed to read rows of {}: {}", table, e)))?;

                let sql = format!(
                    "INSERT INTO {} ({}) SELECT {}{} FROM {} WHERE {}",
                    temp_table,
                    insert_columns,
                    select_columns,
                    self.strategy.placeholder(1),
                    table,
                    self.strategy.row_key_predicate(2)
                );

                let ids = self.strategy.id_generator();
                let mut copied = 0;
                for key in keys {
                    let id = ids
                        .new_id()
                        .map_err(|e| SchemaError::DataCopy(format!("Failed to generate id for {}: {}", table, e)))?;
                    copied += self
                        .strategy
                        .execute_with(&mut *conn, &sql, &[DatabaseValue::String(id), DatabaseValue::String(key)])
                        .await
                        .map_err(|e| SchemaError::DataCopy(format!("Failed to copy row of {}: {}", table, e)))?;
                }
                Ok(copied)
            }
        }
    }
}
