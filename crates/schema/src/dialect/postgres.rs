//! PostgreSQL dialect
//!
//! PostgreSQL alters columns in place, so type changes swap in a shadow
//! column instead of rebuilding the table. Metadata comes from
//! `information_schema`, scoped to the current schema.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres};
use tracing::info;

use super::{DialectCapabilities, DialectStrategy};
use crate::backends::{DatabaseBackendType, DatabaseValue};
use crate::error::{SchemaError, SchemaResult};
use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::migrations::definitions::{ColumnChange, MigrationRecord, ValueSource};
use crate::migrations::schema_builder::{ColumnDef, ColumnInfo, SchemaBuilder, TableConstraints};

/// Strategy for the PostgreSQL dialect
pub struct PostgresStrategy {
    ids: Arc<dyn IdGenerator>,
}

impl PostgresStrategy {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(RandomIdGenerator))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    async fn primary_key_constraint(&self, conn: &mut PgConnection, table: &str) -> SchemaResult<Option<String>> {
        sqlx::query_scalar(
            "SELECT constraint_name::text FROM information_schema.table_constraints \
             WHERE table_schema = current_schema() AND table_name = $1 AND constraint_type = 'PRIMARY KEY'",
        )
        .bind(table)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to get primary key of {}: {}", table, e)))
    }

    async fn primary_key_columns(&self, conn: &mut PgConnection, table: &str) -> SchemaResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT kcu.column_name::text \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.table_schema = current_schema() AND tc.table_name = $1 \
               AND tc.constraint_type = 'PRIMARY KEY'",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to get primary key columns of {}: {}", table, e)))
    }

    async fn run_statements(&self, conn: &mut PgConnection, builder: &SchemaBuilder) -> SchemaResult<()> {
        for statement in builder.to_sql() {
            sqlx::query(&statement)
                .execute(&mut *conn)
                .await
                .map_err(|e| SchemaError::Ddl(format!("Failed to execute `{}`: {}", statement, e)))?;
        }
        Ok(())
    }
}

impl Default for PostgresStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DialectStrategy for PostgresStrategy {
    type Database = Postgres;

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::postgres()
    }

    fn id_generator(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn row_key_predicate(&self, index: usize) -> String {
        format!("ctid = {}::tid", self.placeholder(index))
    }

    async fn table_exists(&self, conn: &mut PgConnection, table: &str) -> SchemaResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to check table {} existence: {}", table, e)))
    }

    async fn table_columns(&self, conn: &mut PgConnection, table: &str) -> SchemaResult<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to get columns of {}: {}", table, e)))?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let primary_key = self.primary_key_columns(&mut *conn, table).await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| ColumnInfo {
                primary_key: primary_key.contains(&name),
                name,
                data_type,
                not_null: is_nullable == "NO",
                default,
            })
            .collect())
    }

    async fn table_constraints(&self, conn: &mut PgConnection, table: &str) -> SchemaResult<TableConstraints> {
        let unsupported: Vec<String> = sqlx::query_scalar(
            "SELECT con.conname::text FROM pg_constraint con \
             JOIN pg_class rel ON rel.oid = con.conrelid \
             JOIN pg_namespace ns ON ns.oid = rel.relnamespace \
             WHERE ns.nspname = current_schema() AND rel.relname = $1 \
               AND con.contype IN ('c', 'f', 'x') \
             ORDER BY con.conname",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to list constraints of {}: {}", table, e)))?;
        if !unsupported.is_empty() {
            return Err(SchemaError::Introspection(format!(
                "Table {} has constraints a rebuild cannot carry over: {}",
                table,
                unsupported.join(", ")
            )));
        }

        let unique: Vec<(String, Vec<String>)> = sqlx::query_as(
            "SELECT con.conname::text, array_agg(att.attname::text ORDER BY k.ord) \
             FROM pg_constraint con \
             JOIN pg_class rel ON rel.oid = con.conrelid \
             JOIN pg_namespace ns ON ns.oid = rel.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum \
             WHERE ns.nspname = current_schema() AND rel.relname = $1 \
               AND con.contype = 'u' \
             GROUP BY con.conname \
             ORDER BY con.conname",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to list unique constraints of {}: {}", table, e)))?;

        let indexes: Vec<String> = sqlx::query_scalar(
            "SELECT pg_get_indexdef(ind.indexrelid) FROM pg_index ind \
             JOIN pg_class rel ON rel.oid = ind.indrelid \
             JOIN pg_class idx ON idx.oid = ind.indexrelid \
             JOIN pg_namespace ns ON ns.oid = rel.relnamespace \
             WHERE ns.nspname = current_schema() AND rel.relname = $1 \
               AND NOT EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conindid = ind.indexrelid) \
             ORDER BY idx.relname",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to list indexes of {}: {}", table, e)))?;

        Ok(TableConstraints {
            unique: unique.into_iter().map(|(_, columns)| columns).collect(),
            indexes,
        })
    }

    async fn row_keys(&self, conn: &mut PgConnection, table: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(&format!("SELECT ctid::text FROM {}", table))
            .fetch_all(&mut *conn)
            .await
    }

    async fn execute(&self, conn: &mut PgConnection, sql: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn execute_with(
        &self,
        conn: &mut PgConnection,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<u64, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                DatabaseValue::Int32(i) => query.bind(*i),
                DatabaseValue::String(s) => query.bind(s.clone()),
            };
        }
        let result = query.execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_applied(&self, conn: &mut PgConnection, tracking_table: &str) -> SchemaResult<Vec<MigrationRecord>> {
        let rows: Vec<(i32, String, Option<chrono::NaiveDateTime>)> =
            sqlx::query_as(&format!("SELECT id, name, applied_at FROM {} ORDER BY id ASC", tracking_table))
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| SchemaError::Tracking(format!("Failed to query applied migrations: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(id, name, applied_at)| MigrationRecord { id, name, applied_at })
            .collect())
    }

    async fn alter_column_in_place(&self, conn: &mut PgConnection, change: &ColumnChange) -> SchemaResult<()> {
        let table = change.table.as_str();
        let column = change.column.as_str();
        let definition = &change.definition;

        if change.source == ValueSource::Cast && !definition.primary_key {
            let sql = format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING CAST({} AS {})",
                table, column, definition.sql_type, column, definition.sql_type
            );
            sqlx::query(&sql)
                .execute(&mut *conn)
                .await
                .map_err(|e| SchemaError::Ddl(format!("Failed to change type of {}.{}: {}", table, column, e)))?;
            return Ok(());
        }

        // Shadow column carries the new values until the old column is gone
        let shadow = format!("{}_new", column);
        let mut add = SchemaBuilder::new();
        add.add_column(table, &ColumnDef::new(&shadow, &definition.sql_type));
        self.run_statements(&mut *conn, &add).await?;

        let filled = match change.source {
            ValueSource::Cast => {
                let sql = format!("UPDATE {} SET {} = CAST({} AS {})", table, shadow, column, definition.sql_type);
                self.execute(&mut *conn, &sql)
                    .await
                    .map_err(|e| SchemaError::DataCopy(format!("Failed to convert {}.{}: {}", table, column, e)))?
            }
            ValueSource::OpaqueId => {
                let keys = self
                    .row_keys(&mut *conn, table)
                    .await
                    .map_err(|e| SchemaError::DataCopy(format!("Failed to read rows of {}: {}", table, e)))?;
                let sql = format!("UPDATE {} SET {} = $1 WHERE {}", table, shadow, self.row_key_predicate(2));

                let mut filled = 0;
                for key in keys {
                    let id = self
                        .ids
                        .new_id()
                        .map_err(|e| SchemaError::DataCopy(format!("Failed to generate id for {}: {}", table, e)))?;
                    filled += self
                        .execute_with(&mut *conn, &sql, &[DatabaseValue::String(id), DatabaseValue::String(key)])
                        .await
                        .map_err(|e| SchemaError::DataCopy(format!("Failed to update row of {}: {}", table, e)))?;
                }
                filled
            }
        };

        let column_is_key = self
            .primary_key_columns(&mut *conn, table)
            .await?
            .iter()
            .any(|c| c == column);
        let pk_constraint = if column_is_key {
            self.primary_key_constraint(&mut *conn, table).await?
        } else {
            None
        };

        let mut swap = SchemaBuilder::new();
        if let Some(constraint) = pk_constraint.as_deref() {
            swap.drop_constraint(table, constraint);
        }
        swap.drop_column(table, column).rename_column(table, &shadow, column);
        if definition.not_null || definition.primary_key {
            swap.set_not_null(table, column);
        }
        if let Some(default) = definition.default.as_deref() {
            swap.set_default(table, column, default);
        }
        if definition.primary_key {
            swap.add_primary_key(table, column);
        }
        self.run_statements(&mut *conn, &swap).await?;

        info!(table, column, rows = filled, "Converted column in place");
        Ok(())
    }
}
