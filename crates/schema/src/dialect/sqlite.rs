//! SQLite dialect
//!
//! SQLite cannot change a column's type or drop a constrained column, so
//! type changes go through the table rebuild. Metadata comes from
//! `sqlite_master` and the `pragma_*` table functions.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection};

use super::{DialectCapabilities, DialectStrategy};
use crate::backends::{DatabaseBackendType, DatabaseValue};
use crate::error::{SchemaError, SchemaResult};
use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::migrations::definitions::{ColumnChange, MigrationRecord};
use crate::migrations::schema_builder::{ColumnInfo, TableConstraints};

/// Strategy for the embedded SQLite dialect
pub struct SqliteStrategy {
    ids: Arc<dyn IdGenerator>,
}

impl SqliteStrategy {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(RandomIdGenerator))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }
}

/// True when a CREATE TABLE statement declares a CHECK constraint
///
/// Quoted identifiers and string literals are skipped.
fn declares_check(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i += 1;
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                if sql[start..i].eq_ignore_ascii_case("check")
                    && sql[i..].trim_start().starts_with('(')
                {
                    return true;
                }
            }
            _ => i += 1,
        }
    }
    false
}

impl Default for SqliteStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DialectStrategy for SqliteStrategy {
    type Database = Sqlite;

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::sqlite()
    }

    fn id_generator(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn row_key_predicate(&self, index: usize) -> String {
        format!("rowid = CAST({} AS INTEGER)", self.placeholder(index))
    }

    async fn table_exists(&self, conn: &mut SqliteConnection, table: &str) -> SchemaResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    SchemaError::Introspection(format!("Failed to check table {} existence: {}", table, e))
                })?;
        Ok(count > 0)
    }

    async fn table_columns(&self, conn: &mut SqliteConnection, table: &str) -> SchemaResult<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SchemaError::Introspection(format!("Failed to get table info for {}: {}", table, e)))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, not_null, default, pk)| ColumnInfo {
                name,
                data_type,
                not_null: not_null != 0,
                default,
                primary_key: pk != 0,
            })
            .collect())
    }

    async fn table_constraints(&self, conn: &mut SqliteConnection, table: &str) -> SchemaResult<TableConstraints> {
        let definition: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| SchemaError::Introspection(format!("Failed to read definition of {}: {}", table, e)))?
                .flatten();
        if definition.as_deref().is_some_and(declares_check) {
            return Err(SchemaError::Introspection(format!(
                "Table {} declares CHECK constraints, which a rebuild cannot carry over",
                table
            )));
        }

        let foreign_keys: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_foreign_key_list(?)")
            .bind(table)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| SchemaError::Introspection(format!("Failed to list foreign keys of {}: {}", table, e)))?;
        if foreign_keys > 0 {
            return Err(SchemaError::Introspection(format!(
                "Table {} declares foreign keys, which a rebuild cannot carry over",
                table
            )));
        }

        let indexes: Vec<(String, String)> =
            sqlx::query_as(r#"SELECT name, origin FROM pragma_index_list(?) ORDER BY name"#)
                .bind(table)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| SchemaError::Introspection(format!("Failed to list indexes of {}: {}", table, e)))?;

        let mut constraints = TableConstraints::default();
        for (index, origin) in indexes {
            match origin.as_str() {
                // rebuilt from the column definitions
                "pk" => {}
                "u" => {
                    let columns: Vec<Option<String>> =
                        sqlx::query_scalar("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                            .bind(&index)
                            .fetch_all(&mut *conn)
                            .await
                            .map_err(|e| {
                                SchemaError::Introspection(format!("Failed to read index {}: {}", index, e))
                            })?;
                    let columns = columns.into_iter().collect::<Option<Vec<String>>>().ok_or_else(|| {
                        SchemaError::Introspection(format!("Index {} covers an expression", index))
                    })?;
                    constraints.unique.push(columns);
                }
                _ => {
                    let sql: Option<String> =
                        sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?")
                            .bind(&index)
                            .fetch_optional(&mut *conn)
                            .await
                            .map_err(|e| {
                                SchemaError::Introspection(format!("Failed to read index {}: {}", index, e))
                            })?
                            .flatten();
                    if let Some(sql) = sql {
                        constraints.indexes.push(sql);
                    }
                }
            }
        }
        Ok(constraints)
    }

    async fn row_keys(&self, conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(&format!("SELECT CAST(rowid AS TEXT) FROM {} ORDER BY rowid", table))
            .fetch_all(&mut *conn)
            .await
    }

    async fn execute(&self, conn: &mut SqliteConnection, sql: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn execute_with(
        &self,
        conn: &mut SqliteConnection,
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

    async fn fetch_applied(
        &self,
        conn: &mut SqliteConnection,
        tracking_table: &str,
    ) -> SchemaResult<Vec<MigrationRecord>> {
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

    async fn alter_column_in_place(&self, _conn: &mut SqliteConnection, change: &ColumnChange) -> SchemaResult<()> {
        Err(SchemaError::Ddl(format!(
            "SQLite cannot change the type of {}.{} in place",
            change.table, change.column
        )))
    }
}
