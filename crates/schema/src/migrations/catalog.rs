//! Migration Catalog - the ordered list of every released migration
//!
//! Entries are never edited once released. New schema changes are appended
//! with the next id.

use std::collections::HashSet;

use super::definitions::{ColumnChange, Guard, Migration, SchemaChange, ValueSource};
use super::schema_builder::{ColumnDef, TableBuilder};
use crate::error::{SchemaError, SchemaResult};

/// Name of the managed session table
pub const USERS_TABLE: &str = "users";

/// Final shape of the session table
pub fn users_table(table_name: &str) -> TableBuilder {
    TableBuilder::new(table_name)
        .column(ColumnDef::new("id", "TEXT").primary_key())
        .column(ColumnDef::new("name", "TEXT").not_null())
        .column(ColumnDef::new("token", "TEXT").not_null())
        .column(ColumnDef::new("webhook", "TEXT").not_null().default("''"))
        .column(ColumnDef::new("jid", "TEXT").not_null().default("''"))
        .column(ColumnDef::new("qrcode", "TEXT").not_null().default("''"))
        .column(ColumnDef::new("connected", "INTEGER"))
        .column(ColumnDef::new("expiration", "INTEGER"))
        .column(ColumnDef::new("events", "TEXT").not_null().default("'All'"))
        .column(ColumnDef::new("proxy_url", "TEXT").default("''"))
}

/// Immutable, ordered registry of migrations
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    migrations: Vec<Migration>,
}

impl MigrationCatalog {
    /// The migrations shipped with this release
    pub fn builtin() -> Self {
        Self {
            migrations: vec![
                Migration::new(
                    1,
                    "initial_schema",
                    SchemaChange::Sql {
                        guard: Guard::TableMissing(USERS_TABLE.to_string()),
                        sql: users_table(USERS_TABLE).to_sql(),
                    },
                )
                .with_down_sql("DROP TABLE users"),
                Migration::new(
                    2,
                    "add_proxy_url",
                    SchemaChange::AddColumn {
                        table: USERS_TABLE.to_string(),
                        column: ColumnDef::new("proxy_url", "TEXT").default("''"),
                    },
                )
                .with_down_sql("ALTER TABLE users DROP COLUMN proxy_url"),
                Migration::new(
                    3,
                    "change_id_to_string",
                    SchemaChange::ChangeColumnType(ColumnChange {
                        table: USERS_TABLE.to_string(),
                        column: "id".to_string(),
                        from_type: "INTEGER".to_string(),
                        definition: ColumnDef::new("id", "TEXT").primary_key(),
                        source: ValueSource::OpaqueId,
                    }),
                ),
            ],
        }
    }

    /// Build a catalog from arbitrary entries, sorted by id
    pub fn from_migrations(mut migrations: Vec<Migration>) -> SchemaResult<Self> {
        migrations.sort_by_key(|m| m.id);

        let mut seen = HashSet::new();
        for migration in &migrations {
            if migration.id < 1 {
                return Err(SchemaError::Configuration(format!(
                    "Migration id must be positive, got {} ({})",
                    migration.id, migration.name
                )));
            }
            if !seen.insert(migration.id) {
                return Err(SchemaError::Configuration(format!(
                    "Duplicate migration id {}",
                    migration.id
                )));
            }
        }

        Ok(Self { migrations })
    }

    /// All migrations, ascending by id
    pub fn list(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn get(&self, id: i32) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.id == id)
    }

    pub fn latest_id(&self) -> Option<i32> {
        self.migrations.last().map(|m| m.id)
    }

    /// Migrations not in `applied`, ascending by id
    pub fn pending<'a>(&'a self, applied: &'a HashSet<i32>) -> impl Iterator<Item = &'a Migration> + 'a {
        self.migrations.iter().filter(move |m| !applied.contains(&m.id))
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl Default for MigrationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(id: i32, name: &'static str) -> Migration {
        Migration::new(
            id,
            name,
            SchemaChange::Sql {
                guard: Guard::TableMissing(name.to_string()),
                sql: format!("CREATE TABLE {} (id INTEGER)", name),
            },
        )
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = MigrationCatalog::builtin();
        let entries: Vec<(i32, &str)> = catalog.list().iter().map(|m| (m.id, m.name)).collect();

        assert_eq!(
            entries,
            vec![(1, "initial_schema"), (2, "add_proxy_url"), (3, "change_id_to_string")]
        );
        assert_eq!(catalog.latest_id(), Some(3));
        assert_eq!(catalog.get(2).and_then(|m| m.change.strategy_name()), Some("add-column-if-absent"));
        assert_eq!(catalog.get(3).and_then(|m| m.change.strategy_name()), Some("rebuild-table"));
        assert_eq!(catalog.get(1).and_then(|m| m.change.strategy_name()), None);
        assert!(catalog.get(3).map(|m| m.down_sql.is_none()).unwrap_or(false));
    }

    #[test]
    fn test_initial_schema_sql() {
        let catalog = MigrationCatalog::builtin();
        match &catalog.get(1).unwrap().change {
            SchemaChange::Sql { guard, sql } => {
                assert_eq!(guard, &Guard::TableMissing("users".to_string()));
                assert!(sql.starts_with("CREATE TABLE users ("));
                assert!(sql.contains("id TEXT PRIMARY KEY"));
                assert!(sql.contains("events TEXT NOT NULL DEFAULT 'All'"));
                assert!(sql.contains("proxy_url TEXT DEFAULT ''"));
            }
            other => panic!("Unexpected change for initial schema: {:?}", other),
        }
    }

    #[test]
    fn test_from_migrations_sorts_by_id() {
        let catalog = MigrationCatalog::from_migrations(vec![
            plain(3, "third"),
            plain(1, "first"),
            plain(2, "second"),
        ])
        .unwrap();

        let ids: Vec<i32> = catalog.list().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_from_migrations_rejects_duplicates_and_non_positive_ids() {
        let duplicate = MigrationCatalog::from_migrations(vec![plain(1, "a"), plain(1, "b")]);
        assert!(matches!(duplicate, Err(SchemaError::Configuration(_))));

        let zero = MigrationCatalog::from_migrations(vec![plain(0, "zero")]);
        assert!(matches!(zero, Err(SchemaError::Configuration(_))));
    }

    #[test]
    fn test_pending_skips_applied() {
        let catalog = MigrationCatalog::builtin();
        let applied: HashSet<i32> = [1, 3].into_iter().collect();

        let pending: Vec<i32> = catalog.pending(&applied).map(|m| m.id).collect();
        assert_eq!(pending, vec![2]);
    }
}
