//! Schema Builder - column and table definitions for schema changes
//!
//! Column definitions are dialect-neutral: the same `CREATE TABLE` and
//! `ALTER TABLE` text is accepted by both PostgreSQL and SQLite.

/// Column definition used to create or alter a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub primary_key: bool,
    pub not_null: bool,
    pub default: Option<String>,
}

impl ColumnDef {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            primary_key: false,
            not_null: false,
            default: None,
        }
    }

    /// Mark the column as the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Set the default expression, written as SQL
    pub fn default(mut self, expression: &str) -> Self {
        self.default = Some(expression.to_string());
        self
    }

    /// Same definition under another name
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Column clause as it appears inside CREATE TABLE or ADD COLUMN
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Column as reported by dialect metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn type_family(&self) -> TypeFamily {
        TypeFamily::of(&self.data_type)
    }
}

impl From<&ColumnInfo> for ColumnDef {
    fn from(info: &ColumnInfo) -> Self {
        Self {
            name: info.name.clone(),
            sql_type: info.data_type.clone(),
            primary_key: info.primary_key,
            // A primary key column already implies NOT NULL where it matters
            not_null: info.not_null && !info.primary_key,
            // SQLite reports expression defaults without their parentheses
            default: info.default.as_ref().map(|expression| format!("({})", expression)),
        }
    }
}

/// Coarse type classification shared by both dialects
///
/// SQLite reports the declared type (`INTEGER`), PostgreSQL the catalog
/// name (`integer`, `character varying`); both collapse onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Integer,
    Text,
    Real,
    Timestamp,
    Other,
}

impl TypeFamily {
    pub fn of(data_type: &str) -> Self {
        let upper = data_type.to_uppercase();
        if upper.contains("INT") || upper == "SERIAL" || upper == "BIGSERIAL" {
            TypeFamily::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            TypeFamily::Text
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("NUMERIC")
        {
            TypeFamily::Real
        } else if upper.contains("TIMESTAMP") || upper.contains("DATE") {
            TypeFamily::Timestamp
        } else {
            TypeFamily::Other
        }
    }
}

/// Constraints and indexes a rebuilt table must carry over
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableConstraints {
    /// Column sets of UNIQUE constraints
    pub unique: Vec<Vec<String>>,
    /// CREATE INDEX statements of explicitly created indexes
    pub indexes: Vec<String>,
}

/// Table builder for CREATE TABLE statements
#[derive(Debug, Clone)]
pub struct TableBuilder {
    table_name: String,
    columns: Vec<ColumnDef>,
    unique: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Add a column
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a table-level UNIQUE constraint
    pub fn unique(mut self, columns: Vec<String>) -> Self {
        self.unique.push(columns);
        self
    }

    /// Build the CREATE TABLE SQL
    pub fn to_sql(&self) -> String {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(ColumnDef::to_sql)
            .chain(self.unique.iter().map(|columns| format!("UNIQUE ({})", columns.join(", "))))
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.table_name,
            parts.join(",\n    ")
        )
    }
}

/// Ordered ALTER statements for an in-place schema change
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    statements: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column to existing table
    pub fn add_column(&mut self, table_name: &str, column: &ColumnDef) -> &mut Self {
        self.statements
            .push(format!("ALTER TABLE {} ADD COLUMN {}", table_name, column.to_sql()));
        self
    }

    /// Drop a column together with anything depending on it
    pub fn drop_column(&mut self, table_name: &str, column_name: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} DROP COLUMN {} CASCADE",
            table_name, column_name
        ));
        self
    }

    pub fn drop_constraint(&mut self, table_name: &str, constraint_name: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table_name, constraint_name
        ));
        self
    }

    pub fn rename_column(&mut self, table_name: &str, from: &str, to: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            table_name, from, to
        ));
        self
    }

    pub fn set_not_null(&mut self, table_name: &str, column_name: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            table_name, column_name
        ));
        self
    }

    pub fn set_default(&mut self, table_name: &str, column_name: &str, expression: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            table_name, column_name, expression
        ));
        self
    }

    pub fn add_primary_key(&mut self, table_name: &str, column_name: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            table_name, column_name
        ));
        self
    }

    /// Drop a table
    pub fn drop_table(&mut self, table_name: &str) -> &mut Self {
        self.statements.push(format!("DROP TABLE {}", table_name));
        self
    }

    pub fn rename_table(&mut self, from: &str, to: &str) -> &mut Self {
        self.statements
            .push(format!("ALTER TABLE {} RENAME TO {}", from, to));
        self
    }

    /// Get all SQL statements
    pub fn to_sql(&self) -> Vec<String> {
        self.statements.clone()
    }
}
