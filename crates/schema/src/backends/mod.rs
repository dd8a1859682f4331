//! Database Backend Types
//!
//! Identifies the SQL engines the schema layer can drive and the values it
//! binds into dialect-specific statements.

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Detect the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Result<Self, String> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| format!("Database URL has no scheme: {}", url))?;
        scheme.parse()
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for DatabaseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseBackendType::PostgreSQL),
            "sqlite" => Ok(DatabaseBackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

/// Value bound into a dialect statement
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Int32(i32),
    String(String),
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("postgres".parse::<DatabaseBackendType>(), Ok(DatabaseBackendType::PostgreSQL));
        assert_eq!("PostgreSQL".parse::<DatabaseBackendType>(), Ok(DatabaseBackendType::PostgreSQL));
        assert_eq!("sqlite".parse::<DatabaseBackendType>(), Ok(DatabaseBackendType::SQLite));
        assert!("mysql".parse::<DatabaseBackendType>().is_err());
    }

    #[test]
    fn test_backend_type_from_url() {
        assert_eq!(
            DatabaseBackendType::from_url("postgres://user:pw@localhost:5432/db"),
            Ok(DatabaseBackendType::PostgreSQL)
        );
        assert_eq!(
            DatabaseBackendType::from_url("sqlite://dbdata/users.db"),
            Ok(DatabaseBackendType::SQLite)
        );
        assert!(DatabaseBackendType::from_url("users.db").is_err());
    }
}
