//! Error types for the schema layer
//!
//! Every failure while bringing the schema up to date is fatal to startup.
//! The variants classify where the failure happened so the operator knows
//! whether the database was unreachable, unreadable, or left mid-change.

/// Result type alias for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Error types for schema initialization and migrations
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Database unreachable or a connection/transaction could not be opened
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// Current schema shape could not be determined
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// A structural statement failed
    #[error("DDL error: {0}")]
    Ddl(String),

    /// Row migration during a table rebuild failed
    #[error("Data copy error: {0}")]
    DataCopy(String),

    /// The tracking table could not be created, read or written
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// The random source is unavailable
    #[error("Entropy error: {0}")]
    Entropy(String),

    /// Invalid configuration or migration catalog
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A pending migration failed; later migrations were not attempted
    #[error("Failed to apply migration {id} ({name}): {source}")]
    Migration {
        id: i32,
        name: String,
        source: Box<SchemaError>,
    },
}

impl SchemaError {
    /// Wrap an error raised while applying the given migration
    pub fn migration(id: i32, name: &str, source: SchemaError) -> Self {
        SchemaError::Migration {
            id,
            name: name.to_string(),
            source: Box::new(source),
        }
    }

    /// The underlying error, looking through migration wrappers
    pub fn root(&self) -> &SchemaError {
        match self {
            SchemaError::Migration { source, .. } => source.root(),
            other => other,
        }
    }

    /// Id of the migration that failed, if this error came from the runner
    pub fn migration_id(&self) -> Option<i32> {
        match self {
            SchemaError::Migration { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_display() {
        let err = SchemaError::migration(
            3,
            "change_id_to_string",
            SchemaError::DataCopy("Failed to copy row".to_string()),
        );

        let message = err.to_string();
        assert!(message.contains("migration 3"));
        assert!(message.contains("change_id_to_string"));
        assert!(message.contains("Data copy error: Failed to copy row"));
    }

    #[test]
    fn test_root_unwraps_migration_error() {
        let err = SchemaError::migration(2, "add_proxy_url", SchemaError::Ddl("boom".to_string()));

        assert_eq!(err.migration_id(), Some(2));
        assert!(matches!(err.root(), SchemaError::Ddl(msg) if msg == "boom"));

        let plain = SchemaError::Tracking("duplicate".to_string());
        assert_eq!(plain.migration_id(), None);
        assert!(matches!(plain.root(), SchemaError::Tracking(_)));
    }
}
