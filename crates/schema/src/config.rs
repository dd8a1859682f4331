//! Database configuration
//!
//! The backend is picked from the environment: a full set of `DB_*`
//! variables selects PostgreSQL, anything less falls back to the embedded
//! SQLite file under the data directory. `DATABASE_URL` overrides both.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::SqliteConnectOptions;
use url::Url;

use crate::backends::DatabaseBackendType;
use crate::error::{SchemaError, SchemaResult};

/// Data directory used when none is given
pub const DEFAULT_DATA_DIR: &str = "dbdata";

/// File name of the embedded database inside the data directory
pub const SQLITE_FILE_NAME: &str = "users.db";

/// Variables that together select PostgreSQL
pub const POSTGRES_ENV_VARS: [&str; 5] = ["DB_USER", "DB_PASSWORD", "DB_NAME", "DB_HOST", "DB_PORT"];

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a connection
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600),  // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

impl PoolConfig {
    /// Single writer pool for the embedded database
    pub fn sqlite() -> Self {
        Self {
            max_connections: 1,
            ..Self::default()
        }
    }
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackendType,
    pub url: String,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    /// Resolve the configuration from the process environment
    pub fn from_env(data_dir: Option<&Path>) -> SchemaResult<Self> {
        Self::resolve(|key| std::env::var(key).ok(), data_dir)
    }

    /// Resolve the configuration from an arbitrary variable lookup
    pub fn resolve<F>(lookup: F, data_dir: Option<&Path>) -> SchemaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            return Self::from_url(&url);
        }

        let postgres: Vec<String> = POSTGRES_ENV_VARS.iter().filter_map(|key| lookup(*key)).collect();
        if let [user, password, name, host, port] = postgres.as_slice() {
            return Self::postgres(user, password, name, host, port);
        }

        let data_dir = data_dir.unwrap_or_else(|| Path::new(DEFAULT_DATA_DIR));
        Ok(Self::sqlite(data_dir.join(SQLITE_FILE_NAME)))
    }

    /// Configuration for an explicit connection URL
    pub fn from_url(url: &str) -> SchemaResult<Self> {
        let backend = DatabaseBackendType::from_url(url).map_err(SchemaError::Configuration)?;
        let pool = match backend {
            DatabaseBackendType::SQLite => PoolConfig::sqlite(),
            DatabaseBackendType::PostgreSQL => PoolConfig::default(),
        };

        Ok(Self {
            backend,
            url: url.to_string(),
            pool,
        })
    }

    /// Embedded database stored at `path`
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            backend: DatabaseBackendType::SQLite,
            url: format!("sqlite://{}", path.as_ref().display()),
            pool: PoolConfig::sqlite(),
        }
    }

    /// PostgreSQL server from its connection parts
    pub fn postgres(user: &str, password: &str, name: &str, host: &str, port: &str) -> SchemaResult<Self> {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|e| SchemaError::Configuration(format!("Invalid DB_PORT {}: {}", port, e)))?;

        let mut url = Url::parse("postgres://localhost")
            .map_err(|e| SchemaError::Configuration(format!("Failed to build database URL: {}", e)))?;
        url.set_host(Some(host))
            .map_err(|e| SchemaError::Configuration(format!("Invalid DB_HOST {}: {}", host, e)))?;
        url.set_port(Some(port))
            .map_err(|_| SchemaError::Configuration(format!("Invalid DB_PORT {}", port)))?;
        url.set_username(user)
            .map_err(|_| SchemaError::Configuration(format!("Invalid DB_USER {}", user)))?;
        url.set_password(Some(password))
            .map_err(|_| SchemaError::Configuration("Invalid DB_PASSWORD".to_string()))?;
        url.set_path(&format!("/{}", name));
        url.set_query(Some("sslmode=disable"));

        Ok(Self {
            backend: DatabaseBackendType::PostgreSQL,
            url: url.to_string(),
            pool: PoolConfig::default(),
        })
    }

    /// File backing an embedded database, if this is one
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        if self.backend != DatabaseBackendType::SQLite {
            return None;
        }
        if self.url.contains(":memory:") || self.url.contains("mode=memory") {
            return None;
        }
        let path = SqliteConnectOptions::from_str(&self.url).ok()?.get_filename();
        if path.as_os_str().is_empty() {
            return None;
        }
        Some(path.into_owned())
    }

    /// Connection URL safe to log
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => self.url.clone(),
        }
    }
}
