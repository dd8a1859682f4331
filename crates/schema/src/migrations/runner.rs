//! Migration Runner - Executes migrations against the database
//!
//! Each pending migration runs on its own transaction together with its
//! ledger row. The first failure rolls back that migration and stops the run;
//! migrations committed before it stay applied.

use std::time::Instant;

use sqlx::Pool;
use tracing::{debug, error, info, warn};

use super::catalog::MigrationCatalog;
use super::definitions::{Migration, MigrationRecord, MigrationRunResult, MigrationStatus};
use super::tracker::{MigrationTracker, TRACKING_TABLE};
use crate::dialect::{apply_migration, ApplyOutcome, DialectStrategy};
use crate::error::{SchemaError, SchemaResult};

/// Migration runner that executes migrations against a database
pub struct MigrationRunner<S: DialectStrategy> {
    strategy: S,
    pool: Pool<S::Database>,
}

impl<S: DialectStrategy> MigrationRunner<S> {
    /// Create a new migration runner
    pub fn new(strategy: S, pool: Pool<S::Database>) -> Self {
        Self { strategy, pool }
    }

    fn tracker(&self) -> MigrationTracker<'_, S> {
        MigrationTracker::new(&self.strategy)
    }

    /// Run all pending migrations of the catalog in ascending id order
    pub async fn run(&self, catalog: &MigrationCatalog) -> SchemaResult<MigrationRunResult> {
        let start_time = Instant::now();
        let tracker = self.tracker();

        let applied_ids = {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| SchemaError::Connectivity(format!("Failed to acquire connection: {}", e)))?;
            tracker.ensure_tracking_table(&mut *conn).await?;
            tracker.applied_ids(&mut *conn).await?
        };

        for migration in catalog.list().iter().filter(|m| applied_ids.contains(&m.id)) {
            debug!(migration_id = migration.id, name = migration.name, "Migration already applied");
        }

        let pending: Vec<&Migration> = catalog.pending(&applied_ids).collect();
        let skipped_count = catalog.len() - pending.len();

        if pending.is_empty() {
            debug!(backend = %self.strategy.backend_type(), "Schema is up to date");
            return Ok(MigrationRunResult {
                applied_count: 0,
                applied_migrations: Vec::new(),
                skipped_count,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        let mut applied_migrations = Vec::with_capacity(pending.len());
        for migration in pending {
            info!(migration_id = migration.id, name = migration.name, "Applying migration");

            let outcome = self.apply_one(&tracker, migration).await.map_err(|e| {
                error!(migration_id = migration.id, name = migration.name, error = %e, "Migration failed");
                SchemaError::migration(migration.id, migration.name, e)
            })?;

            info!(migration_id = migration.id, name = migration.name, outcome = %outcome, "Migration applied");
            applied_migrations.push(migration.id);
        }

        Ok(MigrationRunResult {
            applied_count: applied_migrations.len(),
            applied_migrations,
            skipped_count,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Apply one migration and its ledger row atomically
    async fn apply_one(
        &self,
        tracker: &MigrationTracker<'_, S>,
        migration: &Migration,
    ) -> SchemaResult<ApplyOutcome> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| SchemaError::Connectivity(format!("Failed to start transaction: {}", e)))?;

        let applied = async {
            let outcome = apply_migration(&self.strategy, &mut *transaction, migration).await?;
            tracker
                .record_applied(&mut *transaction, migration.id, migration.name)
                .await?;
            Ok::<_, SchemaError>(outcome)
        }
        .await;

        match applied {
            Ok(outcome) => {
                transaction
                    .commit()
                    .await
                    .map_err(|e| SchemaError::Tracking(format!("Failed to commit migration: {}", e)))?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    warn!(migration_id = migration.id, error = %rollback_error, "Failed to roll back migration");
                }
                Err(e)
            }
        }
    }

    /// Applied migrations as recorded in the tracking table
    ///
    /// Returns an empty list when the tracking table has not been created.
    pub async fn applied_records(&self) -> SchemaResult<Vec<MigrationRecord>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SchemaError::Connectivity(format!("Failed to acquire connection: {}", e)))?;

        if !self.strategy.table_exists(&mut *conn, TRACKING_TABLE).await? {
            return Ok(Vec::new());
        }
        self.tracker().applied_records(&mut *conn).await
    }

    /// Status of every catalog entry, ascending by id
    pub async fn status<'c>(
        &self,
        catalog: &'c MigrationCatalog,
    ) -> SchemaResult<Vec<(&'c Migration, MigrationStatus)>> {
        let records = self.applied_records().await?;

        Ok(catalog
            .list()
            .iter()
            .map(|migration| {
                let status = records
                    .iter()
                    .find(|r| r.id == migration.id)
                    .map(|r| MigrationStatus::Applied { applied_at: r.applied_at })
                    .unwrap_or(MigrationStatus::Pending);
                (migration, status)
            })
            .collect())
    }
}
