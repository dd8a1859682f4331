//! PostgreSQL migrations, run only when `TEST_DATABASE_URL` points at a server.
//!
//! Each test works inside its own schema so tests can share one database.

mod common;

use std::sync::Arc;

use common::{expected_user_fields, sqlite_pool, FailingIdGenerator, UserFields, FINAL_USER_COLUMNS, USER_FIELDS_SQL};
use sessreg_schema::ids::is_opaque_id;
use sessreg_schema::migrations::TypeFamily;
use sessreg_schema::{
    initialize_schema, DialectStrategy, MigrationCatalog, MigrationRunner, PostgresStrategy, SchemaError, SchemaPool,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tempfile::TempDir;

const LEGACY_USERS_SQL: &str = "CREATE TABLE users (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    token TEXT NOT NULL,
    webhook TEXT NOT NULL DEFAULT '',
    jid TEXT NOT NULL DEFAULT '',
    qrcode TEXT NOT NULL DEFAULT '',
    connected INTEGER,
    expiration INTEGER,
    events TEXT NOT NULL DEFAULT 'All'
)";

async fn postgres_pool(schema: &'static str) -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        }
    };

    let admin = PgPool::connect(&url).await.unwrap();
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
        .execute(&admin)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .unwrap();
    admin.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET search_path TO {}", schema))
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
        .unwrap();
    Some(pool)
}

/// Legacy table holding the shared session fixtures
async fn seed_legacy_users(pool: &PgPool) {
    sqlx::query(LEGACY_USERS_SQL).execute(pool).await.unwrap();
    for (name, token, webhook, jid, qrcode, connected, expiration, events) in expected_user_fields() {
        sqlx::query(
            "INSERT INTO users (name, token, webhook, jid, qrcode, connected, expiration, events) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(name)
        .bind(token)
        .bind(webhook)
        .bind(jid)
        .bind(qrcode)
        .bind(connected)
        .bind(expiration)
        .bind(events)
        .execute(pool)
        .await
        .unwrap();
    }
}

async fn user_fields(pool: &PgPool) -> Vec<UserFields> {
    sqlx::query_as(USER_FIELDS_SQL).fetch_all(pool).await.unwrap()
}

async fn column_type(pool: &PgPool, column: &str) -> Option<String> {
    columns(pool)
        .await
        .into_iter()
        .find(|(name, _)| name == column)
        .map(|(_, data_type)| data_type)
}

async fn shape(pool: &PgPool) -> Vec<(String, TypeFamily)> {
    columns(pool)
        .await
        .into_iter()
        .map(|(name, data_type)| (name, TypeFamily::of(&data_type)))
        .collect()
}

async fn columns(pool: &PgPool) -> Vec<(String, String)> {
    sqlx::query_as(
        "SELECT column_name::text, data_type::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = 'users' ORDER BY ordinal_position",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn ledger(pool: &PgPool) -> Vec<(i32, String)> {
    sqlx::query_as("SELECT id, name FROM migrations ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_postgres_fresh_database_reaches_final_schema() {
    let Some(pool) = postgres_pool("sessreg_test_fresh").await else {
        return;
    };
    let schema_pool = SchemaPool::Postgres(pool.clone());

    let first = initialize_schema(&schema_pool).await.unwrap();
    assert_eq!(first.applied_migrations, vec![1, 2, 3]);
    assert_eq!(ledger(&pool).await, common::builtin_ledger());

    let names: Vec<String> = columns(&pool).await.into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, FINAL_USER_COLUMNS.to_vec());

    let second = initialize_schema(&schema_pool).await.unwrap();
    assert_eq!(second.applied_count, 0);
    assert_eq!(ledger(&pool).await, common::builtin_ledger());
}

#[tokio::test]
async fn test_postgres_legacy_integer_ids_become_opaque_ids() {
    let Some(pool) = postgres_pool("sessreg_test_legacy").await else {
        return;
    };
    seed_legacy_users(&pool).await;

    initialize_schema(&SchemaPool::Postgres(pool.clone())).await.unwrap();

    assert_eq!(column_type(&pool, "id").await.as_deref(), Some("text"));
    assert_eq!(user_fields(&pool).await, expected_user_fields());

    let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, proxy_url FROM users ORDER BY name")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|(id, _)| is_opaque_id(id)));
    assert!(rows.iter().all(|(_, proxy_url)| proxy_url.is_empty()));
    assert_ne!(rows[0].0, rows[1].0);
    assert_ne!(rows[1].0, rows[2].0);

    let primary_key: Vec<String> = sqlx::query_scalar(
        "SELECT kcu.column_name::text FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         WHERE tc.table_schema = current_schema() AND tc.table_name = 'users' \
           AND tc.constraint_type = 'PRIMARY KEY'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(primary_key, vec!["id".to_string()]);
}

#[tokio::test]
async fn test_postgres_and_sqlite_schemas_match() {
    let Some(pool) = postgres_pool("sessreg_test_parity").await else {
        return;
    };
    initialize_schema(&SchemaPool::Postgres(pool.clone())).await.unwrap();

    let dir = TempDir::new().unwrap();
    let sqlite = sqlite_pool(&dir).await;
    initialize_schema(&SchemaPool::Sqlite(sqlite.clone())).await.unwrap();

    let postgres_shape = shape(&pool).await;
    let sqlite_shape: Vec<(String, TypeFamily)> = common::columns(&sqlite, "users")
        .await
        .into_iter()
        .map(|(name, data_type)| (name, TypeFamily::of(&data_type)))
        .collect();

    assert_eq!(postgres_shape, sqlite_shape);
    assert_eq!(ledger(&pool).await, common::ledger(&sqlite).await);
}

#[tokio::test]
async fn test_postgres_failed_id_change_leaves_database_untouched() {
    let Some(pool) = postgres_pool("sessreg_test_atomic").await else {
        return;
    };
    seed_legacy_users(&pool).await;

    let runner = MigrationRunner::new(
        PostgresStrategy::with_id_generator(Arc::new(FailingIdGenerator)),
        pool.clone(),
    );
    let err = runner.run(&MigrationCatalog::builtin()).await.unwrap_err();

    assert_eq!(err.migration_id(), Some(3));
    assert!(matches!(err.root(), SchemaError::DataCopy(_)));
    assert_eq!(ledger(&pool).await, common::builtin_ledger()[..2].to_vec());
    assert_eq!(column_type(&pool, "id").await.as_deref(), Some("integer"));
    assert_eq!(column_type(&pool, "id_new").await, None);
    assert_eq!(user_fields(&pool).await, expected_user_fields());

    let retry = initialize_schema(&SchemaPool::Postgres(pool.clone())).await.unwrap();
    assert_eq!(retry.applied_migrations, vec![3]);
    assert_eq!(column_type(&pool, "id").await.as_deref(), Some("text"));
}

#[tokio::test]
async fn test_postgres_and_sqlite_legacy_upgrades_match() {
    let Some(pool) = postgres_pool("sessreg_test_legacy_parity").await else {
        return;
    };
    seed_legacy_users(&pool).await;
    initialize_schema(&SchemaPool::Postgres(pool.clone())).await.unwrap();

    let dir = TempDir::new().unwrap();
    let sqlite = sqlite_pool(&dir).await;
    common::seed_legacy_users(&sqlite).await;
    initialize_schema(&SchemaPool::Sqlite(sqlite.clone())).await.unwrap();

    let sqlite_shape: Vec<(String, TypeFamily)> = common::columns(&sqlite, "users")
        .await
        .into_iter()
        .map(|(name, data_type)| (name, TypeFamily::of(&data_type)))
        .collect();
    assert_eq!(shape(&pool).await, sqlite_shape);
    assert_eq!(user_fields(&pool).await, common::user_fields(&sqlite).await);
    assert_eq!(ledger(&pool).await, common::ledger(&sqlite).await);
}

#[tokio::test]
async fn test_postgres_reports_constraints_for_rebuild() {
    let Some(pool) = postgres_pool("sessreg_test_constraints").await else {
        return;
    };
    sqlx::query(&LEGACY_USERS_SQL.replace("token TEXT NOT NULL,", "token TEXT NOT NULL UNIQUE,"))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("CREATE INDEX idx_users_jid ON users (jid)")
        .execute(&pool)
        .await
        .unwrap();

    let strategy = PostgresStrategy::new();
    let mut conn = pool.acquire().await.unwrap();
    let constraints = strategy.table_constraints(&mut *conn, "users").await.unwrap();

    assert_eq!(constraints.unique, vec![vec!["token".to_string()]]);
    assert_eq!(constraints.indexes.len(), 1);
    assert!(constraints.indexes[0].contains("idx_users_jid"));

    sqlx::query("ALTER TABLE users ADD CONSTRAINT connected_flag CHECK (connected IN (0, 1))")
        .execute(&mut *conn)
        .await
        .unwrap();
    let err = strategy.table_constraints(&mut *conn, "users").await.unwrap_err();
    assert!(matches!(err, SchemaError::Introspection(_)));
}
