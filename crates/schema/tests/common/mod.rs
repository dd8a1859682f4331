#![allow(dead_code)]

use sessreg_schema::{IdGenerator, SchemaError, SchemaResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

/// `users` as created by releases that still used integer ids
pub const LEGACY_USERS_SQL: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    token TEXT NOT NULL,
    webhook TEXT NOT NULL DEFAULT '',
    jid TEXT NOT NULL DEFAULT '',
    qrcode TEXT NOT NULL DEFAULT '',
    connected INTEGER,
    expiration INTEGER,
    events TEXT NOT NULL DEFAULT 'All'
)";

pub const FINAL_USER_COLUMNS: [&str; 10] = [
    "id",
    "name",
    "token",
    "webhook",
    "jid",
    "qrcode",
    "connected",
    "expiration",
    "events",
    "proxy_url",
];

/// Generator whose random source is always unavailable
pub struct FailingIdGenerator;

impl IdGenerator for FailingIdGenerator {
    fn new_id(&self) -> SchemaResult<String> {
        Err(SchemaError::Entropy("random source unavailable".to_string()))
    }
}

pub async fn sqlite_pool(dir: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("users.db"))
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap()
}

pub async fn execute(pool: &SqlitePool, sql: &str) {
    sqlx::query(sql).execute(pool).await.unwrap();
}

/// Every column of `users` except `id`
pub type UserFields = (String, String, String, String, String, Option<i32>, Option<i32>, String);

pub const USER_FIELDS_SQL: &str =
    "SELECT name, token, webhook, jid, qrcode, connected, expiration, events FROM users ORDER BY name";

pub const INSERT_USER_SQL: &str =
    "INSERT INTO users (name, token, webhook, jid, qrcode, connected, expiration, events) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// Sessions seeded into legacy tables, ordered by name
pub fn expected_user_fields() -> Vec<UserFields> {
    vec![
        (
            "alpha".to_string(),
            "tok-a".to_string(),
            "https://hooks.example/alpha".to_string(),
            "5511999990001@s.whatsapp.net".to_string(),
            "".to_string(),
            Some(1),
            Some(1_700_000_000),
            "Message,ReadReceipt".to_string(),
        ),
        (
            "beta".to_string(),
            "tok-b".to_string(),
            "".to_string(),
            "".to_string(),
            "data:image/png;base64,iVBORw0KGgo".to_string(),
            Some(0),
            None,
            "All".to_string(),
        ),
        (
            "gamma".to_string(),
            "tok-c".to_string(),
            "https://hooks.example/gamma".to_string(),
            "5511999990003@s.whatsapp.net".to_string(),
            "".to_string(),
            None,
            Some(0),
            "Presence".to_string(),
        ),
    ]
}

/// Legacy table holding three sessions
pub async fn seed_legacy_users(pool: &SqlitePool) {
    execute(pool, LEGACY_USERS_SQL).await;
    insert_users(pool).await;
}

pub async fn insert_users(pool: &SqlitePool) {
    for (name, token, webhook, jid, qrcode, connected, expiration, events) in expected_user_fields() {
        sqlx::query(INSERT_USER_SQL)
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

pub async fn user_fields(pool: &SqlitePool) -> Vec<UserFields> {
    sqlx::query_as(USER_FIELDS_SQL).fetch_all(pool).await.unwrap()
}

pub async fn columns(pool: &SqlitePool, table: &str) -> Vec<(String, String)> {
    sqlx::query_as("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
    columns(pool, table).await.into_iter().map(|(name, _)| name).collect()
}

pub async fn column_type(pool: &SqlitePool, table: &str, column: &str) -> Option<String> {
    columns(pool, table)
        .await
        .into_iter()
        .find(|(name, _)| name == column)
        .map(|(_, data_type)| data_type)
}

pub async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_one(pool)
        .await
        .unwrap();
    count > 0
}

pub async fn ledger(pool: &SqlitePool) -> Vec<(i32, String)> {
    sqlx::query_as("SELECT id, name FROM migrations ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn builtin_ledger() -> Vec<(i32, String)> {
    vec![
        (1, "initial_schema".to_string()),
        (2, "add_proxy_url".to_string()),
        (3, "change_id_to_string".to_string()),
    ]
}
