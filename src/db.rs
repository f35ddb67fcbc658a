use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS queued_items (
        id           TEXT PRIMARY KEY NOT NULL,
        family       TEXT NOT NULL,
        logical_type TEXT NOT NULL,
        payload      BLOB NOT NULL,
        saved_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_queued_items_family ON queued_items (family, saved_at)",
    r#"
    CREATE TABLE IF NOT EXISTS secure_records (
        namespace  TEXT NOT NULL,
        record_key TEXT NOT NULL,
        payload    BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (namespace, record_key)
    )
    "#,
];

/// Opens (creating if needed) the local database and applies the schema.
pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if in_memory {
        // every connection to :memory: is a separate database
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await?
    };

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}
