//! Schema migration. Idempotent; safe to run on every startup.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // created_at / updated_at are unix seconds.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_key TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("creating chunks table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_key ON chunks (source_key)")
        .execute(pool)
        .await
        .context("creating source key index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sources (
            source_key TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            origin TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("creating sources table")?;

    debug!("schema migrations applied");
    Ok(())
}
