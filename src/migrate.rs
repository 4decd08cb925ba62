use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// `harvest init`: create the database and its schema. Safe to re-run.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            uuid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            directory TEXT NOT NULL,
            icon TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            identity TEXT NOT NULL,
            schema TEXT NOT NULL,
            owner TEXT,
            harvested INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            changed_at INTEGER NOT NULL,
            UNIQUE(source_id, identity)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operation_allowed (
            record_id TEXT NOT NULL,
            group_name TEXT NOT NULL,
            operation TEXT NOT NULL,
            PRIMARY KEY (record_id, group_name, operation),
            FOREIGN KEY (record_id) REFERENCES records(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_categories (
            record_id TEXT NOT NULL,
            category TEXT NOT NULL,
            PRIMARY KEY (record_id, category),
            FOREIGN KEY (record_id) REFERENCES records(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 has no IF NOT EXISTS
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='records_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE records_fts USING fts5(
                record_id UNINDEXED,
                identity,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_id)")
        .execute(pool)
        .await?;

    Ok(())
}
