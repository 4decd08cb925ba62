//! SQLite-backed [`CatalogStore`] implementation.
//!
//! Records live in `records`, keyed by a UUID and unique per
//! `(source_id, identity)`. Allowed operations and categories are child
//! tables, written in the same transaction as a new record and later
//! replaced wholesale inside a transaction. The search index is the
//! FTS5 table `records_fts`, one row per record.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use catalog_harvest_core::models::{
    CatalogRecord, HarvestSource, NewRecord, Operation, OperationGrant, RecordSummary,
};
use catalog_harvest_core::store::CatalogStore;

/// SQLite implementation of [`CatalogStore`].
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| anyhow!("timestamp out of range: {}", ts))
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RecordSummary> {
    Ok(RecordSummary {
        id: row.get("id"),
        identity: row.get("identity"),
        schema: row.get("schema"),
        changed_at: from_ts(row.get("changed_at"))?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn ensure_source(&self, source: &HarvestSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (uuid, name, directory, icon, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(uuid) DO UPDATE SET
                name = excluded.name,
                directory = excluded.directory,
                icon = excluded.icon,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&source.uuid)
        .bind(&source.name)
        .bind(source.directory.display().to_string())
        .bind(&source.icon)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("registering source {}", source.uuid))?;
        Ok(())
    }

    async fn find_by_owner(&self, source_id: &str) -> Result<Vec<RecordSummary>> {
        let rows = sqlx::query(
            "SELECT id, identity, schema, changed_at FROM records WHERE source_id = ? ORDER BY identity",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn find_by_owner_and_identity(
        &self,
        source_id: &str,
        identity: &str,
    ) -> Result<Option<RecordSummary>> {
        let row = sqlx::query(
            "SELECT id, identity, schema, changed_at FROM records WHERE source_id = ? AND identity = ?",
        )
        .bind(source_id)
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, identity, schema, source_id, owner, harvested, content,
                   created_at, changed_at
            FROM records WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let mut operations = sqlx::query(
            "SELECT group_name, operation FROM operation_allowed WHERE record_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<OperationGrant> {
            let op: String = r.get("operation");
            Ok(OperationGrant::new(
                r.get::<String, _>("group_name"),
                op.parse::<Operation>()?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
        operations.sort();

        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT category FROM record_categories WHERE record_id = ? ORDER BY category",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let harvested: i64 = row.get("harvested");
        Ok(Some(CatalogRecord {
            id: row.get("id"),
            identity: row.get("identity"),
            schema: row.get("schema"),
            source_id: row.get("source_id"),
            owner: row.get("owner"),
            harvested: harvested != 0,
            content: row.get("content"),
            categories,
            operations,
            created_at: from_ts(row.get("created_at"))?,
            changed_at: from_ts(row.get("changed_at"))?,
        }))
    }

    async fn insert(&self, record: &NewRecord) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let ts = record.created_at.timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO records (id, source_id, identity, schema, owner, harvested,
                                 content, created_at, changed_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&record.source_id)
        .bind(&record.identity)
        .bind(&record.schema)
        .bind(&record.owner)
        .bind(&record.content)
        .bind(ts)
        .bind(ts)
        .execute(&mut *tx)
        .await
        .with_context(|| {
            format!(
                "inserting '{}' for source {}",
                record.identity, record.source_id
            )
        })?;

        for grant in &record.operations {
            sqlx::query(
                "INSERT OR IGNORE INTO operation_allowed (record_id, group_name, operation) VALUES (?, ?, ?)",
            )
            .bind(&id)
            .bind(&grant.group)
            .bind(grant.operation.as_str())
            .execute(&mut *tx)
            .await?;
        }
        for category in &record.categories {
            sqlx::query("INSERT OR IGNORE INTO record_categories (record_id, category) VALUES (?, ?)")
                .bind(&id)
                .bind(category)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn replace_content(
        &self,
        id: &str,
        content: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        let done = sqlx::query("UPDATE records SET content = ?, changed_at = ? WHERE id = ?")
            .bind(content)
            .bind(changed_at.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            bail!("record {} not found", id);
        }
        Ok(())
    }

    async fn replace_allowed_operations(&self, id: &str, grants: &[OperationGrant]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM operation_allowed WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for grant in grants {
            sqlx::query(
                "INSERT OR IGNORE INTO operation_allowed (record_id, group_name, operation) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(&grant.group)
            .bind(grant.operation.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_categories(&self, id: &str, categories: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM record_categories WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for category in categories {
            sqlx::query("INSERT OR IGNORE INTO record_categories (record_id, category) VALUES (?, ?)")
                .bind(id)
                .bind(category)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM operation_allowed WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM record_categories WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM records_fts WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let done = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if done.rows_affected() == 0 {
            bail!("record {} not found", id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reindex(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records_fts WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let done = sqlx::query(
            "INSERT INTO records_fts (record_id, identity, content) SELECT id, identity, content FROM records WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            bail!("record {} not found", id);
        }

        tx.commit().await?;
        Ok(())
    }
}
