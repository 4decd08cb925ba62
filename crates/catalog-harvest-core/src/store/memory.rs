//! In-memory [`CatalogStore`] implementation for tests.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`. Each trait call
//! takes the lock once, so every replace is atomic with respect to readers.
//! The "search index" is just the set of record ids that were reindexed.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{CatalogRecord, HarvestSource, NewRecord, OperationGrant, RecordSummary};

use super::CatalogStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSource {
    pub uuid: String,
    pub name: String,
    pub icon: Option<String>,
}

/// In-memory catalog.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    records: RwLock<HashMap<String, CatalogRecord>>,
    sources: RwLock<HashMap<String, StoredSource>>,
    indexed: RwLock<HashSet<String>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all sources.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self, uuid: &str) -> Option<StoredSource> {
        self.sources.read().ok()?.get(uuid).cloned()
    }

    pub fn is_indexed(&self, id: &str) -> bool {
        self.indexed
            .read()
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    /// Insert a fully-formed record, bypassing the uniqueness check. Used by
    /// tests to seed records owned by other sources.
    pub fn seed(&self, record: CatalogRecord) -> Result<()> {
        write(&self.records)?.insert(record.id.clone(), record);
        Ok(())
    }

    fn with_record<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut CatalogRecord),
    {
        let mut records = write(&self.records)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| anyhow!("record not found: {}", id))?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn ensure_source(&self, source: &HarvestSource) -> Result<()> {
        write(&self.sources)?.insert(
            source.uuid.clone(),
            StoredSource {
                uuid: source.uuid.clone(),
                name: source.name.clone(),
                icon: source.icon.clone(),
            },
        );
        Ok(())
    }

    async fn find_by_owner(&self, source_id: &str) -> Result<Vec<RecordSummary>> {
        let records = read(&self.records)?;
        let mut owned: Vec<RecordSummary> = records
            .values()
            .filter(|r| r.source_id == source_id)
            .map(RecordSummary::from)
            .collect();
        owned.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(owned)
    }

    async fn find_by_owner_and_identity(
        &self,
        source_id: &str,
        identity: &str,
    ) -> Result<Option<RecordSummary>> {
        let records = read(&self.records)?;
        Ok(records
            .values()
            .find(|r| r.source_id == source_id && r.identity == identity)
            .map(RecordSummary::from))
    }

    async fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>> {
        Ok(read(&self.records)?.get(id).cloned())
    }

    async fn insert(&self, record: &NewRecord) -> Result<String> {
        let mut records = write(&self.records)?;
        if records
            .values()
            .any(|r| r.source_id == record.source_id && r.identity == record.identity)
        {
            bail!(
                "record '{}' already exists for source {}",
                record.identity,
                record.source_id
            );
        }
        let id = Uuid::new_v4().to_string();
        let mut operations = record.operations.clone();
        operations.sort();
        operations.dedup();
        let mut categories = record.categories.clone();
        categories.sort();
        categories.dedup();
        records.insert(
            id.clone(),
            CatalogRecord {
                id: id.clone(),
                identity: record.identity.clone(),
                schema: record.schema.clone(),
                source_id: record.source_id.clone(),
                owner: record.owner.clone(),
                harvested: true,
                content: record.content.clone(),
                categories,
                operations,
                created_at: record.created_at,
                changed_at: record.created_at,
            },
        );
        Ok(id)
    }

    async fn replace_content(
        &self,
        id: &str,
        content: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_record(id, |r| {
            r.content = content.to_string();
            r.changed_at = changed_at;
        })
    }

    async fn replace_allowed_operations(&self, id: &str, grants: &[OperationGrant]) -> Result<()> {
        let mut grants = grants.to_vec();
        grants.sort();
        grants.dedup();
        self.with_record(id, |r| r.operations = grants)
    }

    async fn replace_categories(&self, id: &str, categories: &[String]) -> Result<()> {
        let mut categories = categories.to_vec();
        categories.sort();
        categories.dedup();
        self.with_record(id, |r| r.categories = categories)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if write(&self.records)?.remove(id).is_none() {
            bail!("record not found: {}", id);
        }
        write(&self.indexed)?.remove(id);
        Ok(())
    }

    async fn reindex(&self, id: &str) -> Result<()> {
        if !read(&self.records)?.contains_key(id) {
            bail!("cannot index missing record {}", id);
        }
        write(&self.indexed)?.insert(id.to_string());
        Ok(())
    }
}
