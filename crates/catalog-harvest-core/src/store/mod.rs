//! Storage abstraction for the metadata catalog.
//!
//! The [`CatalogStore`] trait is everything the harvester needs from the
//! catalog: lookups by owning source, content writes, access-control and
//! category replacement, deletion and reindexing. Backends decide how the
//! records are persisted; the harvester treats content as an opaque string
//! tagged with a schema id.
//!
//! Implementations must be `Send + Sync` so a run can share one store
//! across its reconciliation workers.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CatalogRecord, HarvestSource, NewRecord, OperationGrant, RecordSummary};

/// Abstract catalog backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_source`](CatalogStore::ensure_source) | Register the harvest source |
/// | [`find_by_owner`](CatalogStore::find_by_owner) | All records of a source |
/// | [`find_by_owner_and_identity`](CatalogStore::find_by_owner_and_identity) | Lookup used by reconciliation |
/// | [`get_record`](CatalogStore::get_record) | Full record with access control |
/// | [`insert`](CatalogStore::insert) | Create a record, returns its id |
/// | [`replace_content`](CatalogStore::replace_content) | Full-content replace |
/// | [`replace_allowed_operations`](CatalogStore::replace_allowed_operations) | Atomic privilege replace |
/// | [`replace_categories`](CatalogStore::replace_categories) | Category replace |
/// | [`delete`](CatalogStore::delete) | Remove a record and everything hanging off it |
/// | [`reindex`](CatalogStore::reindex) | Refresh the search index entry |
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Create or refresh the source entry for a harvester.
    async fn ensure_source(&self, source: &HarvestSource) -> Result<()>;

    /// Every record owned by `source_id`.
    async fn find_by_owner(&self, source_id: &str) -> Result<Vec<RecordSummary>>;

    async fn find_by_owner_and_identity(
        &self,
        source_id: &str,
        identity: &str,
    ) -> Result<Option<RecordSummary>>;

    async fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>>;

    /// Insert a new record together with its initial allowed operations and
    /// categories, atomically. Fails if `(source_id, identity)` already
    /// exists.
    async fn insert(&self, record: &NewRecord) -> Result<String>;

    async fn replace_content(&self, id: &str, content: &str, changed_at: DateTime<Utc>)
        -> Result<()>;

    /// Replace the allowed-operations set in a single transaction. Readers
    /// see either the old set or the new one.
    async fn replace_allowed_operations(&self, id: &str, grants: &[OperationGrant]) -> Result<()>;

    async fn replace_categories(&self, id: &str, categories: &[String]) -> Result<()>;

    /// Delete a record with its privileges, categories and index entry.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn reindex(&self, id: &str) -> Result<()>;
}
