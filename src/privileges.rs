//! Privilege and category re-application.
//!
//! After every content update the record's allowed operations and its
//! categories are replaced wholesale with the source's mapping. New records
//! get the same mapping as part of their insert. The store
//! performs each replace in one transaction; [`RecordLocks`] additionally
//! serializes replaces for the same record id when a run reconciles files
//! on several workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use catalog_harvest_core::models::HarvestSource;
use catalog_harvest_core::store::CatalogStore;
use tracing::debug;

/// Per-record async locks, scoped to one run.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, record_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(record_id.to_string())
            .or_default()
            .clone()
    }
}

pub struct PrivilegeApplier<'a> {
    store: &'a dyn CatalogStore,
    locks: &'a RecordLocks,
}

impl<'a> PrivilegeApplier<'a> {
    pub fn new(store: &'a dyn CatalogStore, locks: &'a RecordLocks) -> Self {
        Self { store, locks }
    }

    /// Replace the allowed operations and categories of `record_id` with the
    /// mappings configured on `source`.
    pub async fn apply(&self, record_id: &str, source: &HarvestSource) -> Result<()> {
        let lock = self.locks.lock_for(record_id);
        let _guard = lock.lock().await;

        self.store
            .replace_allowed_operations(record_id, &source.privileges)
            .await
            .context("replacing allowed operations")?;
        debug!(
            record_id,
            grants = source.privileges.len(),
            "privileges applied"
        );

        self.store
            .replace_categories(record_id, &source.categories)
            .await
            .context("replacing categories")?;
        debug!(
            record_id,
            categories = source.categories.len(),
            "categories applied"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_harvest_core::models::{NewRecord, Operation, OperationGrant};
    use catalog_harvest_core::store::memory::InMemoryCatalogStore;
    use chrono::Utc;

    #[test]
    fn same_record_shares_one_lock() {
        let locks = RecordLocks::new();
        let a = locks.lock_for("r1");
        let b = locks.lock_for("r1");
        let c = locks.lock_for("r2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn apply_replaces_previous_mapping() {
        let store = InMemoryCatalogStore::new();
        let id = store
            .insert(&NewRecord {
                source_id: "s1".into(),
                identity: "doc".into(),
                schema: "iso19139".into(),
                content: "<x/>".into(),
                owner: None,
                operations: Vec::new(),
                categories: Vec::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .replace_allowed_operations(&id, &[OperationGrant::new("old", Operation::Editing)])
            .await
            .unwrap();
        store
            .replace_categories(&id, &["stale".to_string()])
            .await
            .unwrap();

        let mut source = HarvestSource::new("s1", "local", "/data");
        source.privileges = vec![OperationGrant::new("all", Operation::View)];
        source.categories = vec!["datasets".to_string()];

        let locks = RecordLocks::new();
        PrivilegeApplier::new(&store, &locks)
            .apply(&id, &source)
            .await
            .unwrap();

        let record = store.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.operations, source.privileges);
        assert_eq!(record.categories, source.categories);
    }

    #[tokio::test]
    async fn apply_to_missing_record_fails() {
        let store = InMemoryCatalogStore::new();
        let locks = RecordLocks::new();
        let source = HarvestSource::new("s1", "local", "/data");
        let err = PrivilegeApplier::new(&store, &locks)
            .apply("nope", &source)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("replacing allowed operations"));
    }
}
