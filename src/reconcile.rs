//! Insert / update / unchanged decision for one classified document.
//!
//! Reconciliation never merges: a new record is inserted together with the
//! source's access control and categories, and an update replaces the
//! stored content in full and re-applies both. When change
//! detection is enabled the update is skipped if the authoritative
//! timestamp is not newer than the record's stored change date.

use std::path::Path;

use catalog_harvest_core::models::{HarvestSource, NewRecord, TimestampAuthority};
use catalog_harvest_core::result::{FileError, Outcome};
use catalog_harvest_core::store::CatalogStore;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::classify::ClassifiedDocument;
use crate::privileges::{PrivilegeApplier, RecordLocks};
use crate::walker::truncate_to_secs;

/// The timestamp stored as the record's change date and used for change
/// detection.
pub fn effective_timestamp(
    source: &HarvestSource,
    doc: &ClassifiedDocument,
    file_modified: DateTime<Utc>,
) -> DateTime<Utc> {
    let ts = match source.timestamp_authority {
        TimestampAuthority::File => file_modified,
        TimestampAuthority::Document => doc.changed.unwrap_or(file_modified),
    };
    truncate_to_secs(ts)
}

pub struct Reconciler<'a> {
    store: &'a dyn CatalogStore,
    source: &'a HarvestSource,
    applier: PrivilegeApplier<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        source: &'a HarvestSource,
        locks: &'a RecordLocks,
    ) -> Self {
        Self {
            store,
            source,
            applier: PrivilegeApplier::new(store, locks),
        }
    }

    /// Reconcile the document read from `path`. Never fails: store errors
    /// come back as [`Outcome::Rejected`].
    pub async fn reconcile(
        &self,
        path: &Path,
        doc: ClassifiedDocument,
        file_modified: DateTime<Utc>,
    ) -> Outcome {
        let changed_at = effective_timestamp(self.source, &doc, file_modified);

        let existing = match self
            .store
            .find_by_owner_and_identity(&self.source.uuid, &doc.identity)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                return Outcome::rejected(FileError::StoreWrite {
                    path: path.to_path_buf(),
                    message: format!("lookup of '{}' failed: {:#}", doc.identity, e),
                })
            }
        };

        match existing {
            None => self.insert(path, doc, changed_at).await,
            Some(record)
                if self.source.check_file_last_modified && changed_at <= record.changed_at =>
            {
                debug!(
                    identity = %doc.identity,
                    record_id = %record.id,
                    "record unchanged, skipping"
                );
                Outcome::Unchanged(record.id)
            }
            Some(record) => self.update(path, &record.id, doc, changed_at).await,
        }
    }

    async fn insert(
        &self,
        path: &Path,
        doc: ClassifiedDocument,
        changed_at: DateTime<Utc>,
    ) -> Outcome {
        debug!(identity = %doc.identity, schema = doc.schema, "inserting record");

        let new_record = NewRecord {
            source_id: self.source.uuid.clone(),
            identity: doc.identity,
            schema: doc.schema.to_string(),
            content: doc.content,
            owner: self.source.owner.clone(),
            operations: self.source.privileges.clone(),
            categories: self.source.categories.clone(),
            created_at: changed_at,
        };

        let id = match self.store.insert(&new_record).await {
            Ok(id) => id,
            Err(e) => {
                return Outcome::rejected(FileError::StoreWrite {
                    path: path.to_path_buf(),
                    message: format!("insert of '{}' failed: {:#}", new_record.identity, e),
                })
            }
        };

        self.reindex(&id).await;
        Outcome::Inserted(id)
    }

    async fn update(
        &self,
        path: &Path,
        id: &str,
        doc: ClassifiedDocument,
        changed_at: DateTime<Utc>,
    ) -> Outcome {
        debug!(identity = %doc.identity, record_id = id, "replacing record content");

        if let Err(e) = self
            .store
            .replace_content(id, &doc.content, changed_at)
            .await
        {
            return Outcome::Rejected {
                error: FileError::StoreWrite {
                    path: path.to_path_buf(),
                    message: format!("update of record {} failed: {:#}", id, e),
                },
                record_id: Some(id.to_string()),
            };
        }

        match self.apply_and_reindex(path, id).await {
            Ok(()) => Outcome::Updated(id.to_string()),
            Err(error) => Outcome::Rejected {
                error,
                record_id: Some(id.to_string()),
            },
        }
    }

    /// Runs after a committed content update. The index is refreshed even
    /// when access control could not be applied, since the content changed.
    async fn apply_and_reindex(&self, path: &Path, id: &str) -> Result<(), FileError> {
        let applied = self.applier.apply(id, self.source).await;
        self.reindex(id).await;

        applied.map_err(|e| FileError::Privileges {
            path: path.to_path_buf(),
            record_id: id.to_string(),
            message: format!("{:#}", e),
        })
    }

    async fn reindex(&self, id: &str) {
        if let Err(e) = self.store.reindex(id).await {
            let error = format!("{:#}", e);
            warn!(record_id = id, %error, "search index not refreshed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_harvest_core::models::{Operation, OperationGrant};
    use catalog_harvest_core::store::memory::InMemoryCatalogStore;
    use chrono::{Duration, TimeZone};

    fn doc(identity: &str, content: &str, changed: Option<DateTime<Utc>>) -> ClassifiedDocument {
        ClassifiedDocument {
            schema: "iso19139",
            identity: identity.to_string(),
            changed,
            content: content.to_string(),
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn source(check: bool) -> HarvestSource {
        let mut source = HarvestSource::new("src-1", "local", "/data");
        source.check_file_last_modified = check;
        source.owner = Some("admin".into());
        source.privileges = vec![OperationGrant::new("all", Operation::View)];
        source.categories = vec!["datasets".into()];
        source
    }

    #[tokio::test]
    async fn first_sight_inserts_with_access_control_and_index() {
        let store = InMemoryCatalogStore::new();
        let source = source(false);
        let locks = RecordLocks::new();
        let reconciler = Reconciler::new(&store, &source, &locks);

        let outcome = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v1/>", None), ts(0))
            .await;
        let id = match outcome {
            Outcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        };

        let record = store.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.source_id, "src-1");
        assert_eq!(record.owner.as_deref(), Some("admin"));
        assert_eq!(record.changed_at, ts(0));
        assert_eq!(record.operations, source.privileges);
        assert_eq!(record.categories, source.categories);
        assert!(store.is_indexed(&id));
    }

    #[tokio::test]
    async fn existing_record_is_replaced_when_detection_disabled() {
        let store = InMemoryCatalogStore::new();
        let source = source(false);
        let locks = RecordLocks::new();
        let reconciler = Reconciler::new(&store, &source, &locks);

        reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v1/>", None), ts(0))
            .await;
        let outcome = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v2/>", None), ts(0))
            .await;
        let id = match outcome {
            Outcome::Updated(id) => id,
            other => panic!("expected update, got {:?}", other),
        };
        assert_eq!(store.get_record(&id).await.unwrap().unwrap().content, "<v2/>");
    }

    #[tokio::test]
    async fn detection_skips_files_not_newer_than_record() {
        let store = InMemoryCatalogStore::new();
        let source = source(true);
        let locks = RecordLocks::new();
        let reconciler = Reconciler::new(&store, &source, &locks);

        reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v1/>", None), ts(10))
            .await;

        let same = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v2/>", None), ts(10))
            .await;
        assert!(matches!(same, Outcome::Unchanged(_)));

        let older = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v2/>", None), ts(5))
            .await;
        assert!(matches!(older, Outcome::Unchanged(_)));

        let newer = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v3/>", None), ts(11))
            .await;
        let id = match newer {
            Outcome::Updated(id) => id,
            other => panic!("expected update, got {:?}", other),
        };
        let record = store.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.content, "<v3/>");
        assert_eq!(record.changed_at, ts(11));
    }

    #[tokio::test]
    async fn document_authority_uses_embedded_date() {
        let store = InMemoryCatalogStore::new();
        let mut source = source(true);
        source.timestamp_authority = TimestampAuthority::Document;
        let locks = RecordLocks::new();
        let reconciler = Reconciler::new(&store, &source, &locks);

        reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v1/>", Some(ts(0))), ts(100))
            .await;

        // File touched, embedded date unchanged.
        let outcome = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v1/>", Some(ts(0))), ts(500))
            .await;
        assert!(matches!(outcome, Outcome::Unchanged(_)));

        let outcome = reconciler
            .reconcile(Path::new("a.xml"), doc("a", "<v2/>", Some(ts(1))), ts(500))
            .await;
        assert!(matches!(outcome, Outcome::Updated(_)));
    }

    #[test]
    fn effective_timestamp_falls_back_to_file_time() {
        let mut source = source(true);
        source.timestamp_authority = TimestampAuthority::Document;
        let file_time = ts(42) + Duration::milliseconds(750);
        assert_eq!(
            effective_timestamp(&source, &doc("a", "", None), file_time),
            ts(42)
        );
        assert_eq!(
            effective_timestamp(&source, &doc("a", "", Some(ts(7))), file_time),
            ts(7)
        );
    }

    #[tokio::test]
    async fn same_identity_in_other_source_is_a_separate_record() {
        let store = InMemoryCatalogStore::new();
        let locks = RecordLocks::new();
        let a = source(false);
        let mut b = source(false);
        b.uuid = "src-2".into();

        let first = Reconciler::new(&store, &a, &locks)
            .reconcile(Path::new("x.xml"), doc("shared", "<a/>", None), ts(0))
            .await;
        let second = Reconciler::new(&store, &b, &locks)
            .reconcile(Path::new("x.xml"), doc("shared", "<b/>", None), ts(0))
            .await;

        assert!(matches!(first, Outcome::Inserted(_)));
        assert!(matches!(second, Outcome::Inserted(_)));
        assert_ne!(first.record_id(), second.record_id());
        assert_eq!(store.len(), 2);
    }
}
