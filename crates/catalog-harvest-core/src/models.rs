//! Core data models shared by the harvester and the catalog stores.
//!
//! A [`HarvestSource`] is an immutable snapshot of one configured harvester.
//! It is built once per run from configuration and never mutated while the
//! run is in progress; a configuration change produces a new snapshot.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An operation a group may perform on a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    View,
    Download,
    Editing,
    Notify,
    Dynamic,
    Featured,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::View,
        Operation::Download,
        Operation::Editing,
        Operation::Notify,
        Operation::Dynamic,
        Operation::Featured,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Download => "download",
            Operation::Editing => "editing",
            Operation::Notify => "notify",
            Operation::Dynamic => "dynamic",
            Operation::Featured => "featured",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown operation: '{}'", s))
    }
}

/// One allowed-operation entry: `group` may perform `operation`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationGrant {
    pub group: String,
    pub operation: Operation,
}

impl OperationGrant {
    pub fn new(group: impl Into<String>, operation: Operation) -> Self {
        Self {
            group: group.into(),
            operation,
        }
    }
}

/// Which timestamp decides whether an existing record is up to date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampAuthority {
    /// The file's last-modified time on disk.
    #[default]
    File,
    /// The change date embedded in the document, falling back to the file
    /// time when the document carries none.
    Document,
}

/// Resolved configuration of a single harvest job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestSource {
    /// Stable identifier stamped on every record this source produces.
    pub uuid: String,
    pub name: String,
    /// Traversal root.
    pub directory: PathBuf,
    pub recurse: bool,
    /// When set, records whose files disappeared are kept.
    pub nodelete: bool,
    /// Enables the unchanged fast path during reconciliation.
    pub check_file_last_modified: bool,
    pub timestamp_authority: TimestampAuthority,
    pub follow_symlinks: bool,
    pub icon: Option<String>,
    pub owner: Option<String>,
    /// Allowed operations applied to every inserted or updated record.
    pub privileges: Vec<OperationGrant>,
    /// Categories applied to every inserted or updated record.
    pub categories: Vec<String>,
}

impl HarvestSource {
    /// Minimal source rooted at `directory` with deletion enabled and no
    /// privilege or category mapping.
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            directory: directory.into(),
            recurse: false,
            nodelete: false,
            check_file_last_modified: false,
            timestamp_authority: TimestampAuthority::File,
            follow_symlinks: false,
            icon: None,
            owner: None,
            privileges: Vec::new(),
            categories: Vec::new(),
        }
    }
}

/// A record as persisted by a catalog store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    /// Storage-assigned identifier.
    pub id: String,
    /// Identifier declared inside the document itself.
    pub identity: String,
    pub schema: String,
    /// Identifier of the owning harvest source.
    pub source_id: String,
    pub owner: Option<String>,
    pub harvested: bool,
    pub content: String,
    pub categories: Vec<String>,
    pub operations: Vec<OperationGrant>,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
}

/// Lightweight view of a record, without content or access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub identity: String,
    pub schema: String,
    pub changed_at: DateTime<Utc>,
}

impl From<&CatalogRecord> for RecordSummary {
    fn from(record: &CatalogRecord) -> Self {
        Self {
            id: record.id.clone(),
            identity: record.identity.clone(),
            schema: record.schema.clone(),
            changed_at: record.changed_at,
        }
    }
}

/// Input to [`CatalogStore::insert`](crate::store::CatalogStore::insert).
///
/// The initial allowed operations and categories are written together with
/// the record, so it never becomes visible without them.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub source_id: String,
    pub identity: String,
    pub schema: String,
    pub content: String,
    pub owner: Option<String>,
    pub operations: Vec<OperationGrant>,
    pub categories: Vec<String>,
    /// Used as both the created and the initial changed timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parses_its_own_name() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("publish".parse::<Operation>().is_err());
    }

    #[test]
    fn grants_order_by_group_then_operation() {
        let mut grants = vec![
            OperationGrant::new("sample", Operation::View),
            OperationGrant::new("all", Operation::Download),
            OperationGrant::new("all", Operation::View),
        ];
        grants.sort();
        assert_eq!(grants[0], OperationGrant::new("all", Operation::View));
        assert_eq!(grants[1], OperationGrant::new("all", Operation::Download));
        assert_eq!(grants[2].group, "sample");
    }

    #[test]
    fn new_source_defaults_to_deleting_flat_walk() {
        let source = HarvestSource::new("u-1", "local", "/data");
        assert!(!source.recurse);
        assert!(!source.nodelete);
        assert!(!source.check_file_last_modified);
        assert_eq!(source.timestamp_authority, TimestampAuthority::File);
    }
}
