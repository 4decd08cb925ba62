//! Per-file outcomes and per-run accounting.
//!
//! Every candidate file ends in exactly one [`Outcome`]. Outcomes are folded
//! into a [`HarvestAccumulator`], which owns the run's counters and the set
//! of record ids touched so far. Only one accumulator exists per run and it
//! is never shared between tasks; concurrent workers hand their outcomes to
//! the single collector that owns it.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Counters returned at the end of a harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestResult {
    pub added: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub locally_removed: u64,
    pub errors: u64,
}

impl HarvestResult {
    /// Number of files that reached a terminal outcome, excluding removals.
    pub fn processed(&self) -> u64 {
        self.added + self.updated + self.unchanged + self.errors
    }
}

/// Why a single file did not produce a catalog change.
///
/// None of these abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    #[error("cannot access {}: {message}", path.display())]
    EntryAccess { path: PathBuf, message: String },

    #[error("{}: invalid content: {message}", path.display())]
    InvalidContent { path: PathBuf, message: String },

    #[error("{}: unsupported schema (root element <{root}>)", path.display())]
    UnsupportedSchema { path: PathBuf, root: String },

    #[error("{}: no identifier found for schema {schema}", path.display())]
    MissingIdentity { path: PathBuf, schema: String },

    #[error("{}: catalog write failed: {message}", path.display())]
    StoreWrite { path: PathBuf, message: String },

    #[error("{}: access control not applied to record {record_id}: {message}", path.display())]
    Privileges {
        path: PathBuf,
        record_id: String,
        message: String,
    },
}

impl FileError {
    pub fn path(&self) -> &PathBuf {
        match self {
            FileError::EntryAccess { path, .. }
            | FileError::InvalidContent { path, .. }
            | FileError::UnsupportedSchema { path, .. }
            | FileError::MissingIdentity { path, .. }
            | FileError::StoreWrite { path, .. }
            | FileError::Privileges { path, .. } => path,
        }
    }
}

/// Terminal result of reconciling one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted(String),
    Updated(String),
    Unchanged(String),
    /// The file was skipped. `record_id` is set when a matching record is
    /// known to exist, so the deletion sweep leaves it alone.
    Rejected {
        error: FileError,
        record_id: Option<String>,
    },
}

impl Outcome {
    pub fn rejected(error: FileError) -> Self {
        Outcome::Rejected {
            error,
            record_id: None,
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        match self {
            Outcome::Inserted(id) | Outcome::Updated(id) | Outcome::Unchanged(id) => Some(id),
            Outcome::Rejected { record_id, .. } => record_id.as_deref(),
        }
    }
}

/// Counters plus the touched-id set for one run.
#[derive(Debug, Default)]
pub struct HarvestAccumulator {
    result: HarvestResult,
    touched: HashSet<String>,
    touched_incomplete: bool,
}

impl HarvestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file outcome into the counters and the touched set.
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Inserted(_) => self.result.added += 1,
            Outcome::Updated(_) => self.result.updated += 1,
            Outcome::Unchanged(_) => self.result.unchanged += 1,
            Outcome::Rejected { error, record_id } => {
                self.result.errors += 1;
                // A failed catalog lookup or insert leaves us unable to say
                // which record the file maps to.
                if record_id.is_none() && matches!(error, FileError::StoreWrite { .. }) {
                    self.touched_incomplete = true;
                }
            }
        }
        if let Some(id) = outcome.record_id() {
            self.touched.insert(id.to_string());
        }
    }

    /// Record errors that are not tied to a file, such as failed orphan
    /// deletions.
    pub fn record_errors(&mut self, count: u64) {
        self.result.errors += count;
    }

    pub fn record_removed(&mut self, count: u64) {
        self.result.locally_removed += count;
    }

    pub fn touched(&self) -> &HashSet<String> {
        &self.touched
    }

    /// False once a file failed in a way that may hide an existing record.
    pub fn touched_complete(&self) -> bool {
        !self.touched_incomplete
    }

    pub fn result(&self) -> &HarvestResult {
        &self.result
    }

    pub fn into_result(self) -> HarvestResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_failure(record_id: Option<&str>) -> Outcome {
        Outcome::Rejected {
            error: FileError::StoreWrite {
                path: PathBuf::from("a.xml"),
                message: "disk full".to_string(),
            },
            record_id: record_id.map(str::to_string),
        }
    }

    #[test]
    fn counts_each_outcome_kind() {
        let mut acc = HarvestAccumulator::new();
        acc.record(&Outcome::Inserted("r1".into()));
        acc.record(&Outcome::Updated("r2".into()));
        acc.record(&Outcome::Unchanged("r3".into()));
        acc.record(&Outcome::rejected(FileError::UnsupportedSchema {
            path: PathBuf::from("x.xml"),
            root: "html".into(),
        }));
        acc.record_removed(2);

        let result = acc.result();
        assert_eq!(result.added, 1);
        assert_eq!(result.updated, 1);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.errors, 1);
        assert_eq!(result.locally_removed, 2);
        assert_eq!(result.processed(), 4);
    }

    #[test]
    fn touched_set_tracks_every_known_record() {
        let mut acc = HarvestAccumulator::new();
        acc.record(&Outcome::Inserted("r1".into()));
        acc.record(&Outcome::Unchanged("r2".into()));
        acc.record(&store_failure(Some("r3")));
        acc.record(&Outcome::rejected(FileError::InvalidContent {
            path: PathBuf::from("bad.xml"),
            message: "unexpected EOF".into(),
        }));

        let touched = acc.touched();
        assert_eq!(touched.len(), 3);
        assert!(touched.contains("r3"));
        assert!(acc.touched_complete());
    }

    #[test]
    fn store_failure_without_record_marks_touched_set_incomplete() {
        let mut acc = HarvestAccumulator::new();
        acc.record(&Outcome::Inserted("r1".into()));
        acc.record(&store_failure(None));
        assert!(!acc.touched_complete());
        assert_eq!(acc.result().errors, 1);
    }

    #[test]
    fn result_serializes_with_camel_case_keys() {
        let result = HarvestResult {
            added: 3,
            locally_removed: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["added"], 3);
        assert_eq!(json["locallyRemoved"], 1);
    }
}
