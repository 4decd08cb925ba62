//! Run-level failures.
//!
//! A harvest run either returns a [`HarvestResult`] (possibly with a nonzero
//! error count) or one of these. Per-file problems never surface here; they
//! are [`FileError`](catalog_harvest_core::result::FileError)s folded into
//! the result.

use std::path::PathBuf;

use catalog_harvest_core::result::HarvestResult;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The traversal root cannot be opened. Nothing was reconciled.
    #[error("cannot read harvest directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog store could not be reached when the run started.
    #[error("catalog store unavailable: {0:#}")]
    Store(anyhow::Error),

    /// The run was cancelled before traversal completed. The deletion sweep
    /// did not run.
    #[error("harvest cancelled after {} files", partial.processed())]
    Cancelled { partial: HarvestResult },
}
