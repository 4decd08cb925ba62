//! Orphan deletion.
//!
//! Runs once per harvest, after every file has been reconciled. Any record
//! owned by the source whose id is not in the touched set is deleted. A
//! failed delete is counted and the sweep moves on to the next orphan.

use std::collections::HashSet;

use catalog_harvest_core::models::HarvestSource;
use catalog_harvest_core::store::CatalogStore;
use tracing::{debug, error};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: u64,
    pub failures: u64,
}

pub async fn sweep(
    store: &dyn CatalogStore,
    source: &HarvestSource,
    touched: &HashSet<String>,
) -> SweepReport {
    let mut report = SweepReport::default();

    if source.nodelete {
        debug!(source = %source.name, "deletion disabled, keeping orphaned records");
        return report;
    }

    let owned = match store.find_by_owner(&source.uuid).await {
        Ok(owned) => owned,
        Err(e) => {
            let e = format!("{:#}", e);
            error!(source = %source.name, error = %e, "cannot list records for deletion sweep");
            report.failures += 1;
            return report;
        }
    };

    for record in owned.iter().filter(|r| !touched.contains(&r.id)) {
        match store.delete(&record.id).await {
            Ok(()) => {
                debug!(record_id = %record.id, identity = %record.identity, "removed orphaned record");
                report.removed += 1;
            }
            Err(e) => {
                let e = format!("{:#}", e);
                error!(record_id = %record.id, error = %e, "failed to remove orphaned record");
                report.failures += 1;
            }
        }
    }

    report
}
