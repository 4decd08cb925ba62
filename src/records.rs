//! Record listing for `harvest records`.
//!
//! Prints one line per record a harvester owns: id, schema, change date and
//! the document's own identifier.

use anyhow::Result;
use catalog_harvest_core::store::CatalogStore;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteCatalogStore;
use crate::traits::HarvesterRegistry;

/// `harvest records <spec>`: list the records each matching harvester owns.
pub async fn run_records(config: &Config, spec: &str) -> Result<()> {
    let registry = HarvesterRegistry::from_config(config);
    let harvesters = registry.resolve(spec)?;

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteCatalogStore::new(pool);

    for harvester in harvesters {
        let records = store.find_by_owner(&harvester.source().uuid).await?;
        println!("{} ({} records)", harvester.label(), records.len());
        for r in &records {
            println!(
                "  {}  {:<16} {}  {}",
                r.id,
                r.schema,
                r.changed_at.format("%Y-%m-%dT%H:%M:%SZ"),
                r.identity
            );
        }
    }

    store.pool().close().await;
    Ok(())
}
