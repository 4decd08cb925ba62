//! Harvester status listing for `harvest sources`.
//!
//! | Harvester | Healthy when |
//! |-----------|-------------|
//! | `filesystem` | Configured directory exists and is a directory |

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::traits::{HarvesterInfo, HarvesterRegistry};

/// Configuration and health of every configured harvester.
pub fn get_sources(config: &Config) -> Vec<HarvesterInfo> {
    HarvesterRegistry::from_config(config)
        .harvesters()
        .iter()
        .map(|h| h.describe())
        .collect()
}

/// CLI entry point for `harvest sources`.
///
/// Record counts come from the catalog database when it exists; before
/// `harvest init` they show as `-`.
pub async fn list_sources(config: &Config) -> Result<()> {
    let sources = get_sources(config);

    let pool = if config.db.path.exists() {
        Some(db::connect(config).await?)
    } else {
        None
    };

    println!("{:<28} {:<8} {:<8} NOTES", "HARVESTER", "HEALTHY", "RECORDS");
    for s in &sources {
        let records = match &pool {
            Some(pool) => {
                let count: Result<i64, sqlx::Error> =
                    sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE source_id = ?")
                        .bind(&s.uuid)
                        .fetch_one(pool)
                        .await;
                count.map(|n| n.to_string()).unwrap_or_else(|_| "-".to_string())
            }
            None => "-".to_string(),
        };
        println!(
            "{:<28} {:<8} {:<8} {}",
            s.label,
            s.healthy,
            records,
            s.notes.as_deref().unwrap_or("")
        );
    }

    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(())
}
