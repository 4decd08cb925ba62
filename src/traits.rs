//! Harvester trait and registry.
//!
//! Every configured harvester is wrapped as a [`Harvester`] trait object and
//! collected in a [`HarvesterRegistry`]. The CLI resolves a harvester spec
//! (`all`, `filesystem`, `filesystem:<name>`) against the registry and runs
//! each match in turn.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │        HarvesterRegistry         │
//! │  ┌────────────┐ ┌─────────────┐  │
//! │  │ filesystem │ │   custom    │  │
//! │  │  (local)   │ │  (Rust)     │  │
//! │  └────────────┘ └─────────────┘  │
//! └───────────────┬──────────────────┘
//!                 ▼
//!     run_harvest() → catalog store
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use catalog_harvest_core::models::HarvestSource;
use catalog_harvest_core::result::HarvestResult;
use catalog_harvest_core::store::CatalogStore;
use serde::Serialize;

use crate::config::Config;
use crate::error::HarvestError;
use crate::harvest::{LocalFilesystemHarvester, RunOptions};

// ═══════════════════════════════════════════════════════════════════════
// Harvester Trait
// ═══════════════════════════════════════════════════════════════════════

/// A configured harvest source that can be run against a catalog.
#[async_trait]
pub trait Harvester: Send + Sync {
    /// Instance name, the key of its config table.
    fn name(&self) -> &str;

    /// Harvester type identifier (e.g. `"filesystem"`).
    fn harvester_type(&self) -> &str;

    /// `"{type}:{name}"`, used on the command line and in output.
    fn label(&self) -> String {
        format!("{}:{}", self.harvester_type(), self.name())
    }

    /// The source settings a run uses.
    fn source(&self) -> &HarvestSource;

    /// Status line for `harvest sources`.
    fn describe(&self) -> HarvesterInfo;

    /// Run one harvest.
    async fn run(
        &self,
        store: &dyn CatalogStore,
        options: &RunOptions,
    ) -> Result<HarvestResult, HarvestError>;
}

/// Configuration and health of one harvester.
#[derive(Debug, Clone, Serialize)]
pub struct HarvesterInfo {
    pub label: String,
    pub uuid: String,
    pub name: String,
    pub healthy: bool,
    pub notes: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of harvesters (built-in and custom).
pub struct HarvesterRegistry {
    harvesters: Vec<Box<dyn Harvester>>,
}

impl HarvesterRegistry {
    pub fn new() -> Self {
        Self {
            harvesters: Vec::new(),
        }
    }

    /// Create a registry holding every harvester declared in the config.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, cfg) in &config.harvesters.filesystem {
            registry.register(Box::new(LocalFilesystemHarvester::configure(name, cfg)));
        }
        registry
    }

    pub fn register(&mut self, harvester: Box<dyn Harvester>) {
        self.harvesters.push(harvester);
    }

    pub fn harvesters(&self) -> &[Box<dyn Harvester>] {
        &self.harvesters
    }

    pub fn by_type(&self, harvester_type: &str) -> Vec<&dyn Harvester> {
        self.harvesters
            .iter()
            .filter(|h| h.harvester_type() == harvester_type)
            .map(|h| h.as_ref())
            .collect()
    }

    pub fn find(&self, harvester_type: &str, name: &str) -> Option<&dyn Harvester> {
        self.harvesters
            .iter()
            .find(|h| h.harvester_type() == harvester_type && h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Resolve a command-line spec to the harvesters it names.
    ///
    /// Accepts `all`, a bare type (`filesystem`), or `type:name`. Fails when
    /// nothing matches.
    pub fn resolve(&self, spec: &str) -> Result<Vec<&dyn Harvester>> {
        let matched: Vec<&dyn Harvester> = match spec.split_once(':') {
            _ if spec == "all" => self.harvesters.iter().map(|h| h.as_ref()).collect(),
            Some((harvester_type, name)) => self.find(harvester_type, name).into_iter().collect(),
            None => self.by_type(spec),
        };

        if matched.is_empty() {
            bail!(
                "No harvester matches '{}'. Configured: {}",
                spec,
                if self.harvesters.is_empty() {
                    "none".to_string()
                } else {
                    self.harvesters
                        .iter()
                        .map(|h| h.label())
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            );
        }
        Ok(matched)
    }

    pub fn is_empty(&self) -> bool {
        self.harvesters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.harvesters.len()
    }
}

impl Default for HarvesterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn registry() -> HarvesterRegistry {
        let config = parse_config(
            r#"
            [db]
            path = "/tmp/catalog.sqlite"

            [harvesters.filesystem.alpha]
            uuid = "a"
            directory = "/data/alpha"

            [harvesters.filesystem.beta]
            uuid = "b"
            directory = "/data/beta"
            "#,
        )
        .unwrap();
        HarvesterRegistry::from_config(&config)
    }

    #[test]
    fn resolves_all_type_and_single_name() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("all").unwrap().len(), 2);
        assert_eq!(registry.resolve("filesystem").unwrap().len(), 2);

        let one = registry.resolve("filesystem:beta").unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].label(), "filesystem:beta");
        assert_eq!(one[0].source().uuid, "b");
    }

    #[test]
    fn unknown_spec_lists_configured_harvesters() {
        let err = registry().resolve("filesystem:gamma").err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("filesystem:gamma"));
        assert!(msg.contains("filesystem:alpha"));
    }

    #[test]
    fn empty_registry_reports_none() {
        let err = HarvesterRegistry::new().resolve("all").err().unwrap();
        assert!(err.to_string().contains("none"));
    }
}
