//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/catalog.sqlite"
//!
//! [harvest]
//! workers = 4
//!
//! [harvesters.filesystem.local]
//! uuid = "6a1c2f3e-0d4b-4f57-9a55-1d2c3b4a5e6f"
//! directory = "/srv/metadata"
//! recurse = true
//! check_file_last_modified = true
//! categories = ["datasets"]
//!
//! [[harvesters.filesystem.local.privileges]]
//! group = "all"
//! operations = ["view", "download"]
//! ```

use anyhow::{bail, Context, Result};
use catalog_harvest_core::models::{HarvestSource, Operation, OperationGrant, TimestampAuthority};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub harvesters: HarvestersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    /// Files reconciled concurrently within one run.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HarvestersConfig {
    #[serde(default)]
    pub filesystem: BTreeMap<String, FilesystemHarvesterConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemHarvesterConfig {
    pub uuid: String,
    /// Display name; defaults to the table key.
    #[serde(default)]
    pub name: Option<String>,
    pub directory: PathBuf,
    #[serde(default)]
    pub recurse: bool,
    #[serde(default)]
    pub nodelete: bool,
    #[serde(default)]
    pub check_file_last_modified: bool,
    #[serde(default)]
    pub timestamp_authority: TimestampAuthority,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub privileges: Vec<PrivilegeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrivilegeConfig {
    pub group: String,
    pub operations: Vec<Operation>,
}

impl FilesystemHarvesterConfig {
    /// Build the immutable source snapshot for one run.
    ///
    /// Privileges are flattened to one grant per (group, operation) pair and
    /// deduplicated, as are categories.
    pub fn to_source(&self, key: &str) -> HarvestSource {
        let privileges: BTreeSet<OperationGrant> = self
            .privileges
            .iter()
            .flat_map(|p| {
                p.operations
                    .iter()
                    .map(|op| OperationGrant::new(p.group.clone(), *op))
            })
            .collect();
        let categories: BTreeSet<String> = self.categories.iter().cloned().collect();

        HarvestSource {
            uuid: self.uuid.clone(),
            name: self.name.clone().unwrap_or_else(|| key.to_string()),
            directory: self.directory.clone(),
            recurse: self.recurse,
            nodelete: self.nodelete,
            check_file_last_modified: self.check_file_last_modified,
            timestamp_authority: self.timestamp_authority,
            follow_symlinks: self.follow_symlinks,
            icon: self.icon.clone(),
            owner: self.owner.clone(),
            privileges: privileges.into_iter().collect(),
            categories: categories.into_iter().collect(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.harvest.workers == 0 {
        bail!("harvest.workers must be >= 1");
    }

    let mut seen_uuids = HashSet::new();
    for (name, fs) in &config.harvesters.filesystem {
        if fs.uuid.trim().is_empty() {
            bail!("harvesters.filesystem.{}.uuid must not be empty", name);
        }
        if fs.directory.as_os_str().is_empty() {
            bail!("harvesters.filesystem.{}.directory must not be empty", name);
        }
        if !seen_uuids.insert(fs.uuid.as_str()) {
            bail!(
                "harvesters.filesystem.{}.uuid '{}' is already used by another harvester",
                name,
                fs.uuid
            );
        }
        for privilege in &fs.privileges {
            if privilege.group.trim().is_empty() {
                bail!(
                    "harvesters.filesystem.{}.privileges: group must not be empty",
                    name
                );
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[db]
path = "/tmp/catalog.sqlite"

[harvest]
workers = 4

[harvesters.filesystem.local]
uuid = "u-local"
name = "Local ISO records"
directory = "/srv/metadata"
recurse = true
check_file_last_modified = true
timestamp_authority = "document"
categories = ["datasets", "maps", "datasets"]

[[harvesters.filesystem.local.privileges]]
group = "all"
operations = ["view", "download"]

[[harvesters.filesystem.local.privileges]]
group = "editors"
operations = ["editing", "view"]

[harvesters.filesystem.archive]
uuid = "u-archive"
directory = "/srv/archive"
nodelete = true
"#;

    #[test]
    fn parses_full_config() {
        let config = parse_config(FULL).unwrap();
        assert_eq!(config.harvest.workers, 4);
        assert_eq!(config.harvesters.filesystem.len(), 2);

        let local = config.harvesters.filesystem["local"].to_source("local");
        assert_eq!(local.name, "Local ISO records");
        assert!(local.recurse);
        assert!(local.check_file_last_modified);
        assert_eq!(local.timestamp_authority, TimestampAuthority::Document);
        assert_eq!(local.categories, vec!["datasets", "maps"]);
        assert_eq!(local.privileges.len(), 4);
        assert!(local
            .privileges
            .contains(&OperationGrant::new("editors", Operation::Editing)));
    }

    #[test]
    fn defaults_apply() {
        let config = parse_config(FULL).unwrap();
        let archive = config.harvesters.filesystem["archive"].to_source("archive");
        assert_eq!(archive.name, "archive");
        assert!(archive.nodelete);
        assert!(!archive.recurse);
        assert!(!archive.check_file_last_modified);
        assert_eq!(archive.timestamp_authority, TimestampAuthority::File);
        assert!(archive.privileges.is_empty());
    }

    #[test]
    fn minimal_config_has_one_worker_and_no_harvesters() {
        let config = parse_config("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.harvest.workers, 1);
        assert!(config.harvesters.filesystem.is_empty());
    }

    #[test]
    fn rejects_zero_workers() {
        let err = parse_config("[db]\npath = \"x\"\n[harvest]\nworkers = 0\n").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn rejects_duplicate_uuids() {
        let toml = r#"
[db]
path = "x"
[harvesters.filesystem.a]
uuid = "same"
directory = "/a"
[harvesters.filesystem.b]
uuid = "same"
directory = "/b"
"#;
        let err = parse_config(toml).unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn rejects_unknown_operation() {
        let toml = r#"
[db]
path = "x"
[harvesters.filesystem.a]
uuid = "u"
directory = "/a"
[[harvesters.filesystem.a.privileges]]
group = "all"
operations = ["publish"]
"#;
        assert!(parse_config(toml).is_err());
    }
}
