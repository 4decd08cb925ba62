//! # Catalog Harvest
//!
//! Keeps a metadata catalog in sync with a directory of metadata documents.
//!
//! Each configured harvester walks its directory, classifies every file by
//! metadata schema, inserts or replaces the matching catalog record, applies
//! the configured access control and categories, and removes records whose
//! files have disappeared.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Walker     │──▶│  Classifier  │──▶│  Reconciler  │
//! │ (walkdir)    │   │ (quick-xml)  │   │ + privileges │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                  ┌──────────────┐     ┌──────────────┐
//!                  │    Sweep     │     │ CatalogStore │
//!                  │  (orphans)   │────▶│ SQLite/FTS5  │
//!                  └──────────────┘     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`walker`] | Candidate file enumeration |
//! | [`classify`] | Schema detection and identity extraction |
//! | [`reconcile`] | Insert / update / unchanged decision |
//! | [`privileges`] | Access control and category replacement |
//! | [`sweep`] | Orphan deletion |
//! | [`harvest`] | Run orchestration and the `run` command |
//! | [`traits`] | Harvester trait and registry |
//! | [`progress`] | Progress reporting |
//! | [`sqlite_store`] | SQLite catalog backend |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod harvest;
pub mod migrate;
pub mod privileges;
pub mod progress;
pub mod reconcile;
pub mod records;
pub mod sources;
pub mod sqlite_store;
pub mod sweep;
pub mod traits;
pub mod walker;
