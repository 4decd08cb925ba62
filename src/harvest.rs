//! Harvest run orchestration.
//!
//! A run walks the source directory, classifies and reconciles each file,
//! folds every outcome into one [`HarvestAccumulator`], and finally sweeps
//! orphaned records:
//!
//! ```text
//! walk ──▶ read ──▶ classify ──▶ reconcile ──▶ apply privileges ──▶ reindex
//!                                     │
//!                                     ▼
//!                          accumulator (touched ids)
//!                                     │
//!                  after the walk ────┴──▶ deletion sweep
//! ```
//!
//! The directory walk runs on a blocking thread and hands entries over
//! through a bounded channel. With `workers > 1`, up to that many files are
//! read and reconciled concurrently. Only the collector loop touches the accumulator, and the
//! sweep starts after every in-flight file has reported back.
//!
//! Cancellation stops the walk between files. Files already in flight are
//! allowed to finish, and a cancelled run never sweeps.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use catalog_harvest_core::models::HarvestSource;
use catalog_harvest_core::result::{FileError, HarvestAccumulator, HarvestResult, Outcome};
use catalog_harvest_core::store::CatalogStore;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classify::classify;
use crate::config::{Config, FilesystemHarvesterConfig};
use crate::db;
use crate::error::HarvestError;
use crate::migrate;
use crate::privileges::RecordLocks;
use crate::progress::{HarvestProgressEvent, HarvestProgressReporter, NoProgress, ProgressMode};
use crate::reconcile::Reconciler;
use crate::sqlite_store::SqliteCatalogStore;
use crate::sweep::sweep;
use crate::traits::{Harvester, HarvesterInfo, HarvesterRegistry};
use crate::walker::{self, CandidateFile, Walk};

/// Entries the walker may read ahead of the workers.
const WALK_BUFFER: usize = 256;

/// Per-invocation knobs that are not part of the source configuration.
#[derive(Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub cancel: CancellationToken,
    pub progress: Arc<dyn HarvestProgressReporter>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoProgress),
        }
    }
}

/// Execute one harvest of `source` against `store`.
///
/// Returns the run's counters, or a [`HarvestError`] when the run could not
/// complete. Per-file problems are counted in `errors` and never abort the
/// run.
pub async fn run_harvest(
    store: &dyn CatalogStore,
    source: &HarvestSource,
    options: &RunOptions,
) -> Result<HarvestResult, HarvestError> {
    info!(
        source = %source.name,
        directory = %source.directory.display(),
        recurse = source.recurse,
        "start of alignment"
    );

    let files = walker::walk(&source.directory, source.recurse, source.follow_symlinks)?;
    store
        .ensure_source(source)
        .await
        .map_err(HarvestError::Store)?;

    options.progress.report(HarvestProgressEvent::Discovering {
        harvester: source.name.clone(),
    });

    let locks = RecordLocks::new();
    let reconciler = Reconciler::new(store, source, &locks);
    let mut acc = HarvestAccumulator::new();

    let mut outcomes = Box::pin(
        walk_in_background(files)
            .take_until(options.cancel.cancelled())
            .map(|entry| process_entry(&reconciler, entry))
            .buffer_unordered(options.workers.max(1)),
    );

    while let Some(outcome) = outcomes.next().await {
        if let Outcome::Rejected { error, .. } = &outcome {
            warn!(%error, "skipping file");
        }
        acc.record(&outcome);
        options.progress.report(HarvestProgressEvent::Reconciling {
            harvester: source.name.clone(),
            n: acc.result().processed(),
        });
    }
    drop(outcomes);

    if options.cancel.is_cancelled() {
        let partial = acc.into_result();
        warn!(source = %source.name, ?partial, "harvest cancelled, deletion sweep skipped");
        return Err(HarvestError::Cancelled { partial });
    }

    if acc.touched_complete() {
        options.progress.report(HarvestProgressEvent::Sweeping {
            harvester: source.name.clone(),
        });
        let report = sweep(store, source, acc.touched()).await;
        acc.record_removed(report.removed);
        acc.record_errors(report.failures);
    } else if !source.nodelete {
        warn!(
            source = %source.name,
            "catalog lookups failed during the walk, deletion sweep skipped"
        );
    }

    let result = acc.into_result();
    info!(
        source = %source.name,
        added = result.added,
        updated = result.updated,
        unchanged = result.unchanged,
        removed = result.locally_removed,
        errors = result.errors,
        "end of alignment"
    );
    Ok(result)
}

/// Drive `files` on a blocking thread. The walk stops once the returned
/// stream is dropped.
fn walk_in_background(files: Walk) -> impl Stream<Item = Result<CandidateFile, FileError>> {
    let (tx, rx) = tokio::sync::mpsc::channel(WALK_BUFFER);
    tokio::task::spawn_blocking(move || {
        for entry in files {
            if tx.blocking_send(entry).is_err() {
                break;
            }
        }
    });
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|entry| (entry, rx))
    })
}

async fn process_entry(
    reconciler: &Reconciler<'_>,
    entry: Result<CandidateFile, FileError>,
) -> Outcome {
    let file = match entry {
        Ok(file) => file,
        Err(error) => return Outcome::rejected(error),
    };

    let bytes = match tokio::fs::read(&file.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Outcome::rejected(FileError::EntryAccess {
                path: file.path,
                message: e.to_string(),
            })
        }
    };

    match classify(&bytes) {
        Ok(doc) => reconciler.reconcile(&file.path, doc, file.modified).await,
        Err(e) => Outcome::rejected(e.into_file_error(&file.path)),
    }
}

/// What a run would see, without touching the catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunReport {
    pub candidates: u64,
    pub by_schema: BTreeMap<String, u64>,
    pub rejected: u64,
}

/// Walk and classify only.
pub fn dry_run(source: &HarvestSource) -> Result<DryRunReport, HarvestError> {
    let mut report = DryRunReport::default();

    for entry in walker::walk(&source.directory, source.recurse, source.follow_symlinks)? {
        report.candidates += 1;
        let classified = entry.and_then(|file| {
            let bytes = std::fs::read(&file.path).map_err(|e| FileError::EntryAccess {
                path: file.path.clone(),
                message: e.to_string(),
            })?;
            classify(&bytes).map_err(|e| e.into_file_error(&file.path))
        });
        match classified {
            Ok(doc) => *report.by_schema.entry(doc.schema.to_string()).or_default() += 1,
            Err(error) => {
                warn!(%error, "would skip file");
                report.rejected += 1;
            }
        }
    }

    Ok(report)
}

// ═══════════════════════════════════════════════════════════════════════
// Local filesystem harvester
// ═══════════════════════════════════════════════════════════════════════

/// Harvester for a directory tree on the local filesystem.
pub struct LocalFilesystemHarvester {
    name: String,
    source: HarvestSource,
}

impl LocalFilesystemHarvester {
    /// Build a harvester from its `[harvesters.filesystem.<name>]` table.
    pub fn configure(name: &str, config: &FilesystemHarvesterConfig) -> Self {
        Self::from_source(name, config.to_source(name))
    }

    pub fn from_source(name: &str, source: HarvestSource) -> Self {
        Self {
            name: name.to_string(),
            source,
        }
    }
}

#[async_trait]
impl Harvester for LocalFilesystemHarvester {
    fn name(&self) -> &str {
        &self.name
    }

    fn harvester_type(&self) -> &str {
        "filesystem"
    }

    fn source(&self) -> &HarvestSource {
        &self.source
    }

    fn describe(&self) -> HarvesterInfo {
        let directory = &self.source.directory;
        let healthy = directory.is_dir();
        HarvesterInfo {
            label: self.label(),
            uuid: self.source.uuid.clone(),
            name: self.source.name.clone(),
            healthy,
            notes: if healthy {
                Some(format!(
                    "directory: {}{}{}",
                    directory.display(),
                    if self.source.recurse { ", recursive" } else { "" },
                    if self.source.nodelete { ", nodelete" } else { "" },
                ))
            } else {
                Some(format!("directory not found: {}", directory.display()))
            },
        }
    }

    async fn run(
        &self,
        store: &dyn CatalogStore,
        options: &RunOptions,
    ) -> Result<HarvestResult, HarvestError> {
        run_harvest(store, &self.source, options).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CLI entry point
// ═══════════════════════════════════════════════════════════════════════

/// `harvest run <spec>`: run every harvester matching `spec`.
///
/// Harvesters run one after another. A fatal failure in one does not stop
/// the others, but makes the command fail once all have run.
pub async fn run_harvest_command(
    config: &Config,
    spec: &str,
    dry: bool,
    json: bool,
    progress: ProgressMode,
) -> Result<()> {
    let registry = HarvesterRegistry::from_config(config);
    let harvesters = registry.resolve(spec)?;

    if dry {
        for harvester in &harvesters {
            let source = harvester.source().clone();
            let report = tokio::task::spawn_blocking(move || dry_run(&source)).await??;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "harvester": harvester.label(), "dryRun": report })
                );
            } else {
                println!("harvest {} (dry-run)", harvester.label());
                println!("  candidate files: {}", report.candidates);
                for (schema, count) in &report.by_schema {
                    println!("  {}: {}", schema, count);
                }
                println!("  would skip: {}", report.rejected);
            }
        }
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store = SqliteCatalogStore::new(pool.clone());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let options = RunOptions {
        workers: config.harvest.workers,
        cancel,
        progress: Arc::from(progress.reporter()),
    };

    let mut failed = Vec::new();
    for harvester in &harvesters {
        match harvester.run(&store, &options).await {
            Ok(result) => {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({ "harvester": harvester.label(), "result": result })
                    );
                } else {
                    println!("harvest {}", harvester.label());
                    println!("  added: {}", result.added);
                    println!("  updated: {}", result.updated);
                    println!("  unchanged: {}", result.unchanged);
                    println!("  removed: {}", result.locally_removed);
                    println!("  errors: {}", result.errors);
                    println!("ok");
                }
            }
            Err(e) => {
                eprintln!("harvest {} failed: {}", harvester.label(), e);
                failed.push(harvester.label());
            }
        }
    }

    pool.close().await;

    if !failed.is_empty() {
        bail!("harvest failed for: {}", failed.join(", "));
    }
    Ok(())
}
