//! Harvest progress reporting.
//!
//! Reports what a run is doing so long harvests over large trees are
//! observable. Human progress goes through `tracing` at info level; JSON
//! progress is one object per line on **stderr**, so stdout stays parseable
//! for scripts.

use std::io::Write;

use tracing::info;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarvestProgressEvent {
    /// The walk is starting. Total unknown.
    Discovering { harvester: String },
    /// `n` files have reached a terminal outcome.
    Reconciling { harvester: String, n: u64 },
    /// Traversal finished; orphans are being removed.
    Sweeping { harvester: String },
}

/// Reports harvest progress. Called from the collector loop only.
pub trait HarvestProgressReporter: Send + Sync {
    fn report(&self, event: HarvestProgressEvent);
}

/// Files between two `Reconciling` log lines.
const LOG_EVERY: u64 = 500;

/// Logs progress through `tracing`.
pub struct LogProgress;

impl HarvestProgressReporter for LogProgress {
    fn report(&self, event: HarvestProgressEvent) {
        match &event {
            HarvestProgressEvent::Discovering { harvester } => {
                info!(harvester = %harvester, "walking directory");
            }
            HarvestProgressEvent::Reconciling { harvester, n } => {
                if n % LOG_EVERY == 0 {
                    info!(harvester = %harvester, "reconciled {} files", format_number(*n));
                }
            }
            HarvestProgressEvent::Sweeping { harvester } => {
                info!(harvester = %harvester, "sweeping orphaned records");
            }
        }
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl HarvestProgressReporter for JsonProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let obj = match &event {
            HarvestProgressEvent::Discovering { harvester } => serde_json::json!({
                "event": "progress",
                "harvester": harvester,
                "phase": "discovering"
            }),
            HarvestProgressEvent::Reconciling { harvester, n } => serde_json::json!({
                "event": "progress",
                "harvester": harvester,
                "phase": "reconciling",
                "n": n
            }),
            HarvestProgressEvent::Sweeping { harvester } => serde_json::json!({
                "event": "progress",
                "harvester": harvester,
                "phase": "sweeping"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op reporter.
pub struct NoProgress;

impl HarvestProgressReporter for NoProgress {
    fn report(&self, _event: HarvestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let lead = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.char_indices() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(d);
    }
    out
}

/// Progress mode for the CLI: off, log, or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Log,
    Json,
}

impl ProgressMode {
    /// Default: log progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Log
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn HarvestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Log => Box::new(LogProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(format_number(7), "7");
        assert_eq!(format_number(500), "500");
        assert_eq!(format_number(12_500), "12,500");
        assert_eq!(format_number(3_000_000), "3,000,000");
    }
}
