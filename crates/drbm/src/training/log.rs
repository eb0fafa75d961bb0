//! Per-epoch learning log, persisted next to the trained model.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::error::DrbmError;

/// Scalar metrics keyed by metric name, then epoch index.
///
/// The experiment configuration is embedded verbatim so a log file is
/// self-describing. Non-finite values serialize as `null`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LearningLog {
    config: serde_json::Value,
    log: BTreeMap<String, BTreeMap<usize, f64>>,
}

impl LearningLog {
    pub fn new(config: serde_json::Value) -> Self {
        Self {
            config,
            log: BTreeMap::new(),
        }
    }

    /// Record `value` for `metric` at `epoch`, replacing any earlier value.
    pub fn make_log(&mut self, epoch: usize, metric: &str, value: f64) {
        self.log.entry(metric.to_string()).or_default().insert(epoch, value);
    }

    pub fn get(&self, metric: &str, epoch: usize) -> Option<f64> {
        self.log.get(metric)?.get(&epoch).copied()
    }

    /// Metric names recorded so far, sorted.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.log.keys().map(String::as_str)
    }

    /// Number of epochs with at least one recorded metric.
    pub fn epochs(&self) -> usize {
        self.log
            .values()
            .filter_map(|series| series.keys().next_back())
            .max()
            .map_or(0, |last| last + 1)
    }

    pub fn save(&self, path: &Path) -> Result<(), DrbmError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!(path = %path.display(), epochs = self.epochs(), "Saved learning log");
        Ok(())
    }
}
