//! Pipeline statistics log.
//!
//! Tracks how much data flowed through corpus construction and inference:
//! sessions, samples, windows, and examples per label. One log is shared by
//! all parallel session workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::dataset::LabeledExample;
use crate::error::{PipelineError, Result};
use crate::storage::write_atomic;

/// Running counters for one process.
#[derive(Debug)]
pub struct BuildStats {
    /// Number of sessions windowed
    sessions_processed: AtomicU64,
    /// Number of sensor samples read
    samples_read: AtomicU64,
    /// Number of windows turned into examples
    windows_extracted: AtomicU64,
    /// Number of feature vectors classified
    predictions_served: AtomicU64,
    /// Examples per label
    label_counts: Mutex<BTreeMap<i32, u64>>,
    /// Start of the run
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl BuildStats {
    pub fn new() -> Self {
        Self {
            sessions_processed: AtomicU64::new(0),
            samples_read: AtomicU64::new(0),
            windows_extracted: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
            label_counts: Mutex::new(BTreeMap::new()),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates on top of previously saved counters.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "could not load previous pipeline stats");
        }

        stats
    }

    /// Record one windowed session and the examples it produced.
    pub fn record_session(&self, samples: usize, examples: &[LabeledExample]) {
        self.sessions_processed.fetch_add(1, Ordering::Relaxed);
        self.samples_read.fetch_add(samples as u64, Ordering::Relaxed);
        self.windows_extracted
            .fetch_add(examples.len() as u64, Ordering::Relaxed);

        let mut counts = match self.label_counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for example in examples {
            *counts.entry(example.label).or_insert(0) += 1;
        }
    }

    /// Record a served prediction.
    pub fn record_prediction(&self) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let label_counts = match self.label_counts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        StatsSnapshot {
            sessions_processed: self.sessions_processed.load(Ordering::Relaxed),
            samples_read: self.samples_read.load(Ordering::Relaxed),
            windows_extracted: self.windows_extracted.load(Ordering::Relaxed),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            label_counts,
            started_at: self.started_at,
            elapsed_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        let mut out = format!(
            "Pipeline Statistics:\n\
             - Sessions processed: {}\n\
             - Samples read: {}\n\
             - Windows extracted: {}\n\
             - Predictions served: {}\n\
             - Elapsed: {} seconds",
            stats.sessions_processed,
            stats.samples_read,
            stats.windows_extracted,
            stats.predictions_served,
            stats.elapsed_secs
        );
        if !stats.label_counts.is_empty() {
            out.push_str("\n\nExamples per label:");
            for (label, count) in &stats.label_counts {
                out.push_str(&format!("\n- {label}: {count}"));
            }
        }
        out
    }

    /// Save counters to the persistence path, if any.
    pub fn save(&self) -> Result<()> {
        if let Some(ref path) = self.persist_path {
            let stats = self.snapshot();
            let persisted = PersistedStats {
                sessions_processed: stats.sessions_processed,
                samples_read: stats.samples_read,
                windows_extracted: stats.windows_extracted,
                predictions_served: stats.predictions_served,
                label_counts: stats.label_counts,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted)
                .map_err(|e| PipelineError::io(path, std::io::Error::other(e)))?;
            write_atomic(path, json.as_bytes())?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let Some(path) = self.persist_path.clone() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let persisted = read_persisted(&path)?;
        self.sessions_processed
            .store(persisted.sessions_processed, Ordering::Relaxed);
        self.samples_read
            .store(persisted.samples_read, Ordering::Relaxed);
        self.windows_extracted
            .store(persisted.windows_extracted, Ordering::Relaxed);
        self.predictions_served
            .store(persisted.predictions_served, Ordering::Relaxed);
        *self.label_counts.get_mut().unwrap_or_else(|p| p.into_inner()) = persisted.label_counts;
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.sessions_processed.store(0, Ordering::Relaxed);
        self.samples_read.store(0, Ordering::Relaxed);
        self.windows_extracted.store(0, Ordering::Relaxed);
        self.predictions_served.store(0, Ordering::Relaxed);
        match self.label_counts.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Default for BuildStats {
    fn default() -> Self {
        Self::new()
    }
}

fn read_persisted(path: &Path) -> Result<PersistedStats> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| PipelineError::io(path, std::io::Error::other(e)))
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub sessions_processed: u64,
    pub samples_read: u64,
    pub windows_extracted: u64,
    pub predictions_served: u64,
    pub label_counts: BTreeMap<i32, u64>,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sessions_processed: u64,
    samples_read: u64,
    windows_extracted: u64,
    predictions_served: u64,
    #[serde(default)]
    label_counts: BTreeMap<i32, u64>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics log.
pub type SharedStats = Arc<BuildStats>;

/// Create a new shared statistics log.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(BuildStats::new())
}

/// Create a new shared statistics log with persistence.
pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(BuildStats::with_persistence(path))
}
