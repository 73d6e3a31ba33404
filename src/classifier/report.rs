//! Training report written alongside each saved model.
//!
//! The report records what was trained and how well it did, so a model file
//! can be traced back to its parameters and evaluation without reloading it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trainer::{EvaluationMetrics, TrainingOutcome};
use super::{SplitConfig, TrainParams};
use crate::error::{PipelineError, Result};
use crate::storage::write_atomic;

/// The current report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "activity-classifier";

/// Producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
}

impl Default for ReportProducer {
    fn default() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

/// Summary of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub report_version: String,
    pub report_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub producer: ReportProducer,
    /// Identifier of the saved model, when the backend has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<Uuid>,
    pub params: TrainParams,
    pub split: SplitConfig,
    pub train_size: usize,
    pub test_size: usize,
    pub class_distribution: BTreeMap<i32, usize>,
    pub metrics: EvaluationMetrics,
    /// Whether features were min-max scaled before training
    pub scaled: bool,
}

impl TrainingReport {
    pub fn new<M>(outcome: &TrainingOutcome<M>, params: TrainParams, split: SplitConfig) -> Self {
        Self {
            report_version: REPORT_VERSION.to_string(),
            report_id: Uuid::new_v4(),
            created_at: Utc::now(),
            producer: ReportProducer::default(),
            model_id: None,
            params,
            split,
            train_size: outcome.train_size,
            test_size: outcome.test_size,
            class_distribution: outcome.class_distribution.clone(),
            metrics: outcome.metrics.clone(),
            scaled: false,
        }
    }

    pub fn with_model_id(mut self, model_id: Uuid) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_scaling(mut self, scaled: bool) -> Self {
        self.scaled = scaled;
        self
    }

    /// Report path for a model file: `model.json` -> `model.report.json`.
    pub fn path_for(model_path: &Path) -> PathBuf {
        model_path.with_extension("report.json")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::training(format!("failed to encode report: {e}")))
    }

    /// Write the report atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_json()?.as_bytes())
    }
}
