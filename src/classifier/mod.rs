//! Classifier capability, training and inference.
//!
//! The pipeline only talks to a backend through the [`Classifier`] trait, so
//! the SVM implementation can be swapped without touching corpus handling,
//! training orchestration or serving.

pub mod inference;
pub mod report;
pub mod svm;
pub mod trainer;

use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::dataset::{Corpus, LabeledExample};
use crate::core::features::{FeatureVector, FEATURE_COUNT};
use crate::error::Result;

// Re-export commonly used types
pub use inference::{classify, Activity, InferenceService, Prediction};
pub use report::{TrainingReport, PRODUCER_NAME, REPORT_VERSION};
pub use svm::{LinfaSvm, SvmModel};
pub use trainer::{
    stratified_split, ConfusionMatrix, EvaluationMetrics, SplitIndices, Trainer, TrainingOutcome,
};

/// A learning backend.
///
/// Models are plain values owned by the caller; the backend itself holds no
/// training state and can be shared freely.
pub trait Classifier: Send + Sync {
    type Model: Send + Sync + 'static;

    /// Fit a model on a training problem.
    fn train(&self, problem: &Problem, params: &TrainParams) -> Result<Self::Model>;

    /// Predict the label of one feature vector.
    fn predict(&self, model: &Self::Model, features: &FeatureVector) -> i32;

    /// Persist a model. Either the whole model is written or nothing is.
    fn save(&self, model: &Self::Model, path: &Path) -> Result<()>;

    /// Restore a model written by [`Classifier::save`].
    fn load(&self, path: &Path) -> Result<Self::Model>;
}

/// Labels and feature vectors handed to a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Problem {
    pub labels: Vec<i32>,
    pub features: Vec<FeatureVector>,
}

impl Problem {
    pub fn from_examples<'a>(examples: impl IntoIterator<Item = &'a LabeledExample>) -> Self {
        let (labels, features) = examples
            .into_iter()
            .map(|e| (e.label, e.features))
            .unzip();
        Self { labels, features }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Distinct labels in ascending order.
    pub fn classes(&self) -> Vec<i32> {
        let mut classes = self.labels.clone();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    /// Row-major feature matrix of the given rows.
    pub fn records(&self, rows: &[usize]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(i, j)| {
            self.features[rows[i]].0[j]
        })
    }

    /// Binary targets of the given rows: `true` where the label is `positive`.
    pub fn binary_targets(&self, rows: &[usize], positive: i32) -> Array1<bool> {
        rows.iter().map(|&row| self.labels[row] == positive).collect()
    }
}

impl From<&Corpus> for Problem {
    fn from(corpus: &Corpus) -> Self {
        Self::from_examples(corpus.examples())
    }
}

/// SVM kernel function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    /// `x·y`
    Linear,
    /// `(x·y + coef0)^degree`
    Polynomial,
    /// `exp(-gamma * |x - y|^2)`
    #[default]
    Rbf,
}

impl std::str::FromStr for KernelType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "polynomial" | "poly" => Ok(Self::Polynomial),
            "rbf" | "gaussian" => Ok(Self::Rbf),
            other => Err(ConfigError::Invalid(format!("unknown kernel '{other}'"))),
        }
    }
}

/// C-SVM hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub kernel: KernelType,
    /// Soft-margin cost
    pub c: f64,
    /// RBF width
    pub gamma: f64,
    /// Polynomial degree
    pub degree: u32,
    /// Polynomial offset
    pub coef0: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            kernel: KernelType::Rbf,
            c: 1.0,
            gamma: 0.5,
            degree: 3,
            coef0: 0.0,
        }
    }
}

impl TrainParams {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ConfigError::Invalid(format!("svm.c must be > 0, got {}", self.c)));
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "svm.gamma must be > 0, got {}",
                self.gamma
            )));
        }
        if self.degree == 0 {
            return Err(ConfigError::Invalid("svm.degree must be >= 1".to_string()));
        }
        if !self.coef0.is_finite() {
            return Err(ConfigError::Invalid("svm.coef0 must be finite".to_string()));
        }
        Ok(())
    }
}

/// Stratified train/test split settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of each class held out for testing, in (0, 1)
    pub test_fraction: f64,
    pub random_seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            random_seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "split.test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_defaults_and_validation() {
        let params = TrainParams::default();
        assert_eq!(params.kernel, KernelType::Rbf);
        assert!(params.validate().is_ok());

        for bad in [
            TrainParams { c: 0.0, ..params },
            TrainParams { gamma: -1.0, ..params },
            TrainParams { degree: 0, ..params },
            TrainParams { c: f64::NAN, ..params },
        ] {
            assert!(bad.validate().is_err(), "{bad:?}");
        }

        assert!(SplitConfig::default().validate().is_ok());
        for fraction in [0.0, 1.0, -0.1, f64::NAN] {
            let split = SplitConfig {
                test_fraction: fraction,
                ..SplitConfig::default()
            };
            assert!(split.validate().is_err());
        }
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!("RBF".parse::<KernelType>().unwrap(), KernelType::Rbf);
        assert_eq!("poly".parse::<KernelType>().unwrap(), KernelType::Polynomial);
        assert!("sigmoid".parse::<KernelType>().is_err());

        let json = serde_json::to_string(&KernelType::Polynomial).unwrap();
        assert_eq!(json, "\"polynomial\"");
    }

    #[test]
    fn test_problem_matrix_layout() {
        let mut a = FeatureVector::zeros();
        a.0[0] = 1.0;
        let mut b = FeatureVector::zeros();
        b.0[17] = 2.0;
        let problem = Problem {
            labels: vec![3, 1, 3],
            features: vec![a, b, a],
        };

        assert_eq!(problem.classes(), vec![1, 3]);
        let records = problem.records(&[1, 0]);
        assert_eq!(records.shape(), &[2, FEATURE_COUNT]);
        assert_eq!(records[[0, 17]], 2.0);
        assert_eq!(records[[1, 0]], 1.0);
        assert_eq!(
            problem.binary_targets(&[0, 1, 2], 3).to_vec(),
            vec![true, false, true]
        );
    }
}
