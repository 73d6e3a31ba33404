//! Multi-class C-SVM backend built on `linfa-svm`.
//!
//! `linfa-svm` only trains binary machines, so one machine is fitted for
//! every pair of classes (one-vs-one) and prediction is a majority vote over
//! all pairs. Ties go to the smaller label.
//!
//! Kernels:
//! - Linear: `x·y`
//! - Polynomial: `(x·y + coef0)^degree`
//! - RBF: `exp(-gamma * |x - y|^2)`, which is linfa's Gaussian kernel with
//!   `eps = 1 / gamma`

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use linfa::prelude::*;
use linfa_svm::{Svm, SvmParams};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Classifier, KernelType, Problem, TrainParams};
use crate::core::features::{FeatureVector, FEATURE_COUNT};
use crate::error::{PipelineError, Result};
use crate::storage::write_atomic;

/// Version of the JSON model layout.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Binary machine separating `positive` from `negative`.
#[derive(Clone, Serialize, Deserialize)]
struct PairwiseMachine {
    positive: i32,
    negative: i32,
    svm: Svm<f64, bool>,
}

/// A trained one-vs-one model.
#[derive(Clone, Serialize, Deserialize)]
pub struct SvmModel {
    pub format_version: u32,
    pub model_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_count: usize,
    pub params: TrainParams,
    /// Labels seen during training, ascending
    pub classes: Vec<i32>,
    machines: Vec<PairwiseMachine>,
}

impl SvmModel {
    /// Number of pairwise machines.
    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    /// Model trained on a single class; always predicts it.
    pub fn is_constant(&self) -> bool {
        self.classes.len() == 1
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(format!(
                "unsupported model format version {} (expected {MODEL_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.feature_count != FEATURE_COUNT {
            return Err(format!(
                "model expects {} features, pipeline produces {FEATURE_COUNT}",
                self.feature_count
            ));
        }
        if self.classes.is_empty() {
            return Err("model has no classes".to_string());
        }
        let k = self.classes.len();
        if self.machines.len() != k * (k - 1) / 2 {
            return Err(format!(
                "model has {} pairwise machines for {k} classes",
                self.machines.len()
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SvmModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvmModel")
            .field("model_id", &self.model_id)
            .field("created_at", &self.created_at)
            .field("params", &self.params)
            .field("classes", &self.classes)
            .field("machines", &self.machines.len())
            .finish()
    }
}

/// One-vs-one SVM backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinfaSvm;

impl LinfaSvm {
    pub fn new() -> Self {
        Self
    }

    fn svm_params(params: &TrainParams) -> SvmParams<f64, bool> {
        let base = Svm::<f64, bool>::params().pos_neg_weights(params.c, params.c);
        match params.kernel {
            KernelType::Linear => base.linear_kernel(),
            KernelType::Polynomial => {
                base.polynomial_kernel(params.coef0, f64::from(params.degree))
            }
            KernelType::Rbf => base.gaussian_kernel(1.0 / params.gamma),
        }
    }

    fn fit_pair(
        problem: &Problem,
        params: &TrainParams,
        positive: i32,
        negative: i32,
    ) -> Result<PairwiseMachine> {
        let rows: Vec<usize> = problem
            .labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == positive || **label == negative)
            .map(|(i, _)| i)
            .collect();

        let dataset = Dataset::new(problem.records(&rows), problem.binary_targets(&rows, positive));
        let svm = Self::svm_params(params).fit(&dataset).map_err(|e| {
            PipelineError::training(format!("machine {positive} vs {negative}: {e}"))
        })?;

        tracing::debug!(positive, negative, rows = rows.len(), "fitted pairwise machine");
        Ok(PairwiseMachine {
            positive,
            negative,
            svm,
        })
    }

    /// Tally pairwise votes for a batch of rows.
    fn vote(model: &SvmModel, records: &Array2<f64>) -> Vec<i32> {
        let n = records.nrows();
        let Some(&first) = model.classes.first() else {
            return Vec::new();
        };
        if model.is_constant() {
            return vec![first; n];
        }

        let mut votes: Vec<BTreeMap<i32, u32>> = vec![BTreeMap::new(); n];
        for machine in &model.machines {
            let decisions: Array1<bool> = machine.svm.predict(records);
            for (tally, positive) in votes.iter_mut().zip(decisions.iter()) {
                let winner = if *positive {
                    machine.positive
                } else {
                    machine.negative
                };
                *tally.entry(winner).or_insert(0) += 1;
            }
        }

        votes
            .into_iter()
            .map(|tally| {
                // ascending iteration keeps the smaller label on ties
                let mut best = (first, 0);
                for (label, count) in tally {
                    if count > best.1 {
                        best = (label, count);
                    }
                }
                best.0
            })
            .collect()
    }

    /// Predict many vectors at once.
    pub fn predict_batch(&self, model: &SvmModel, features: &[FeatureVector]) -> Vec<i32> {
        let records = Array2::from_shape_fn((features.len(), FEATURE_COUNT), |(i, j)| {
            features[i].0[j]
        });
        Self::vote(model, &records)
    }
}

impl Classifier for LinfaSvm {
    type Model = SvmModel;

    fn train(&self, problem: &Problem, params: &TrainParams) -> Result<SvmModel> {
        params.validate()?;
        if problem.is_empty() {
            return Err(PipelineError::insufficient_data("training problem is empty"));
        }

        let classes = problem.classes();
        let pairs: Vec<(i32, i32)> = classes
            .iter()
            .enumerate()
            .flat_map(|(i, &a)| classes[i + 1..].iter().map(move |&b| (a, b)))
            .collect();

        tracing::info!(
            examples = problem.len(),
            classes = classes.len(),
            machines = pairs.len(),
            kernel = ?params.kernel,
            "training one-vs-one SVM"
        );

        let machines = pairs
            .par_iter()
            .map(|&(positive, negative)| Self::fit_pair(problem, params, positive, negative))
            .collect::<Result<Vec<_>>>()?;

        Ok(SvmModel {
            format_version: MODEL_FORMAT_VERSION,
            model_id: Uuid::new_v4(),
            created_at: Utc::now(),
            feature_count: FEATURE_COUNT,
            params: *params,
            classes,
            machines,
        })
    }

    fn predict(&self, model: &SvmModel, features: &FeatureVector) -> i32 {
        self.predict_batch(model, std::slice::from_ref(features))
            .first()
            .copied()
            .unwrap_or_default()
    }

    fn save(&self, model: &SvmModel, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(model)
            .map_err(|e| PipelineError::io(path, std::io::Error::other(e)))?;
        write_atomic(path, &json)?;
        tracing::info!(model_id = %model.model_id, path = %path.display(), "model saved");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<SvmModel> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        let model: SvmModel = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::model_load(path, e.to_string()))?;
        model
            .check()
            .map_err(|reason| PipelineError::model_load(path, reason))?;
        tracing::debug!(model_id = %model.model_id, classes = ?model.classes, "model loaded");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three well separated clusters along feature 0 and 1.
    fn clustered_problem() -> Problem {
        let mut labels = Vec::new();
        let mut features = Vec::new();
        for (label, center) in [(1, -3.0), (2, 0.0), (5, 3.0)] {
            for i in 0..12 {
                let jitter = (i as f64 - 5.5) * 0.05;
                let mut v = FeatureVector::zeros();
                v.0[0] = center + jitter;
                v.0[1] = center - jitter;
                labels.push(label);
                features.push(v);
            }
        }
        Problem { labels, features }
    }

    fn point(x: f64) -> FeatureVector {
        let mut v = FeatureVector::zeros();
        v.0[0] = x;
        v.0[1] = x;
        v
    }

    #[test]
    fn test_rbf_separates_clusters() {
        let backend = LinfaSvm::new();
        let model = backend
            .train(&clustered_problem(), &TrainParams::default())
            .unwrap();

        assert_eq!(model.classes, vec![1, 2, 5]);
        assert_eq!(model.machine_count(), 3);
        assert_eq!(backend.predict(&model, &point(-3.0)), 1);
        assert_eq!(backend.predict(&model, &point(0.0)), 2);
        assert_eq!(backend.predict(&model, &point(3.0)), 5);
    }

    #[test]
    fn test_linear_and_polynomial_kernels_train() {
        let backend = LinfaSvm::new();
        for kernel in [KernelType::Linear, KernelType::Polynomial] {
            let params = TrainParams {
                kernel,
                coef0: 1.0,
                degree: 2,
                ..TrainParams::default()
            };
            let model = backend.train(&clustered_problem(), &params).unwrap();
            assert_eq!(backend.predict(&model, &point(-3.0)), 1, "{kernel:?}");
            assert_eq!(backend.predict(&model, &point(3.0)), 5, "{kernel:?}");
        }
    }

    #[test]
    fn test_single_class_is_constant() {
        let problem = Problem {
            labels: vec![4, 4, 4],
            features: vec![point(0.0), point(1.0), point(2.0)],
        };
        let backend = LinfaSvm::new();
        let model = backend.train(&problem, &TrainParams::default()).unwrap();
        assert!(model.is_constant());
        assert_eq!(backend.predict(&model, &point(100.0)), 4);
    }

    #[test]
    fn test_empty_problem_and_bad_params() {
        let backend = LinfaSvm::new();
        assert!(matches!(
            backend.train(&Problem::default(), &TrainParams::default()),
            Err(PipelineError::InsufficientData(_))
        ));
        let bad = TrainParams {
            c: -1.0,
            ..TrainParams::default()
        };
        assert!(matches!(
            backend.train(&clustered_problem(), &bad),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load_predict_identically() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.json");
        let backend = LinfaSvm::new();
        let problem = clustered_problem();
        let model = backend.train(&problem, &TrainParams::default()).unwrap();

        backend.save(&model, &path).unwrap();
        let loaded = backend.load(&path).unwrap();
        assert_eq!(loaded.model_id, model.model_id);
        assert_eq!(
            backend.predict_batch(&loaded, &problem.features),
            backend.predict_batch(&model, &problem.features)
        );
    }

    #[test]
    fn test_load_rejects_bad_models() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = LinfaSvm::new();

        let garbage = tmp.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(matches!(backend.load(&garbage), Err(PipelineError::ModelLoad { .. })));

        let model = backend
            .train(&clustered_problem(), &TrainParams::default())
            .unwrap();
        let mut value = serde_json::to_value(&model).unwrap();
        value["feature_count"] = serde_json::json!(17);
        let wrong_width = tmp.path().join("wrong.json");
        std::fs::write(&wrong_width, value.to_string()).unwrap();
        assert!(matches!(backend.load(&wrong_width), Err(PipelineError::ModelLoad { .. })));

        value["feature_count"] = serde_json::json!(FEATURE_COUNT);
        value["format_version"] = serde_json::json!(99);
        let wrong_version = tmp.path().join("version.json");
        std::fs::write(&wrong_version, value.to_string()).unwrap();
        assert!(matches!(backend.load(&wrong_version), Err(PipelineError::ModelLoad { .. })));

        assert!(matches!(
            backend.load(&tmp.path().join("missing.json")),
            Err(PipelineError::Io { .. })
        ));
    }
}
