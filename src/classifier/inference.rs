//! Label prediction for new feature vectors and windows.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::core::features::{extract, FeatureVector};
use crate::core::scaling::MinMaxScaler;
use crate::core::windowing::Window;
use crate::error::{PipelineError, Result};
use crate::stats::{create_shared_stats, SharedStats};

/// Activity names of the recording app's label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    Others,
    Walking,
    Running,
    Standing,
    Sitting,
    Upstairs,
    Downstairs,
    Unknown,
}

impl Activity {
    pub fn from_label(label: i32) -> Self {
        match label {
            0 => Activity::Others,
            1 => Activity::Walking,
            2 => Activity::Running,
            3 => Activity::Standing,
            4 => Activity::Sitting,
            5 => Activity::Upstairs,
            6 => Activity::Downstairs,
            _ => Activity::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activity::Others => "Others",
            Activity::Walking => "Walking",
            Activity::Running => "Running",
            Activity::Standing => "Standing",
            Activity::Sitting => "Sitting",
            Activity::Upstairs => "Upstairs",
            Activity::Downstairs => "Downstairs",
            Activity::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A predicted label with its activity name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: i32,
    pub activity: Activity,
}

impl Prediction {
    pub fn new(label: i32) -> Self {
        Self {
            label,
            activity: Activity::from_label(label),
        }
    }
}

/// Predict the label of a raw feature vector.
///
/// The vector must hold exactly as many values as the feature schema; any
/// other length fails with `DimensionMismatch`. No scaling is applied.
pub fn classify<C: Classifier>(classifier: &C, model: &C::Model, features: &[f64]) -> Result<i32> {
    let features = FeatureVector::from_slice(features)?;
    Ok(classifier.predict(model, &features))
}

/// A loaded model ready to serve predictions.
///
/// The model is immutable and shared through an `Arc`, so one service can
/// answer concurrent requests.
pub struct InferenceService<C: Classifier> {
    classifier: C,
    model: Arc<C::Model>,
    scaler: Option<Arc<MinMaxScaler>>,
    stats: SharedStats,
}

impl<C: Classifier> InferenceService<C> {
    pub fn new(classifier: C, model: C::Model) -> Self {
        Self {
            classifier,
            model: Arc::new(model),
            scaler: None,
            stats: create_shared_stats(),
        }
    }

    /// Load a model and, when given, the range file it was trained with.
    pub fn load(classifier: C, model_path: &Path, scaler_path: Option<&Path>) -> Result<Self> {
        let model = classifier.load(model_path)?;
        let mut service = Self::new(classifier, model);
        if let Some(path) = scaler_path {
            service = service.with_scaler(MinMaxScaler::load(path)?);
        }
        tracing::info!(
            model = %model_path.display(),
            scaled = service.scaler.is_some(),
            "inference service ready"
        );
        Ok(service)
    }

    /// Scale every vector with `scaler` before prediction.
    pub fn with_scaler(mut self, scaler: MinMaxScaler) -> Self {
        self.scaler = Some(Arc::new(scaler));
        self
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn model(&self) -> &Arc<C::Model> {
        &self.model
    }

    pub fn is_scaled(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Classify an unscaled feature vector.
    pub fn classify_features(&self, features: &[f64]) -> Result<Prediction> {
        let features = FeatureVector::from_slice(features)?;
        Ok(self.predict(&features))
    }

    /// Extract features from a window, then classify them.
    pub fn classify_window(&self, window: &Window<'_>) -> Result<Prediction> {
        if window.is_empty() {
            return Err(PipelineError::insufficient_data("window has no samples"));
        }
        Ok(self.predict(&extract(window)))
    }

    fn predict(&self, features: &FeatureVector) -> Prediction {
        let label = match &self.scaler {
            Some(scaler) => self.classifier.predict(&self.model, &scaler.transform(features)),
            None => self.classifier.predict(&self.model, features),
        };
        self.stats.record_prediction();
        Prediction::new(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{LinfaSvm, Problem, TrainParams};
    use crate::core::dataset::{Corpus, LabeledExample};
    use crate::core::scaling::ScalingConfig;
    use crate::source::SensorSample;

    fn two_class_problem() -> Problem {
        let mut problem = Problem::default();
        for i in 0..10 {
            let offset = i as f64 * 0.01;
            let mut walking = FeatureVector::zeros();
            walking.0[1] = 4.0 + offset;
            let mut sitting = FeatureVector::zeros();
            sitting.0[1] = offset;
            problem.labels.extend([1, 4]);
            problem.features.extend([walking, sitting]);
        }
        problem
    }

    #[test]
    fn test_activity_names() {
        let names: Vec<&str> = (0..8).map(|l| Activity::from_label(l).name()).collect();
        assert_eq!(
            names,
            vec![
                "Others",
                "Walking",
                "Running",
                "Standing",
                "Sitting",
                "Upstairs",
                "Downstairs",
                "Unknown"
            ]
        );
        assert_eq!(Activity::from_label(-1), Activity::Unknown);
        assert_eq!(Prediction::new(2).activity.to_string(), "Running");
    }

    #[test]
    fn test_classify_checks_dimension() {
        let backend = LinfaSvm::new();
        let model = backend
            .train(&two_class_problem(), &TrainParams::default())
            .unwrap();

        for len in [0, 17, 19] {
            let err = classify(&backend, &model, &vec![0.0; len]).unwrap_err();
            assert!(matches!(
                err,
                PipelineError::DimensionMismatch {
                    expected: 18,
                    actual
                } if actual == len
            ));
        }

        let mut walking = [0.0; 18];
        walking[1] = 4.0;
        assert_eq!(classify(&backend, &model, &walking).unwrap(), 1);
        assert_eq!(classify(&backend, &model, &[0.0; 18]).unwrap(), 4);
    }

    #[test]
    fn test_service_classifies_windows() {
        let backend = LinfaSvm::new();
        let model = backend
            .train(&two_class_problem(), &TrainParams::default())
            .unwrap();
        let service = InferenceService::new(backend, model);

        // linear x variance is 4 for alternating +-2
        let samples: Vec<SensorSample> = (0..20)
            .map(|i| {
                let x = if i % 2 == 0 { 2.0 } else { -2.0 };
                SensorSample::new(0, [x, 0.0, 0.0], [0.0; 3], [0.0; 3])
            })
            .collect();
        let prediction = service.classify_window(&Window::new(0, &samples)).unwrap();
        assert_eq!(prediction, Prediction::new(1));
        assert_eq!(prediction.activity, Activity::Walking);

        let still = vec![SensorSample::new(0, [0.0; 3], [0.0; 3], [0.0; 3]); 20];
        let prediction = service.classify_window(&Window::new(0, &still)).unwrap();
        assert_eq!(prediction.activity, Activity::Sitting);

        assert!(service.classify_window(&Window::new(0, &[])).is_err());
        assert_eq!(service.stats().snapshot().predictions_served, 2);
    }

    #[test]
    fn test_service_applies_scaler() {
        let problem = two_class_problem();
        let corpus: Corpus = problem
            .labels
            .iter()
            .zip(&problem.features)
            .map(|(&l, f)| LabeledExample::new(l, *f))
            .collect();
        let scaler = MinMaxScaler::fit(&corpus, ScalingConfig::default()).unwrap();
        let scaled = Problem::from(&scaler.transform_corpus(&corpus));

        let backend = LinfaSvm::new();
        let model = backend.train(&scaled, &TrainParams::default()).unwrap();
        let service = InferenceService::new(backend, model).with_scaler(scaler);
        assert!(service.is_scaled());

        let mut walking = [0.0; 18];
        walking[1] = 4.05;
        assert_eq!(service.classify_features(&walking).unwrap().label, 1);
        assert_eq!(service.classify_features(&[0.0; 18]).unwrap().label, 4);
    }
}
