//! Training orchestration: stratified split, fitting and evaluation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{Classifier, Problem, SplitConfig, TrainParams};
use crate::core::dataset::Corpus;
use crate::error::{PipelineError, Result};

/// Row indices of the two partitions, each in corpus order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so every class is represented in both partitions.
///
/// Each class `c` with `n_c` members contributes
/// `clamp(round(test_fraction * n_c), 1, n_c - 1)` rows to the test set.
/// Members are shuffled with a `StdRng` seeded from `random_seed`, visiting
/// classes in ascending label order, so the split is reproducible.
pub fn stratified_split(labels: &[i32], config: &SplitConfig) -> Result<SplitIndices> {
    config.validate()?;
    if labels.is_empty() {
        return Err(PipelineError::insufficient_data("corpus is empty"));
    }

    let mut by_class: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    if let Some((label, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(PipelineError::insufficient_data(format!(
            "class {label} has {} example(s); at least 2 are needed to split",
            members.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let mut in_test = vec![false; labels.len()];
    for members in by_class.values_mut() {
        let n = members.len();
        let n_test = ((config.test_fraction * n as f64).round() as usize).clamp(1, n - 1);
        members.shuffle(&mut rng);
        for &row in &members[..n_test] {
            in_test[row] = true;
        }
    }

    let (test, train): (Vec<usize>, Vec<usize>) = (0..labels.len()).partition(|&i| in_test[i]);
    tracing::debug!(
        train = train.len(),
        test = test.len(),
        classes = by_class.len(),
        "stratified split"
    );
    Ok(SplitIndices { train, test })
}

/// Square confusion matrix; rows are true labels, columns predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Row and column labels, ascending
    pub labels: Vec<i32>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Tally `(truth, prediction)` pairs over the union of labels seen.
    pub fn from_pairs(pairs: &[(i32, i32)]) -> Self {
        let mut labels: Vec<i32> = pairs.iter().flat_map(|&(t, p)| [t, p]).collect();
        labels.sort_unstable();
        labels.dedup();

        let slot = |label: i32| labels.binary_search(&label).unwrap_or_default();
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for &(truth, predicted) in pairs {
            counts[slot(truth)][slot(predicted)] += 1;
        }
        Self { labels, counts }
    }

    /// Count for a (true, predicted) pair; zero for unknown labels.
    pub fn get(&self, truth: i32, predicted: i32) -> usize {
        let row = self.labels.binary_search(&truth);
        let col = self.labels.binary_search(&predicted);
        match (row, col) {
            (Ok(r), Ok(c)) => self.counts[r][c],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Sum of the diagonal.
    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(|l| l.to_string().len())
            .chain(self.counts.iter().flatten().map(|c| c.to_string().len()))
            .max()
            .unwrap_or(1)
            .max(4);

        write!(f, "{:>width$}", "t\\p")?;
        for label in &self.labels {
            write!(f, " {label:>width$}")?;
        }
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "\n{label:>width$}")?;
            for count in row {
                write!(f, " {count:>width$}")?;
            }
        }
        Ok(())
    }
}

/// Test-set quality of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// `correct / total`
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
    pub confusion: ConfusionMatrix,
}

impl EvaluationMetrics {
    pub fn from_pairs(pairs: &[(i32, i32)]) -> Self {
        let confusion = ConfusionMatrix::from_pairs(pairs);
        let correct = confusion.correct();
        let total = pairs.len();
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        Self {
            accuracy,
            correct,
            total,
            confusion,
        }
    }
}

/// Result of one training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    pub model: M,
    pub metrics: EvaluationMetrics,
    pub train_size: usize,
    pub test_size: usize,
    /// Corpus examples per label
    pub class_distribution: BTreeMap<i32, usize>,
}

/// Splits a corpus, trains a backend and evaluates it.
#[derive(Debug, Clone)]
pub struct Trainer<C> {
    classifier: Arc<C>,
    params: TrainParams,
    split: SplitConfig,
}

impl<C> Trainer<C>
where
    C: Classifier + 'static,
{
    pub fn new(classifier: C, params: TrainParams, split: SplitConfig) -> Self {
        Self {
            classifier: Arc::new(classifier),
            params,
            split,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    pub fn split_config(&self) -> &SplitConfig {
        &self.split
    }

    /// Split, train on the training partition, and score the test partition.
    pub fn train_and_evaluate(&self, corpus: &Corpus) -> Result<TrainingOutcome<C::Model>> {
        run_training(self.classifier.as_ref(), &self.params, &self.split, corpus)
    }

    /// Like [`Trainer::train_and_evaluate`], bounded by a wall-clock timeout.
    ///
    /// Training runs on a worker thread. On expiry `Timeout` is returned and
    /// the worker's eventual result is discarded.
    pub fn train_with_timeout(
        &self,
        corpus: &Corpus,
        timeout: Duration,
    ) -> Result<TrainingOutcome<C::Model>> {
        let (tx, rx) = bounded(1);
        let classifier = Arc::clone(&self.classifier);
        let params = self.params;
        let split = self.split;
        let corpus = corpus.clone();

        std::thread::Builder::new()
            .name("svm-train".to_string())
            .spawn(move || {
                let result = run_training(classifier.as_ref(), &params, &split, &corpus);
                // receiver is gone after a timeout
                let _ = tx.send(result);
            })
            .map_err(|e| PipelineError::training(format!("failed to spawn training thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(secs = timeout.as_secs(), "training timed out");
                Err(PipelineError::Timeout {
                    secs: timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(PipelineError::training("training thread exited without a result"))
            }
        }
    }

    /// Save a trained model through the backend.
    pub fn persist(&self, model: &C::Model, path: &Path) -> Result<()> {
        self.classifier.save(model, path)
    }
}

fn run_training<C: Classifier>(
    classifier: &C,
    params: &TrainParams,
    split: &SplitConfig,
    corpus: &Corpus,
) -> Result<TrainingOutcome<C::Model>> {
    let labels = corpus.labels();
    let indices = stratified_split(&labels, split)?;
    let examples = corpus.examples();

    let train = Problem::from_examples(indices.train.iter().map(|&i| &examples[i]));
    let model = classifier.train(&train, params)?;

    let pairs: Vec<(i32, i32)> = indices
        .test
        .iter()
        .map(|&i| {
            let example = &examples[i];
            (example.label, classifier.predict(&model, &example.features))
        })
        .collect();
    let metrics = EvaluationMetrics::from_pairs(&pairs);

    tracing::info!(
        train = indices.train.len(),
        test = indices.test.len(),
        accuracy = metrics.accuracy,
        "training finished"
    );

    Ok(TrainingOutcome {
        model,
        metrics,
        train_size: indices.train.len(),
        test_size: indices.test.len(),
        class_distribution: corpus.class_counts(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LinfaSvm;
    use crate::core::dataset::LabeledExample;
    use crate::core::features::FeatureVector;

    fn labels(counts: &[(i32, usize)]) -> Vec<i32> {
        counts
            .iter()
            .flat_map(|&(label, n)| std::iter::repeat(label).take(n))
            .collect()
    }

    #[test]
    fn test_split_per_class_counts() {
        let labels = labels(&[(0, 10), (1, 5), (2, 2), (3, 3)]);
        let split = stratified_split(&labels, &SplitConfig::default()).unwrap();

        let count = |rows: &[usize], label: i32| {
            rows.iter().filter(|&&i| labels[i] == label).count()
        };
        // round(0.2 * n) clamped to [1, n - 1]
        assert_eq!(count(&split.test, 0), 2);
        assert_eq!(count(&split.test, 1), 1);
        assert_eq!(count(&split.test, 2), 1);
        assert_eq!(count(&split.test, 3), 1);
        for label in 0..4 {
            assert!(count(&split.train, label) >= 1);
        }

        assert_eq!(split.train.len() + split.test.len(), labels.len());
        assert!(split.train.windows(2).all(|w| w[0] < w[1]));
        assert!(split.test.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_split_is_seeded() {
        let labels = labels(&[(1, 40), (2, 25)]);
        let config = SplitConfig::default();
        assert_eq!(
            stratified_split(&labels, &config).unwrap(),
            stratified_split(&labels, &config).unwrap()
        );

        let other = SplitConfig {
            random_seed: 7,
            ..config
        };
        assert_ne!(
            stratified_split(&labels, &config).unwrap(),
            stratified_split(&labels, &other).unwrap()
        );
    }

    #[test]
    fn test_split_rejects_tiny_classes() {
        let config = SplitConfig::default();
        assert!(matches!(
            stratified_split(&[], &config),
            Err(PipelineError::InsufficientData(_))
        ));
        assert!(matches!(
            stratified_split(&[1, 1, 1, 2], &config),
            Err(PipelineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let matrix = ConfusionMatrix::from_pairs(&[(1, 1), (1, 2), (2, 2), (3, 2), (1, 1)]);
        assert_eq!(matrix.labels, vec![1, 2, 3]);
        assert_eq!(matrix.get(1, 1), 2);
        assert_eq!(matrix.get(1, 2), 1);
        assert_eq!(matrix.get(3, 2), 1);
        assert_eq!(matrix.get(3, 3), 0);
        assert_eq!(matrix.get(9, 1), 0);
        assert_eq!(matrix.total(), 5);
        assert_eq!(matrix.correct(), 3);

        let metrics = EvaluationMetrics::from_pairs(&[(1, 1), (1, 2), (2, 2), (3, 2), (1, 1)]);
        assert!((metrics.accuracy - 0.6).abs() < 1e-12);

        let rendered = matrix.to_string();
        assert_eq!(rendered.lines().count(), 4);
        assert!(rendered.lines().next().unwrap().contains('3'));
    }

    fn separable_corpus() -> Corpus {
        (0..60)
            .map(|i| {
                let label = (i % 3) as i32;
                let mut v = FeatureVector::zeros();
                v.0[0] = label as f64 * 2.0 + (i as f64 * 0.01);
                v.0[5] = -(label as f64);
                LabeledExample::new(label, v)
            })
            .collect()
    }

    #[test]
    fn test_train_and_evaluate_is_deterministic() {
        let trainer = Trainer::new(LinfaSvm::new(), TrainParams::default(), SplitConfig::default());
        let corpus = separable_corpus();

        let first = trainer.train_and_evaluate(&corpus).unwrap();
        let second = trainer.train_and_evaluate(&corpus).unwrap();
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.test_size, 12);
        assert_eq!(first.train_size, 48);
        assert!(first.metrics.accuracy > 0.9);
        assert_eq!(first.class_distribution.get(&2), Some(&20));
    }

    #[test]
    fn test_train_with_timeout_completes() {
        let trainer = Trainer::new(LinfaSvm::new(), TrainParams::default(), SplitConfig::default());
        let outcome = trainer
            .train_with_timeout(&separable_corpus(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(outcome.metrics.total, 12);
    }

    /// Backend that never finishes within the test timeout.
    struct Sluggish;

    impl Classifier for Sluggish {
        type Model = ();

        fn train(&self, _: &Problem, _: &TrainParams) -> Result<()> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        }

        fn predict(&self, _: &(), _: &FeatureVector) -> i32 {
            0
        }

        fn save(&self, _: &(), path: &Path) -> Result<()> {
            std::fs::write(path, "model").map_err(|e| PipelineError::io(path, e))
        }

        fn load(&self, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_timeout_persists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.json");
        let trainer = Trainer::new(Sluggish, TrainParams::default(), SplitConfig::default());

        let result = trainer
            .train_with_timeout(&separable_corpus(), Duration::from_millis(20))
            .and_then(|outcome| trainer.persist(&outcome.model, &path));
        assert!(matches!(result, Err(PipelineError::Timeout { .. })));
        assert!(!path.exists());
    }
}
