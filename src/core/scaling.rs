//! Optional min-max scaling of feature vectors.
//!
//! The scaler is fit once over a whole corpus and then applied unchanged to
//! training data and to every vector classified later. Ranges are stored in
//! the svm-scale range-file layout so they can be inspected or reused by
//! LIBSVM tooling.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::dataset::{Corpus, LabeledExample};
use crate::core::features::{FeatureVector, FEATURE_COUNT};
use crate::error::{PipelineError, Result};
use crate::storage::write_atomic;

/// Target interval of the scaling stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub lower: f64,
    pub upper: f64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            lower: -1.0,
            upper: 1.0,
        }
    }
}

impl ScalingConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(ConfigError::Invalid(format!(
                "scaling bounds must satisfy lower < upper, got [{}, {}]",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

/// Per-feature min/max ranges mapped onto `[lower, upper]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    bounds: ScalingConfig,
    /// (min, max) seen during fitting, one pair per feature slot
    ranges: Vec<(f64, f64)>,
}

impl MinMaxScaler {
    /// Fit ranges over every example of a corpus.
    pub fn fit(corpus: &Corpus, bounds: ScalingConfig) -> Result<Self> {
        bounds.validate()?;
        if corpus.is_empty() {
            return Err(PipelineError::insufficient_data("cannot fit a scaler on an empty corpus"));
        }

        let mut ranges = vec![(f64::INFINITY, f64::NEG_INFINITY); FEATURE_COUNT];
        for example in corpus.examples() {
            for ((min, max), value) in ranges.iter_mut().zip(example.features.iter()) {
                *min = min.min(value);
                *max = max.max(value);
            }
        }

        tracing::debug!(examples = corpus.len(), "fitted min-max scaler");
        Ok(Self { bounds, ranges })
    }

    pub fn bounds(&self) -> ScalingConfig {
        self.bounds
    }

    /// Fitted (min, max) of a zero-based feature slot.
    pub fn range(&self, slot: usize) -> Option<(f64, f64)> {
        self.ranges.get(slot).copied()
    }

    /// Map a vector into the target interval. Features that were constant
    /// during fitting map to `lower`.
    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        let ScalingConfig { lower, upper } = self.bounds;
        let mut scaled = *features;
        for (value, &(min, max)) in scaled.0.iter_mut().zip(&self.ranges) {
            *value = if max > min {
                lower + (upper - lower) * (*value - min) / (max - min)
            } else {
                lower
            };
        }
        scaled
    }

    /// Scale every example of a corpus, keeping labels and order.
    pub fn transform_corpus(&self, corpus: &Corpus) -> Corpus {
        corpus
            .examples()
            .iter()
            .map(|e| LabeledExample::new(e.label, self.transform(&e.features)))
            .collect()
    }

    /// Render as an svm-scale range file.
    pub fn to_range_file(&self) -> String {
        let mut out = String::from("x\n");
        let _ = writeln!(out, "{} {}", self.bounds.lower, self.bounds.upper);
        for (i, (min, max)) in self.ranges.iter().enumerate() {
            let _ = writeln!(out, "{} {} {}", i + 1, min, max);
        }
        out
    }

    /// Parse an svm-scale range file.
    pub fn from_range_file(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        match lines.next() {
            Some((_, "x")) => {}
            Some((line, other)) => {
                return Err(PipelineError::parse(
                    line,
                    format!("expected 'x' header, found '{other}'"),
                ))
            }
            None => return Err(PipelineError::parse(1, "empty range file")),
        }

        let (line, bounds_line) = lines
            .next()
            .ok_or_else(|| PipelineError::parse(2, "missing scaling bounds"))?;
        let bounds = match parse_floats(bounds_line).as_deref() {
            Some(&[lower, upper]) => ScalingConfig { lower, upper },
            _ => return Err(PipelineError::parse(line, "bounds line must be 'lower upper'")),
        };
        bounds
            .validate()
            .map_err(|e| PipelineError::parse(line, e.to_string()))?;

        let mut ranges: Vec<Option<(f64, f64)>> = vec![None; FEATURE_COUNT];
        let mut last_line = line;
        for (line, content) in lines {
            last_line = line;
            let (index, min, max) = match parse_floats(content).as_deref() {
                Some(&[index, min, max]) => (index, min, max),
                _ => return Err(PipelineError::parse(line, "range line must be 'index min max'")),
            };
            if index.fract() != 0.0 || index < 1.0 || index > FEATURE_COUNT as f64 {
                return Err(PipelineError::parse(
                    line,
                    format!("feature index {index} out of range"),
                ));
            }
            ranges[index as usize - 1] = Some((min, max));
        }

        let ranges = ranges
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.ok_or_else(|| {
                    PipelineError::parse(last_line, format!("no range for feature {}", i + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { bounds, ranges })
    }

    /// Write the range file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_range_file().as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_range_file(&text)
    }
}

fn parse_floats(line: &str) -> Option<Vec<f64>> {
    line.split_whitespace().map(|t| t.parse().ok()).collect()
}
