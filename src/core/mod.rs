//! Core functionality of the activity pipeline.
//!
//! This module contains:
//! - Windowing of sensor sessions and live sample streams
//! - Feature computation from windows
//! - Corpus construction and the LIBSVM text encoding
//! - Optional min-max scaling of feature vectors

pub mod dataset;
pub mod features;
pub mod scaling;
pub mod windowing;

// Re-export commonly used types
pub use dataset::{parse_corpus, Corpus, DatasetBuilder, LabeledExample, SparseExample};
pub use features::{extract, FeatureVector, Statistic, FEATURE_COUNT, FEATURE_SCHEMA};
pub use scaling::{MinMaxScaler, ScalingConfig};
pub use windowing::{generate_windows, SampleBuffer, Window, WindowSpec};
