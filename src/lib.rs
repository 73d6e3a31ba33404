//! Activity Classifier - sliding-window sensor features and SVM activity recognition.
//!
//! This library turns recorded smartphone motion sessions (linear
//! acceleration, gravity and gyroscope, each sampled on three axes) into a
//! labeled LIBSVM corpus, trains a multi-class SVM on it, and classifies new
//! windows with the trained model.
//!
//! # Pipeline
//!
//! - **Windowing**: fixed-size windows at a fixed stride; partial tails are dropped
//! - **Features**: mean and population variance per axis, 18 values per window
//! - **Corpus**: one `<label> 1:v ... 18:v` line per window, label of the first sample
//! - **Training**: seeded stratified split, one-vs-one C-SVM, accuracy and confusion matrix
//! - **Inference**: the same extraction on live windows, then prediction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Activity Classifier                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Source    │──▶│  Windowing  │──▶│  Features   │         │
//! │  │   (CSV)     │   │ (200 / 100) │   │  (18 dims)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                                             │                │
//! │                          ┌──────────────────┴──────┐         │
//! │                          ▼                         ▼         │
//! │                   ┌─────────────┐          ┌─────────────┐   │
//! │                   │   Corpus    │─────────▶│   Trainer   │   │
//! │                   │  (LIBSVM)   │          │ (linfa-svm) │   │
//! │                   └─────────────┘          └─────────────┘   │
//! │                                                   │          │
//! │                                                   ▼          │
//! │                                            ┌─────────────┐   │
//! │                                            │  Inference  │   │
//! │                                            └─────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use activity_classifier::{core, source};
//! use std::path::Path;
//!
//! let layout = source::SourceLayout::default();
//! let sessions = source::discover_sessions(Path::new("data/sessions")).expect("sessions");
//!
//! let builder = core::DatasetBuilder::new(core::WindowSpec::default());
//! let corpus = builder.build_from_dirs(&sessions, &layout).expect("corpus");
//! corpus.save(Path::new("data/corpus.txt")).expect("write corpus");
//! ```

pub mod classifier;
pub mod config;
pub mod core;
pub mod error;
pub mod source;
pub mod stats;
pub mod storage;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use classifier::{
    classify, Activity, Classifier, InferenceService, LinfaSvm, Prediction, SplitConfig,
    TrainParams, Trainer, TrainingOutcome,
};
pub use config::{Config, ConfigError};
pub use core::{Corpus, DatasetBuilder, FeatureVector, LabeledExample, SampleBuffer, WindowSpec};
pub use error::{PipelineError, Result};
pub use source::{SensorSample, SessionTable, SourceLayout};
pub use stats::{BuildStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
