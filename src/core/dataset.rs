//! Corpus construction and the LIBSVM text encoding.
//!
//! The builder runs windowing and feature extraction over an ordered list of
//! sessions and pairs every window with the label of its first sample. The
//! resulting [`Corpus`] is written one example per line:
//!
//! ```text
//! <label> 1:<v1> 2:<v2> ... 18:<v18>
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::features::{extract, FeatureVector, FEATURE_COUNT};
use crate::core::windowing::{generate_windows, WindowSpec};
use crate::error::{PipelineError, Result};
use crate::source::{load_session, SessionTable, SourceLayout};
use crate::stats::{create_shared_stats, BuildStats, SharedStats};
use crate::storage::write_atomic;

/// One window's label and features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub label: i32,
    pub features: FeatureVector,
}

impl LabeledExample {
    pub fn new(label: i32, features: FeatureVector) -> Self {
        Self { label, features }
    }

    /// Render as a single LIBSVM line (without the newline).
    ///
    /// All indices are written, zeros included, and values use the shortest
    /// representation that parses back to the same `f64`.
    pub fn to_libsvm_line(&self) -> String {
        let mut line = self.label.to_string();
        for (i, value) in self.features.iter().enumerate() {
            let _ = write!(line, " {}:{}", i + 1, value);
        }
        line
    }
}

/// Ordered, immutable set of labeled examples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    examples: Vec<LabeledExample>,
}

impl Corpus {
    pub fn new(examples: Vec<LabeledExample>) -> Self {
        Self { examples }
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn labels(&self) -> Vec<i32> {
        self.examples.iter().map(|e| e.label).collect()
    }

    /// Example count per label, in ascending label order.
    pub fn class_counts(&self) -> BTreeMap<i32, usize> {
        let mut counts = BTreeMap::new();
        for example in &self.examples {
            *counts.entry(example.label).or_insert(0) += 1;
        }
        counts
    }

    /// Encode the whole corpus, one newline-terminated line per example.
    pub fn to_libsvm(&self) -> String {
        let mut out = String::with_capacity(self.examples.len() * 400);
        for example in &self.examples {
            out.push_str(&example.to_libsvm_line());
            out.push('\n');
        }
        out
    }

    /// Decode LIBSVM text into dense examples.
    pub fn from_libsvm(text: &str) -> Result<Self> {
        parse_corpus(text)?
            .into_iter()
            .map(|sparse| sparse.into_dense())
            .collect()
    }

    /// Write the corpus atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_libsvm().as_bytes())?;
        tracing::info!(examples = self.len(), path = %path.display(), "corpus written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_libsvm(&text)
    }
}

impl FromIterator<LabeledExample> for Corpus {
    fn from_iter<I: IntoIterator<Item = LabeledExample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A parsed corpus line before densification.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseExample {
    /// 1-based line number in the source text
    pub line: usize,
    pub label: i32,
    /// 1-based feature index to value
    pub features: BTreeMap<usize, f64>,
}

impl SparseExample {
    /// Expand into the fixed schema; absent indices are zero.
    pub fn into_dense(self) -> Result<LabeledExample> {
        let mut features = FeatureVector::zeros();
        for (index, value) in self.features {
            if index == 0 || index > FEATURE_COUNT {
                return Err(PipelineError::parse(
                    self.line,
                    format!("feature index {index} outside 1..={FEATURE_COUNT}"),
                ));
            }
            features.0[index - 1] = value;
        }
        Ok(LabeledExample::new(self.label, features))
    }
}

/// Parse one LIBSVM line. `line_no` is only used for error context.
pub fn parse_line(line_no: usize, line: &str) -> Result<SparseExample> {
    let mut tokens = line.split_whitespace();

    let label_token = tokens
        .next()
        .ok_or_else(|| PipelineError::parse(line_no, "missing label"))?;
    let label: i32 = label_token.parse().map_err(|_| {
        PipelineError::parse(line_no, format!("label '{label_token}' is not an integer"))
    })?;

    let features =
        parse_feature_tokens(tokens).map_err(|reason| PipelineError::parse(line_no, reason))?;

    Ok(SparseExample {
        line: line_no,
        label,
        features,
    })
}

/// Parse `index:value` tokens into a sparse map.
///
/// Indices are 1-based and bounded by the schema; duplicates and non-finite
/// values are rejected.
pub fn parse_feature_tokens<'a>(
    tokens: impl IntoIterator<Item = &'a str>,
) -> std::result::Result<BTreeMap<usize, f64>, String> {
    let mut features = BTreeMap::new();
    for token in tokens {
        if features.len() == FEATURE_COUNT {
            return Err(format!("more than {FEATURE_COUNT} feature tokens"));
        }

        let (index, value) = token
            .split_once(':')
            .ok_or_else(|| format!("token '{token}' is not index:value"))?;
        let index: usize = index
            .parse()
            .map_err(|_| format!("token '{token}' has a non-integer index"))?;
        let value: f64 = value
            .parse()
            .map_err(|_| format!("token '{token}' has a non-numeric value"))?;

        if index == 0 || index > FEATURE_COUNT {
            return Err(format!("feature index {index} outside 1..={FEATURE_COUNT}"));
        }
        if !value.is_finite() {
            return Err(format!("feature {index} is not finite"));
        }
        if features.insert(index, value).is_some() {
            return Err(format!("duplicate feature index {index}"));
        }
    }
    Ok(features)
}

/// Parse a whole corpus. Blank lines are skipped; line numbers are 1-based.
pub fn parse_corpus(text: &str) -> Result<Vec<SparseExample>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_line(i + 1, line))
        .collect()
}

/// Builds a corpus from recorded sessions.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    spec: WindowSpec,
    stats: SharedStats,
}

impl DatasetBuilder {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            stats: create_shared_stats(),
        }
    }

    /// Record into an existing, possibly persisted, statistics log.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Counters accumulated across every `build` call.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Examples of one session, in window order.
    pub fn session_examples(&self, table: &SessionTable) -> Vec<LabeledExample> {
        let examples: Vec<LabeledExample> = generate_windows(table, self.spec)
            .iter()
            .filter_map(|window| Some(LabeledExample::new(window.label()?, extract(window))))
            .collect();

        self.stats.record_session(table.len(), &examples);
        tracing::debug!(
            session = table.id(),
            samples = table.len(),
            windows = examples.len(),
            "session processed"
        );
        examples
    }

    /// Build a corpus, keeping session order and then window order.
    ///
    /// Sessions are processed in parallel; the merge is by session index.
    pub fn build(&self, sessions: &[SessionTable]) -> Corpus {
        let per_session: Vec<Vec<LabeledExample>> = sessions
            .par_iter()
            .map(|table| self.session_examples(table))
            .collect();

        let corpus: Corpus = per_session.into_iter().flatten().collect();
        tracing::info!(sessions = sessions.len(), examples = corpus.len(), "corpus built");
        corpus
    }

    /// Load every session directory, then build.
    ///
    /// The first session that fails to load aborts the build; its error names
    /// the session.
    pub fn build_from_dirs(&self, dirs: &[PathBuf], layout: &SourceLayout) -> Result<Corpus> {
        let sessions = dirs
            .par_iter()
            .map(|dir| load_session(dir, layout))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.build(&sessions))
    }
}
