//! CSV session loader.
//!
//! A session directory holds one CSV file per sensor group. Each file carries
//! a label column and three axis columns at fixed offsets; rows of the three
//! files are aligned by index.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::{PipelineError, Result};
use crate::source::types::{SensorGroup, SensorStream, SessionTable};

/// Where the label and axis values live in each session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLayout {
    pub linear_file: String,
    pub gravity_file: String,
    pub gyro_file: String,
    /// Whether the first row of each file is a header
    pub has_headers: bool,
    /// Zero-based column holding the activity label
    pub label_column: usize,
    /// Zero-based columns holding the x, y, z readings
    pub axis_columns: Vec<usize>,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            linear_file: "linear.csv".to_string(),
            gravity_file: "gravity.csv".to_string(),
            gyro_file: "gyro.csv".to_string(),
            has_headers: true,
            label_column: 0,
            axis_columns: vec![2, 3, 4],
        }
    }
}

impl SourceLayout {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for name in [&self.linear_file, &self.gravity_file, &self.gyro_file] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "source file names must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn file_for(&self, group: SensorGroup) -> &str {
        match group {
            SensorGroup::Linear => &self.linear_file,
            SensorGroup::Gravity => &self.gravity_file,
            SensorGroup::Gyro => &self.gyro_file,
        }
    }

    fn widest_column(&self) -> usize {
        self.axis_columns
            .iter()
            .copied()
            .chain(std::iter::once(self.label_column))
            .max()
            .unwrap_or(0)
    }
}

/// Read one sensor file into column form.
pub fn load_stream(path: &Path, layout: &SourceLayout, session: &str) -> Result<SensorStream> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(layout.has_headers)
        .flexible(true)
        .from_reader(file);

    let mut labels = Vec::new();
    let mut axes: Vec<Vec<f64>> = vec![Vec::new(); layout.axis_columns.len()];
    let needed = layout.widest_column() + 1;

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.map_err(|e| PipelineError::input(session, row, e.to_string()))?;
        if record.len() < needed {
            return Err(PipelineError::shape(
                session,
                format!(
                    "{:?} row {} has {} columns, layout needs {}",
                    path.file_name().unwrap_or_default(),
                    row,
                    record.len(),
                    needed
                ),
            ));
        }

        labels.push(parse_label(&record[layout.label_column]).ok_or_else(|| {
            PipelineError::input(
                session,
                row,
                format!("label '{}' is not an integer", &record[layout.label_column]),
            )
        })?);

        for (column, &col_idx) in axes.iter_mut().zip(&layout.axis_columns) {
            let cell = record[col_idx].trim();
            let value: f64 = cell.parse().map_err(|_| {
                PipelineError::input(
                    session,
                    row,
                    format!("column {col_idx} value '{cell}' is not a number"),
                )
            })?;
            column.push(value);
        }
    }

    Ok(SensorStream::new(labels, axes))
}

/// Load and align the three sensor files of one session directory.
pub fn load_session(dir: &Path, layout: &SourceLayout) -> Result<SessionTable> {
    let session = session_id(dir);
    let load = |group: SensorGroup| {
        load_stream(&dir.join(layout.file_for(group)), layout, &session)
    };

    let linear = load(SensorGroup::Linear)?;
    let gravity = load(SensorGroup::Gravity)?;
    let gyro = load(SensorGroup::Gyro)?;

    let table = SessionTable::from_streams(session, &linear, &gravity, &gyro)?;
    tracing::debug!(session = table.id(), rows = table.len(), "loaded session");
    Ok(table)
}

/// List session sub-directories of a data directory in a stable order.
///
/// Directories named by integers sort numerically and come first; the rest
/// sort lexically.
pub fn discover_sessions(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(data_dir).map_err(|e| PipelineError::io(data_dir, e))?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    dirs.sort_by(|a, b| {
        let key = |p: &PathBuf| {
            let name = session_id(p);
            (name.parse::<u64>().map_or(1, |_| 0), name.parse::<u64>().unwrap_or(0), name)
        };
        key(a).cmp(&key(b))
    });

    Ok(dirs)
}

/// Session identifier used in logs and error messages.
pub fn session_id(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Labels are integers, but some exporters write them as `3.0`.
fn parse_label(cell: &str) -> Option<i32> {
    let cell = cell.trim();
    if let Ok(label) = cell.parse::<i32>() {
        return Some(label);
    }
    let value: f64 = cell.parse().ok()?;
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}
