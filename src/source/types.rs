//! Sensor sample types shared by the loader, the windower and the extractor.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Number of axes per sensor group.
pub const AXES_PER_GROUP: usize = 3;

/// The three sensor groups recorded per sample, in feature order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorGroup {
    /// Linear acceleration (gravity removed)
    Linear,
    /// Gravity vector
    Gravity,
    /// Gyroscope angular velocity
    Gyro,
}

impl SensorGroup {
    /// All groups in feature-vector order.
    pub const ALL: [SensorGroup; 3] = [
        SensorGroup::Linear,
        SensorGroup::Gravity,
        SensorGroup::Gyro,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SensorGroup::Linear => "linear",
            SensorGroup::Gravity => "gravity",
            SensorGroup::Gyro => "gyro",
        }
    }
}

/// Device axis within a sensor group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One row of an aligned session: a label and 3×3 readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Activity class id of this row
    #[serde(default)]
    pub label: i32,
    pub linear: [f64; AXES_PER_GROUP],
    pub gravity: [f64; AXES_PER_GROUP],
    pub gyro: [f64; AXES_PER_GROUP],
}

impl SensorSample {
    pub fn new(
        label: i32,
        linear: [f64; AXES_PER_GROUP],
        gravity: [f64; AXES_PER_GROUP],
        gyro: [f64; AXES_PER_GROUP],
    ) -> Self {
        Self {
            label,
            linear,
            gravity,
            gyro,
        }
    }

    /// Readings of one sensor group.
    pub fn group(&self, group: SensorGroup) -> &[f64; AXES_PER_GROUP] {
        match group {
            SensorGroup::Linear => &self.linear,
            SensorGroup::Gravity => &self.gravity,
            SensorGroup::Gyro => &self.gyro,
        }
    }
}

/// A single sensor recording in column form, as read from its source file.
///
/// The axis count is not fixed here; [`SessionTable::from_streams`] rejects
/// streams that do not carry exactly three axes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorStream {
    /// Label column, one entry per row
    pub labels: Vec<i32>,
    /// Axis columns, each with one entry per row
    pub axes: Vec<Vec<f64>>,
}

impl SensorStream {
    pub fn new(labels: Vec<i32>, axes: Vec<Vec<f64>>) -> Self {
        Self { labels, axes }
    }

    /// Number of rows (taken from the label column).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn check_shape(&self, session: &str, group: SensorGroup) -> Result<()> {
        if self.axes.len() != AXES_PER_GROUP {
            return Err(PipelineError::shape(
                session,
                format!(
                    "{} stream has {} axis columns, expected {}",
                    group.name(),
                    self.axes.len(),
                    AXES_PER_GROUP
                ),
            ));
        }
        for (axis, column) in Axis::ALL.iter().zip(&self.axes) {
            if column.len() != self.labels.len() {
                return Err(PipelineError::shape(
                    session,
                    format!(
                        "{} axis {} has {} rows but the label column has {}",
                        group.name(),
                        axis.name(),
                        column.len(),
                        self.labels.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn row(&self, i: usize) -> [f64; AXES_PER_GROUP] {
        [self.axes[0][i], self.axes[1][i], self.axes[2][i]]
    }
}

/// All samples of one recording session, row-aligned across sensors.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTable {
    id: String,
    samples: Vec<SensorSample>,
}

impl SessionTable {
    /// Build a table from already-aligned samples.
    pub fn new(id: impl Into<String>, samples: Vec<SensorSample>) -> Self {
        Self {
            id: id.into(),
            samples,
        }
    }

    /// Join the three sensor streams of a session by row index.
    ///
    /// Labels come from the linear stream. Fails with a shape error if any
    /// stream lacks exactly three axis columns or the streams differ in
    /// length.
    pub fn from_streams(
        id: impl Into<String>,
        linear: &SensorStream,
        gravity: &SensorStream,
        gyro: &SensorStream,
    ) -> Result<Self> {
        let id = id.into();
        let streams = [
            (SensorGroup::Linear, linear),
            (SensorGroup::Gravity, gravity),
            (SensorGroup::Gyro, gyro),
        ];
        for (group, stream) in streams {
            stream.check_shape(&id, group)?;
        }

        let rows = linear.len();
        for (group, stream) in &streams[1..] {
            if stream.len() != rows {
                return Err(PipelineError::shape(
                    &id,
                    format!(
                        "{} stream has {} rows but linear has {}",
                        group.name(),
                        stream.len(),
                        rows
                    ),
                ));
            }
        }

        let samples = (0..rows)
            .map(|i| {
                SensorSample::new(linear.labels[i], linear.row(i), gravity.row(i), gyro.row(i))
            })
            .collect();

        Ok(Self { id, samples })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn samples(&self) -> &[SensorSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(rows: usize, axes: usize, base: f64) -> SensorStream {
        SensorStream::new(
            (0..rows).map(|i| (i % 2) as i32).collect(),
            (0..axes)
                .map(|a| (0..rows).map(|i| base + a as f64 + i as f64 * 0.1).collect())
                .collect(),
        )
    }

    #[test]
    fn test_from_streams_aligns_rows() {
        let (linear, gravity, gyro) = (stream(4, 3, 0.0), stream(4, 3, 10.0), stream(4, 3, 20.0));
        let table = SessionTable::from_streams("s0", &linear, &gravity, &gyro).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.id(), "s0");

        let second = table.samples()[1];
        assert_eq!(second.label, 1);
        assert_eq!(second.linear, [0.1, 1.1, 2.1]);
        assert_eq!(second.gravity[0], 10.1);
        assert_eq!(second.group(SensorGroup::Gyro)[2], 22.1);
    }

    #[test]
    fn test_wrong_axis_count_is_shape_error() {
        let (linear, gravity, gyro) = (stream(4, 3, 0.0), stream(4, 2, 0.0), stream(4, 3, 0.0));
        let err = SessionTable::from_streams("s1", &linear, &gravity, &gyro).unwrap_err();
        assert!(matches!(err, PipelineError::Shape { ref session, .. } if session == "s1"));
        assert!(err.to_string().contains("gravity"));
    }

    #[test]
    fn test_length_mismatch_is_shape_error() {
        let (linear, gravity, gyro) = (stream(4, 3, 0.0), stream(4, 3, 0.0), stream(5, 3, 0.0));
        let err = SessionTable::from_streams("s2", &linear, &gravity, &gyro).unwrap_err();
        assert!(matches!(err, PipelineError::Shape { .. }));

        let mut ragged = stream(4, 3, 0.0);
        ragged.axes[1].pop();
        let err = SessionTable::from_streams("s3", &ragged, &stream(4, 3, 0.0), &stream(4, 3, 0.0))
            .unwrap_err();
        assert!(err.to_string().contains("axis y"));
    }
}
