//! Feature computation from sample windows.
//!
//! Each window is reduced to the mean and population variance of every
//! sensor axis. The resulting 18 values form the classifier's input schema,
//! so the slot order below must never change.

use serde::{Deserialize, Serialize};

use crate::core::windowing::Window;
use crate::error::{PipelineError, Result};
use crate::source::{Axis, SensorGroup, AXES_PER_GROUP};

/// Statistics computed per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Mean,
    Variance,
}

impl Statistic {
    pub const ALL: [Statistic; 2] = [Statistic::Mean, Statistic::Variance];
}

/// Number of statistics per axis.
const STATS_PER_AXIS: usize = 2;

/// Number of sensor groups per sample.
const SENSOR_GROUPS: usize = 3;

/// Length of every feature vector.
pub const FEATURE_COUNT: usize = SENSOR_GROUPS * AXES_PER_GROUP * STATS_PER_AXIS;

/// Slot names in vector order: group, then axis, then mean before variance.
///
/// Slot `k` is written to the corpus with index `k + 1`.
pub const FEATURE_SCHEMA: [&str; FEATURE_COUNT] = [
    "linear_x_mean",
    "linear_x_var",
    "linear_y_mean",
    "linear_y_var",
    "linear_z_mean",
    "linear_z_var",
    "gravity_x_mean",
    "gravity_x_var",
    "gravity_y_mean",
    "gravity_y_var",
    "gravity_z_mean",
    "gravity_z_var",
    "gyro_x_mean",
    "gyro_x_var",
    "gyro_y_mean",
    "gyro_y_var",
    "gyro_z_mean",
    "gyro_z_var",
];

/// Zero-based slot of a (group, axis, statistic) triple.
pub const fn feature_index(group: SensorGroup, axis: Axis, stat: Statistic) -> usize {
    (group as usize * AXES_PER_GROUP + axis as usize) * STATS_PER_AXIS + stat as usize
}

/// Dense, fixed-schema summary of one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    /// Copy a slice of exactly [`FEATURE_COUNT`] values.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let array: [f64; FEATURE_COUNT] = values
            .try_into()
            .map_err(|_| PipelineError::dimension_mismatch(FEATURE_COUNT, values.len()))?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, group: SensorGroup, axis: Axis, stat: Statistic) -> f64 {
        self.0[feature_index(group, axis, stat)]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Running mean and population variance of one axis.
///
/// Uses Welford's update, which equals `mean(x^2) - mean(x)^2` exactly in
/// real arithmetic. Identical inputs leave the mean at that value and the
/// second moment at exactly zero.
#[derive(Debug, Clone, Copy, Default)]
struct AxisStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl AxisStats {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    /// Divisor `n`, not `n - 1`.
    fn population_variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// Compute the feature vector of a window.
pub fn extract(window: &Window<'_>) -> FeatureVector {
    let mut stats = [[AxisStats::default(); AXES_PER_GROUP]; SENSOR_GROUPS];

    for sample in window.samples() {
        for (g, group) in SensorGroup::ALL.iter().enumerate() {
            for (axis_stats, &value) in stats[g].iter_mut().zip(sample.group(*group)) {
                axis_stats.push(value);
            }
        }
    }

    let mut features = FeatureVector::zeros();
    for group in SensorGroup::ALL {
        for axis in Axis::ALL {
            let s = &stats[group as usize][axis.index()];
            features.0[feature_index(group, axis, Statistic::Mean)] = s.mean();
            features.0[feature_index(group, axis, Statistic::Variance)] = s.population_variance();
        }
    }
    features
}
