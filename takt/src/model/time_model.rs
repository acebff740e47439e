//! Time model declarations.
//!
//! A time model turns a sampling context (nothing, a distance, or a pair of
//! locations) into a duration. Four kinds exist: distribution functions,
//! fixed sample sets, explicit schedules, and distance/speed models.

use serde::{Deserialize, Serialize};

/// Distribution families available to [`TimeModelData::Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionFunction {
    Constant,
    Exponential,
    Normal,
    Lognormal,
}

/// Distance metrics available to [`TimeModelData::Distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Manhattan,
    Euclidean,
}

impl DistanceMetric {
    pub fn measure(&self, a: crate::model::Location, b: crate::model::Location) -> f64 {
        let dx = a[0] - b[0];
        let dy = a[1] - b[1];
        match self {
            DistanceMetric::Manhattan => dx.abs() + dy.abs(),
            DistanceMetric::Euclidean => (dx * dx + dy * dy).sqrt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimeModelData {
    /// Samples i.i.d. from a distribution with (location, scale) parameters.
    /// Draws are batched; non-positive draws are treated as zero.
    Function {
        id: String,
        #[serde(default)]
        description: String,
        distribution_function: DistributionFunction,
        location: f64,
        #[serde(default)]
        scale: f64,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
    },
    /// Uniform random pick from a fixed list of observed durations.
    Sample {
        id: String,
        #[serde(default)]
        description: String,
        samples: Vec<f64>,
    },
    /// Consumes a sorted schedule of absolute or relative times. Intended
    /// for source arrival models. A non-cyclic schedule stops producing
    /// values once exhausted.
    Scheduled {
        id: String,
        #[serde(default)]
        description: String,
        schedule: Vec<f64>,
        absolute: bool,
        #[serde(default)]
        cyclic: bool,
    },
    /// `reaction_time + dist(origin, target) / speed` under the configured
    /// metric. Zero distance returns the reaction time exactly.
    Distance {
        id: String,
        #[serde(default)]
        description: String,
        speed: f64,
        reaction_time: f64,
        #[serde(default = "default_metric")]
        metric: DistanceMetric,
    },
}

fn default_batch_size() -> usize {
    100
}

fn default_metric() -> DistanceMetric {
    DistanceMetric::Manhattan
}

impl TimeModelData {
    pub fn id(&self) -> &str {
        match self {
            TimeModelData::Function { id, .. }
            | TimeModelData::Sample { id, .. }
            | TimeModelData::Scheduled { id, .. }
            | TimeModelData::Distance { id, .. } => id,
        }
    }
}
