//! Source, sink, order and schedule declarations.

use crate::model::Location;
use crate::model::resource::RoutingHeuristic;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceData {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
    pub product_type: String,
    /// Arrival time model. Ignored when `order_ids` is non-empty; orders
    /// then drive the release stream.
    #[serde(default)]
    pub time_model_id: Option<String>,
    #[serde(default)]
    pub routing_heuristic: RoutingHeuristic,
    /// Empty means a default infinite output queue is generated at build.
    #[serde(default)]
    pub output_queue_ids: Vec<String>,
    /// Orders consumed by this source instead of arrival sampling.
    #[serde(default)]
    pub order_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkData {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
    pub product_type: String,
    /// Empty means a default infinite input queue is generated at build.
    #[serde(default)]
    pub input_queue_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedProductData {
    pub product_type: String,
    pub quantity: u32,
}

/// An ordered release of product types. The owning order source emits the
/// ordered quantities at `release_time`; colliding release times are served
/// higher priority first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub ordered_products: Vec<OrderedProductData>,
    pub order_time: f64,
    #[serde(default)]
    pub release_time: Option<f64>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    1
}

/// A pre-scheduled start-state event that overrides arrival sampling: the
/// product appears at `time` directly at the named resource and the engine
/// produces exactly one matching `start state` record at that time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntryData {
    pub time: f64,
    pub resource: String,
    pub process: String,
    pub product: String,
    #[serde(default)]
    pub expected_end_time: Option<f64>,
}
