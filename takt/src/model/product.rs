//! Product type declarations.

use crate::model::resource::RoutingHeuristic;
use serde::{Deserialize, Serialize};

/// The required process plan of a product type. A sequence is walked in
/// order; a graph is an adjacency DAG where a step becomes ready once all
/// of its predecessors completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessPlan {
    Sequence(Vec<String>),
    Graph(Vec<(String, Vec<String>)>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductData {
    /// Doubles as the product type name.
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Required processes. A single entry naming a `ProcessModel` process
    /// expands to that process's internal graph.
    pub processes: ProcessPlan,
    /// Transport process used to move instances between locatables.
    pub transport_process: String,
    #[serde(default)]
    pub routing_heuristic: RoutingHeuristic,
    /// Dependencies carried by every instance from creation to the sink
    /// (e.g. a workpiece carrier primitive).
    #[serde(default)]
    pub dependency_ids: Vec<String>,
    /// When set, finished instances are reclassified as live primitives of
    /// the named type instead of being dropped at the sink.
    #[serde(default)]
    pub becomes_primitive: Option<String>,
}
