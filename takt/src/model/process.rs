//! Process declarations.
//!
//! Processes are what products require and resources offer. Matching is
//! structural: production processes match by ID, capability processes by
//! capability string, link transports by capability against required
//! capabilities. `ProcessModel` carries an adjacency DAG over contained
//! processes and is only meaningful as a product's plan.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessData {
    /// A concrete machining/assembly step, matched by ID.
    Production {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        /// Probability that a completed run requires rework.
        #[serde(default)]
        failure_rate: f64,
    },
    /// An offered ability, matched against requirements by capability string.
    Capability {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        capability: String,
        #[serde(default)]
        failure_rate: f64,
    },
    /// A demand for a capability; never offered, only required.
    RequiredCapability {
        id: String,
        #[serde(default)]
        description: String,
        capability: String,
    },
    /// Free transport between any two locatables.
    Transport {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        #[serde(default)]
        loading_time_model_id: Option<String>,
        #[serde(default)]
        unloading_time_model_id: Option<String>,
    },
    /// Transport constrained to a directed link graph; routes come from the
    /// path finder. An empty capability matches only empty requirements.
    LinkTransport {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        /// Directed edges as `[from_id, to_id]` pairs over locatables.
        links: Vec<[String; 2]>,
        #[serde(default)]
        capability: String,
        #[serde(default)]
        loading_time_model_id: Option<String>,
        #[serde(default)]
        unloading_time_model_id: Option<String>,
    },
    /// Repairs failed runs of the listed processes. Blocking rework re-runs
    /// the failed step afterwards; non-blocking lets the product continue.
    Rework {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
        reworked_process_ids: Vec<String>,
        blocking: bool,
    },
    /// A bag of alternative processes; offering it offers all members,
    /// requiring it is satisfied by any member.
    Compound {
        id: String,
        #[serde(default)]
        description: String,
        process_ids: Vec<String>,
    },
    /// An adjacency DAG over contained processes, used as a product plan.
    ProcessModel {
        id: String,
        #[serde(default)]
        description: String,
        /// `(process_id, successors)` adjacency, in declaration order.
        process_graph: Vec<(String, Vec<String>)>,
    },
    /// A scoped (un)loading step attached to a main service via a loading
    /// dependency.
    Loading {
        id: String,
        #[serde(default)]
        description: String,
        time_model_id: String,
    },
}

impl ProcessData {
    pub fn id(&self) -> &str {
        match self {
            ProcessData::Production { id, .. }
            | ProcessData::Capability { id, .. }
            | ProcessData::RequiredCapability { id, .. }
            | ProcessData::Transport { id, .. }
            | ProcessData::LinkTransport { id, .. }
            | ProcessData::Rework { id, .. }
            | ProcessData::Compound { id, .. }
            | ProcessData::ProcessModel { id, .. }
            | ProcessData::Loading { id, .. } => id,
        }
    }

    pub fn time_model_id(&self) -> Option<&str> {
        match self {
            ProcessData::Production { time_model_id, .. }
            | ProcessData::Capability { time_model_id, .. }
            | ProcessData::Transport { time_model_id, .. }
            | ProcessData::LinkTransport { time_model_id, .. }
            | ProcessData::Rework { time_model_id, .. }
            | ProcessData::Loading { time_model_id, .. } => Some(time_model_id),
            ProcessData::RequiredCapability { .. }
            | ProcessData::Compound { .. }
            | ProcessData::ProcessModel { .. } => None,
        }
    }

    /// Whether a resource offering this process acts as a transporter.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProcessData::Transport { .. } | ProcessData::LinkTransport { .. }
        )
    }
}
