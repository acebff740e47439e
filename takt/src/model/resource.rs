//! Resource declarations: machines, transporters and system cells.

use crate::model::Location;
use serde::{Deserialize, Serialize};

/// Order in which a controller serves its pending requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlPolicy {
    #[default]
    #[serde(rename = "FIFO")]
    Fifo,
    #[serde(rename = "LIFO")]
    Lifo,
    /// Shortest expected processing time first.
    #[serde(rename = "SPT")]
    Spt,
    /// Shortest expected transport time (empty leg included) first.
    #[serde(rename = "SPT_transport")]
    SptTransport,
}

/// How a router picks between equally-compatible resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingHeuristic {
    #[serde(rename = "FIFO")]
    Fifo,
    #[default]
    Random,
    /// Compares `live + reserved_put` across candidate input queues.
    ShortestQueue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResourceData {
    /// A single machine or transporter.
    Resource {
        id: String,
        #[serde(default)]
        description: String,
        location: Location,
        #[serde(default = "default_capacity")]
        capacity: u32,
        process_ids: Vec<String>,
        #[serde(default)]
        state_ids: Vec<String>,
        #[serde(default)]
        control_policy: ControlPolicy,
        /// Ports by ID; direction comes from each port's interface type.
        /// Empty means default queues are generated at build.
        #[serde(default)]
        port_ids: Vec<String>,
        #[serde(default)]
        dependency_ids: Vec<String>,
    },
    /// A cell that presents itself as one resource externally and routes
    /// internally over named sub-resources.
    SystemResource {
        id: String,
        #[serde(default)]
        description: String,
        location: Location,
        #[serde(default = "default_capacity")]
        capacity: u32,
        process_ids: Vec<String>,
        #[serde(default)]
        state_ids: Vec<String>,
        #[serde(default)]
        control_policy: ControlPolicy,
        #[serde(default)]
        port_ids: Vec<String>,
        #[serde(default)]
        dependency_ids: Vec<String>,
        subresource_ids: Vec<String>,
        /// `hop -> next hops`, from input ports over sub-resources to
        /// output ports. Empty means sub-resources chain in declaration
        /// order.
        #[serde(default)]
        internal_routing: Vec<(String, Vec<String>)>,
    },
}

fn default_capacity() -> u32 {
    1
}

impl ResourceData {
    pub fn id(&self) -> &str {
        match self {
            ResourceData::Resource { id, .. } | ResourceData::SystemResource { id, .. } => id,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            ResourceData::Resource { location, .. }
            | ResourceData::SystemResource { location, .. } => *location,
        }
    }

    pub fn capacity(&self) -> u32 {
        match self {
            ResourceData::Resource { capacity, .. }
            | ResourceData::SystemResource { capacity, .. } => *capacity,
        }
    }

    pub fn process_ids(&self) -> &[String] {
        match self {
            ResourceData::Resource { process_ids, .. }
            | ResourceData::SystemResource { process_ids, .. } => process_ids,
        }
    }

    pub fn state_ids(&self) -> &[String] {
        match self {
            ResourceData::Resource { state_ids, .. }
            | ResourceData::SystemResource { state_ids, .. } => state_ids,
        }
    }

    pub fn port_ids(&self) -> &[String] {
        match self {
            ResourceData::Resource { port_ids, .. }
            | ResourceData::SystemResource { port_ids, .. } => port_ids,
        }
    }

    pub fn dependency_ids(&self) -> &[String] {
        match self {
            ResourceData::Resource { dependency_ids, .. }
            | ResourceData::SystemResource { dependency_ids, .. } => dependency_ids,
        }
    }

    pub fn control_policy(&self) -> ControlPolicy {
        match self {
            ResourceData::Resource { control_policy, .. }
            | ResourceData::SystemResource { control_policy, .. } => *control_policy,
        }
    }
}
