//! Queue and store declarations.
//!
//! A port is a bounded container of product or primitive tokens. Queues
//! belong to a resource, source or sink; stores additionally carry an
//! absolute location and stand alone as independent locatables.

use crate::model::Location;
use serde::{Deserialize, Serialize};

/// Which direction of a resource a port serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortInterface {
    Input,
    Output,
    InputOutput,
}

impl PortInterface {
    pub fn accepts_input(&self) -> bool {
        matches!(self, PortInterface::Input | PortInterface::InputOutput)
    }

    pub fn accepts_output(&self) -> bool {
        matches!(self, PortInterface::Output | PortInterface::InputOutput)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortData {
    Queue {
        id: String,
        #[serde(default)]
        description: String,
        /// 0 means infinite.
        #[serde(default)]
        capacity: u32,
        #[serde(default)]
        location: Option<Location>,
        #[serde(default = "default_interface")]
        interface_type: PortInterface,
    },
    /// A queue with an absolute location, usable as a free-standing
    /// locatable (primitive storage, in-transit buffer). `port_locations`
    /// are optional pickup/dropoff points used for distance calculations.
    Store {
        id: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        capacity: u32,
        location: Location,
        #[serde(default)]
        port_locations: Option<Vec<Location>>,
        #[serde(default = "default_interface")]
        interface_type: PortInterface,
    },
}

fn default_interface() -> PortInterface {
    PortInterface::InputOutput
}

impl PortData {
    pub fn id(&self) -> &str {
        match self {
            PortData::Queue { id, .. } | PortData::Store { id, .. } => id,
        }
    }

    pub fn capacity(&self) -> u32 {
        match self {
            PortData::Queue { capacity, .. } | PortData::Store { capacity, .. } => *capacity,
        }
    }

    pub fn interface(&self) -> PortInterface {
        match self {
            PortData::Queue { interface_type, .. } | PortData::Store { interface_type, .. } => {
                *interface_type
            }
        }
    }

    pub fn declared_location(&self) -> Option<Location> {
        match self {
            PortData::Queue { location, .. } => *location,
            PortData::Store {
                location,
                port_locations,
                ..
            } => Some(
                port_locations
                    .as_ref()
                    .and_then(|p| p.first().copied())
                    .unwrap_or(*location),
            ),
        }
    }

    pub fn is_store(&self) -> bool {
        matches!(self, PortData::Store { .. })
    }
}
