//! Dependency declarations.
//!
//! A dependency is a precondition a request must hold before its productive
//! phase. Acquisition order across kinds is fixed (primitive, resource,
//! process, loading, lot) so that concurrent acquirers cannot deadlock.

use serde::{Deserialize, Serialize};

/// When a loading process runs relative to the main service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPhase {
    #[default]
    Before,
    After,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DependencyData {
    /// A primitive instance of the required type must be fetched from a
    /// store and held for the duration of the request.
    Primitive {
        id: String,
        #[serde(default)]
        description: String,
        required_primitive: String,
    },
    /// Another resource must be co-locked (e.g. a worker at a station).
    /// With `per_lot`, one holder covers the whole lot.
    Resource {
        id: String,
        #[serde(default)]
        description: String,
        required_resource: String,
        #[serde(default)]
        per_lot: bool,
    },
    /// The named process must already have completed on the same product.
    Process {
        id: String,
        #[serde(default)]
        description: String,
        required_process: String,
    },
    /// A scoped loading process runs before or after the main service.
    /// Chained loadings across consecutive requests of the same family on
    /// the same resource elide the repeated duration.
    Loading {
        id: String,
        #[serde(default)]
        description: String,
        loading_process: String,
        #[serde(default)]
        phase: LoadingPhase,
        #[serde(default)]
        can_be_chained: bool,
    },
    /// Groups sibling requests on the same resource, process and route into
    /// a batch that starts and ends together.
    Lot {
        id: String,
        #[serde(default)]
        description: String,
        min_lot_size: u32,
        max_lot_size: u32,
    },
}

impl DependencyData {
    pub fn id(&self) -> &str {
        match self {
            DependencyData::Primitive { id, .. }
            | DependencyData::Resource { id, .. }
            | DependencyData::Process { id, .. }
            | DependencyData::Loading { id, .. }
            | DependencyData::Lot { id, .. } => id,
        }
    }
}
