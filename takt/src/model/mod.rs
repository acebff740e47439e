//! The validated in-memory production system model.
//!
//! Everything the engine consumes is declared here: time models, processes,
//! states, ports, resources, products, primitives, sources, sinks, orders
//! and dependencies, all referencing each other by globally-unique string
//! IDs. The engine resolves IDs to dense indices once, at construction;
//! the model is never mutated during a run.
//!
//! The declarative serialization schema lives outside this crate; any serde
//! format that produces these types is acceptable input.

pub mod dependency;
pub mod flow;
pub mod port;
pub mod primitive;
pub mod process;
pub mod product;
pub mod resource;
pub mod state;
pub mod time_model;
pub mod validate;

use serde::{Deserialize, Serialize};

pub use dependency::DependencyData;
pub use flow::{OrderData, OrderedProductData, ScheduleEntryData, SinkData, SourceData};
pub use port::{PortData, PortInterface};
pub use primitive::PrimitiveData;
pub use process::ProcessData;
pub use product::ProductData;
pub use resource::{ControlPolicy, ResourceData, RoutingHeuristic};
pub use state::StateData;
pub use time_model::TimeModelData;
pub use validate::{ValidationError, validate};

/// A planar position. The engine only does 2D geometry; distances are
/// manhattan or euclidean per the consuming time model.
pub type Location = [f64; 2];

/// A node of the transport link graph. Pure location, no capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
}

/// The complete declarative model of one production system.
///
/// This is the only input to [`Simulation::new`](crate::Simulation::new).
/// All cross-references are by ID and are checked by [`validate`] before
/// the engine is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductionSystem {
    #[serde(default)]
    pub time_model_data: Vec<TimeModelData>,
    #[serde(default)]
    pub process_data: Vec<ProcessData>,
    #[serde(default)]
    pub state_data: Vec<StateData>,
    #[serde(default)]
    pub port_data: Vec<PortData>,
    #[serde(default)]
    pub node_data: Vec<NodeData>,
    #[serde(default)]
    pub primitive_data: Vec<PrimitiveData>,
    #[serde(default)]
    pub resource_data: Vec<ResourceData>,
    #[serde(default)]
    pub product_data: Vec<ProductData>,
    #[serde(default)]
    pub dependency_data: Vec<DependencyData>,
    #[serde(default)]
    pub source_data: Vec<SourceData>,
    #[serde(default)]
    pub sink_data: Vec<SinkData>,
    #[serde(default)]
    pub order_data: Vec<OrderData>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntryData>,
    /// Cap on the total number of live products across all types.
    #[serde(default)]
    pub conwip_number: Option<u32>,
    /// Seed for the single engine PRNG.
    #[serde(default)]
    pub seed: u64,
}
