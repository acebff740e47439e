//! # Takt
//!
//! A discrete event simulation engine for discrete manufacturing and
//! logistics networks.
//!
//! A production system is modeled as a graph of resources (machines,
//! transporters, system cells), products flowing through required process
//! sequences, sources that inject products, sinks that absorb them,
//! queues and stores that hold work-in-process, primitives (pallets,
//! carriers, tools) acting as consumable or reusable dependencies, and time
//! models that govern every duration. Running the simulation advances
//! virtual time, dispatches work to resources, routes products between
//! locations under capacity and dependency constraints, and emits an event
//! log from which throughput, WIP, cycle time, utilization and OEE are
//! derived.
//!
//! ## Concepts
//!
//! ### The event loop
//!
//! Execution is single-threaded and cooperative: every entity — source
//! loops, per-resource controllers, the per-product router, dependency
//! acquisition — is a continuation scheduled onto one event queue.
//! Wake-ups fire in non-decreasing simulated time, ties broken by
//! insertion order, which makes runs deterministic: identical models and
//! seeds replay identical event logs.
//!
//! ### Queues and reservations
//!
//! Queues implement a put–get protocol with reservations: the router
//! reserves destination space *before* dispatching a transport, and a
//! transporter reserves its cargo before traveling to pick it up. A
//! request that cannot reserve both of its endpoints never starts, which
//! is what prevents the classic ring deadlock between fully-coupled small
//! queues.
//!
//! ### Controllers and dependencies
//!
//! Each resource is served by a controller that reorders pending requests
//! under its control policy (FIFO, LIFO, SPT) and drives the resource's
//! state machine: setup transitions, the productive phase, breakdowns,
//! shift calendars and battery charging. Before a request turns
//! productive, its dependencies are acquired in one fixed global order —
//! primitive, resource, process, loading, lot — so controllers cannot
//! deadlock on each other.
//!
//! ### Matching and routing
//!
//! Compatibility between required and offered processes is precomputed
//! once into signature-keyed tables (production by process ID, capability
//! processes by capability string, link transports by canonical link
//! topology). The router walks each product's process plan and turns every
//! step into a transport request plus a production request with O(1)
//! candidate lookups.
//!
//! ## Quick-start
//!
//! ```
//! use takt::model::*;
//! use takt::model::time_model::DistributionFunction;
//! use takt::model::product::ProcessPlan;
//! use takt::{Simulation, seconds};
//!
//! let system = ProductionSystem {
//!     time_model_data: vec![
//!         TimeModelData::Function {
//!             id: "work".into(),
//!             description: String::new(),
//!             distribution_function: DistributionFunction::Constant,
//!             location: 0.8,
//!             scale: 0.0,
//!             batch_size: 100,
//!         },
//!         TimeModelData::Function {
//!             id: "arrivals".into(),
//!             description: String::new(),
//!             distribution_function: DistributionFunction::Exponential,
//!             location: 1.0,
//!             scale: 0.0,
//!             batch_size: 100,
//!         },
//!         TimeModelData::Distance {
//!             id: "move".into(),
//!             description: String::new(),
//!             speed: 1.0,
//!             reaction_time: 0.0,
//!             metric: takt::model::time_model::DistanceMetric::Manhattan,
//!         },
//!     ],
//!     process_data: vec![
//!         ProcessData::Production {
//!             id: "drill".into(),
//!             description: String::new(),
//!             time_model_id: "work".into(),
//!             failure_rate: 0.0,
//!         },
//!         ProcessData::Transport {
//!             id: "haul".into(),
//!             description: String::new(),
//!             time_model_id: "move".into(),
//!             loading_time_model_id: None,
//!             unloading_time_model_id: None,
//!         },
//!     ],
//!     resource_data: vec![
//!         ResourceData::Resource {
//!             id: "machine".into(),
//!             description: String::new(),
//!             location: [5.0, 0.0],
//!             capacity: 1,
//!             process_ids: vec!["drill".into()],
//!             state_ids: vec![],
//!             control_policy: ControlPolicy::Fifo,
//!             port_ids: vec![],
//!             dependency_ids: vec![],
//!         },
//!         ResourceData::Resource {
//!             id: "agv".into(),
//!             description: String::new(),
//!             location: [0.0, 0.0],
//!             capacity: 1,
//!             process_ids: vec!["haul".into()],
//!             state_ids: vec![],
//!             control_policy: ControlPolicy::Fifo,
//!             port_ids: vec![],
//!             dependency_ids: vec![],
//!         },
//!     ],
//!     product_data: vec![ProductData {
//!         id: "part".into(),
//!         description: String::new(),
//!         processes: ProcessPlan::Sequence(vec!["drill".into()]),
//!         transport_process: "haul".into(),
//!         routing_heuristic: RoutingHeuristic::Fifo,
//!         dependency_ids: vec![],
//!         becomes_primitive: None,
//!     }],
//!     source_data: vec![SourceData {
//!         id: "inlet".into(),
//!         description: String::new(),
//!         location: [0.0, 0.0],
//!         product_type: "part".into(),
//!         time_model_id: Some("arrivals".into()),
//!         routing_heuristic: RoutingHeuristic::Fifo,
//!         output_queue_ids: vec![],
//!         order_ids: vec![],
//!     }],
//!     sink_data: vec![SinkData {
//!         id: "outlet".into(),
//!         description: String::new(),
//!         location: [10.0, 0.0],
//!         product_type: "part".into(),
//!         input_queue_ids: vec![],
//!     }],
//!     seed: 0,
//!     ..Default::default()
//! };
//!
//! let mut sim = Simulation::new(&system)?;
//! sim.run_until(seconds(100.0))?;
//! let summary = sim.summary();
//! assert!(summary.finished > 0);
//! # Ok::<(), takt::Error>(())
//! ```
//!
//! ## Error policy
//!
//! Validation findings surface before any event fires. Per-product faults
//! (no compatible resource, no route) are logged against the product and
//! the run continues. Engine-wide faults (deadlock, unsatisfiable
//! dependency) terminate the run; the event log up to that point stays
//! readable.

pub mod kpi;
pub mod model;
pub(crate) mod sim;

pub use anyhow::{Context, Error, Result, anyhow, bail};
pub use hifitime::Duration;

pub use kpi::{ProductTypeKpi, ResourceKpi, RunSummary};
pub use model::ProductionSystem;
pub use sim::log::{Activity, EventLog, EventRecord, StateType};
pub use sim::{SimulationError, ValidationFailure, seconds};

use sim::engine::World;

/// One simulation run: validates and builds the model, then advances the
/// event loop on demand.
#[derive(Debug)]
pub struct Simulation {
    world: World,
}

impl Simulation {
    /// Validates the model, resolves all references, precomputes the
    /// process matcher, and seeds initial stock. No event has fired yet
    /// when this returns.
    pub fn new(system: &ProductionSystem) -> Result<Self> {
        let world = World::build(system)?;
        Ok(Simulation { world })
    }

    /// Advances the event loop up to `deadline`. May be called repeatedly
    /// with increasing deadlines.
    pub fn run_until(&mut self, deadline: Duration) -> Result<()> {
        self.world.run_until(deadline)?;
        Ok(())
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.world.clock.now()
    }

    /// The append-only event log in event order.
    pub fn event_log(&self) -> &[EventRecord] {
        self.world.log.records()
    }

    /// Number of products currently live in the system.
    pub fn live_products(&self) -> u32 {
        self.world.live_products
    }

    /// KPI aggregates derived from the event log.
    pub fn summary(&self) -> RunSummary {
        let resources: Vec<(String, u32)> = self
            .world
            .defs
            .resources
            .iter()
            .map(|r| (r.id.clone(), r.capacity))
            .collect();
        kpi::summarize(self.event_log(), self.now().to_seconds(), &resources)
    }
}
