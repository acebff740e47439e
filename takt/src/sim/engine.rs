//! The world: arena-owned runtime state plus the built, index-resolved
//! model. All entities refer to each other through dense indices; the
//! engine hands out `&mut World` to the subsystem modules, which extend it
//! with `impl` blocks.

use crate::model::dependency::LoadingPhase;
use crate::model::port::PortInterface;
use crate::model::product::ProcessPlan;
use crate::model::resource::{ControlPolicy, RoutingHeuristic};
use crate::model::{DependencyData, Location, ProcessData, ProductionSystem, StateData};
use crate::sim::clock::{Clock, Wake};
use crate::sim::log::{EventLog, EventRecord};
use crate::sim::matcher::Matcher;
use crate::sim::queue::QueueRt;
use crate::sim::request::Request;
use crate::sim::rng::EngineRng;
use crate::sim::time_model::{SamplerRt, TimeContext};
use crate::sim::{
    DepIx, ExecId, Locatable, NodeIx, PortIx, PrimTypeIx, PrimitiveId, ProcIx, ProdTypeIx,
    ProductId, RequestId, ResIx, SimulationError, SinkIx, SrcIx, StateIx, TmIx, Token,
    ValidationFailure,
};
use ahash::AHashMap;
use hifitime::Duration;
use slab::Slab;
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Built definitions
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum ProcessKind {
    Production {
        time_model: TmIx,
    },
    Capability {
        time_model: TmIx,
        capability: String,
    },
    RequiredCapability {
        capability: String,
    },
    Transport {
        time_model: TmIx,
        loading: Option<TmIx>,
        unloading: Option<TmIx>,
    },
    LinkTransport {
        time_model: TmIx,
        links: Vec<(Locatable, Locatable)>,
        capability: String,
        loading: Option<TmIx>,
        unloading: Option<TmIx>,
    },
    Rework {
        time_model: TmIx,
        reworked: Vec<ProcIx>,
        blocking: bool,
    },
    Compound {
        members: Vec<ProcIx>,
    },
    ProcessModel {
        graph: Vec<(ProcIx, Vec<ProcIx>)>,
    },
    Loading {
        time_model: TmIx,
    },
}

#[derive(Debug)]
pub(crate) struct ProcessDef {
    pub id: String,
    pub kind: ProcessKind,
    pub failure_rate: f64,
}

impl ProcessDef {
    pub fn time_model(&self) -> Option<TmIx> {
        match &self.kind {
            ProcessKind::Production { time_model }
            | ProcessKind::Capability { time_model, .. }
            | ProcessKind::Transport { time_model, .. }
            | ProcessKind::LinkTransport { time_model, .. }
            | ProcessKind::Rework { time_model, .. }
            | ProcessKind::Loading { time_model } => Some(*time_model),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind,
            ProcessKind::Transport { .. } | ProcessKind::LinkTransport { .. }
        )
    }

    pub fn loading_models(&self) -> (Option<TmIx>, Option<TmIx>) {
        match &self.kind {
            ProcessKind::Transport {
                loading, unloading, ..
            }
            | ProcessKind::LinkTransport {
                loading, unloading, ..
            } => (*loading, *unloading),
            _ => (None, None),
        }
    }
}

#[derive(Debug)]
pub(crate) enum StateKind {
    BreakDown {
        interval: TmIx,
        repair: TmIx,
    },
    ProcessBreakDown {
        interval: TmIx,
        repair: TmIx,
        process: ProcIx,
    },
    Setup {
        duration: TmIx,
        origin: ProcIx,
        target: ProcIx,
    },
    NonScheduled {
        on_window: TmIx,
        off_window: TmIx,
    },
    Charging {
        duration: TmIx,
        battery_capacity: f64,
        threshold: f64,
    },
}

#[derive(Debug)]
pub(crate) struct StateDef {
    pub id: String,
    pub kind: StateKind,
}

#[derive(Debug)]
pub(crate) struct PortDef {
    pub id: String,
    pub capacity: Option<u32>,
    pub location: Option<Location>,
    pub interface: PortInterface,
    pub is_store: bool,
    /// Filled after owners claim their ports.
    pub owner: Option<Locatable>,
}

#[derive(Debug)]
pub(crate) struct ResourceDef {
    pub id: String,
    pub location: Location,
    pub capacity: u32,
    pub processes: Vec<ProcIx>,
    pub states: Vec<StateIx>,
    pub policy: ControlPolicy,
    pub input_ports: Vec<PortIx>,
    pub output_ports: Vec<PortIx>,
    /// Hidden infinite staging area for fetched primitives.
    pub buffer: PortIx,
    pub dependencies: Vec<DepIx>,
    /// Sub-resources in internal routing order; empty for leaf resources.
    pub subresources: Vec<ResIx>,
    pub is_transport: bool,
}

#[derive(Debug)]
pub(crate) struct PlanDef {
    pub steps: Vec<ProcIx>,
    /// Plan-node indices that must complete before each step.
    pub preds: Vec<Vec<usize>>,
}

#[derive(Debug)]
pub(crate) struct ProductTypeDef {
    pub id: String,
    pub plan: PlanDef,
    pub transport: ProcIx,
    pub dependencies: Vec<DepIx>,
    pub becomes_primitive: Option<PrimTypeIx>,
    pub heuristic: RoutingHeuristic,
}

#[derive(Debug)]
pub(crate) struct PrimitiveTypeDef {
    pub id: String,
    pub transport: ProcIx,
    pub storages: Vec<PortIx>,
    pub initial: Vec<u32>,
    pub consumable: bool,
}

#[derive(Debug)]
pub(crate) enum DepKind {
    Primitive { ty: PrimTypeIx },
    Resource { resource: ResIx, per_lot: bool },
    Process { process: ProcIx },
    Loading {
        process: ProcIx,
        phase: LoadingPhase,
        chained: bool,
    },
    Lot { min: u32, max: u32 },
}

#[derive(Debug)]
pub(crate) struct DepDef {
    pub id: String,
    pub kind: DepKind,
}

#[derive(Debug)]
pub(crate) struct SourceDef {
    pub id: String,
    pub location: Location,
    pub product_type: ProdTypeIx,
    pub time_model: Option<TmIx>,
    pub heuristic: RoutingHeuristic,
    pub output_ports: Vec<PortIx>,
    /// Indices into `Defs::orders`, release order.
    pub orders: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct SinkDef {
    pub id: String,
    pub location: Location,
    pub product_type: ProdTypeIx,
    pub input_ports: Vec<PortIx>,
}

#[derive(Debug)]
pub(crate) struct OrderDef {
    pub id: String,
    pub items: Vec<(ProdTypeIx, u32)>,
    pub release_time: f64,
    pub priority: i32,
}

#[derive(Debug)]
pub(crate) struct NodeDef {
    pub id: String,
    pub location: Location,
}

#[derive(Debug)]
pub(crate) struct ScheduleDef {
    pub time: f64,
    pub resource: ResIx,
    pub process: ProcIx,
    pub product_type: ProdTypeIx,
    pub expected_end: Option<f64>,
}

#[derive(Debug, Default)]
pub(crate) struct Defs {
    pub time_models: Vec<crate::model::TimeModelData>,
    pub processes: Vec<ProcessDef>,
    pub states: Vec<StateDef>,
    pub ports: Vec<PortDef>,
    pub nodes: Vec<NodeDef>,
    pub resources: Vec<ResourceDef>,
    pub product_types: Vec<ProductTypeDef>,
    pub primitive_types: Vec<PrimitiveTypeDef>,
    pub dependencies: Vec<DepDef>,
    pub sources: Vec<SourceDef>,
    pub sinks: Vec<SinkDef>,
    pub orders: Vec<OrderDef>,
    pub schedule: Vec<ScheduleDef>,
    pub conwip: Option<u32>,
}

impl Defs {
    pub fn location_of(&self, locatable: Locatable) -> Location {
        match locatable {
            Locatable::Port(p) => self.port_location(p),
            Locatable::Resource(r) => self.resources[r.0].location,
            Locatable::Source(s) => self.sources[s.0].location,
            Locatable::Sink(s) => self.sinks[s.0].location,
            Locatable::Node(n) => self.nodes[n.0].location,
        }
    }

    pub fn port_location(&self, port: PortIx) -> Location {
        let def = &self.ports[port.0];
        if let Some(location) = def.location {
            return location;
        }
        match def.owner {
            Some(owner) => self.location_of(owner),
            None => [0.0, 0.0],
        }
    }

    pub fn locatable_name(&self, locatable: Locatable) -> &str {
        match locatable {
            Locatable::Port(p) => &self.ports[p.0].id,
            Locatable::Resource(r) => &self.resources[r.0].id,
            Locatable::Source(s) => &self.sources[s.0].id,
            Locatable::Sink(s) => &self.sinks[s.0].id,
            Locatable::Node(n) => &self.nodes[n.0].id,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime state
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ResourceRt {
    pub position: Locatable,
    /// Capacity units consumed by running executions.
    pub busy: u32,
    /// Capacity units consumed by co-resource locks from other requests.
    pub locked: u32,
    pub pending: Vec<RequestId>,
    pub active_execs: Vec<ExecId>,
    /// Resource-wide interrupts currently active (breakdown, shift,
    /// charging).
    pub active_interrupts: SmallVec<StateIx, 2>,
    pub process_down: SmallVec<ProcIx, 2>,
    pub current_setup: Option<ProcIx>,
    pub battery_used: f64,
    /// Continuations waiting for a co-lock or capacity on this resource.
    pub lock_waiters: Vec<Wake>,
    /// Last loading process that ran, for chain elision.
    pub last_loading: Option<ProcIx>,
}

impl ResourceRt {
    pub fn down(&self) -> bool {
        !self.active_interrupts.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct Product {
    pub name: String,
    pub ty: ProdTypeIx,
    /// The container currently holding the token.
    pub location: PortIx,
    pub done: Vec<bool>,
    /// A failed process awaiting rework routing.
    pub failed: Option<ProcIx>,
    pub reworked: bool,
    pub carried: SmallVec<PrimitiveId, 2>,
    pub created_at: Duration,
    pub active_production: Option<RequestId>,
    pub active_transport: Option<RequestId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveWhere {
    Store(PortIx),
    /// Staged in a resource's dependency buffer or held by an execution.
    Resource(ResIx),
    CarriedBy(ProductId),
    InTransit,
}

#[derive(Debug)]
pub(crate) struct Primitive {
    pub name: String,
    pub ty: PrimTypeIx,
    pub whereabouts: PrimitiveWhere,
}

#[derive(Debug, Clone)]
pub(crate) enum PhaseKind {
    Setup { state: StateIx, target: ProcIx },
    Loading { process: ProcIx, after: bool },
    Production,
    EmptyMove,
    Pickup,
    LoadedMove,
    Dropoff,
    /// A system cell walking its internal sub-steps; advanced by child
    /// completions, not by the clock.
    SystemChain { steps: Vec<(ResIx, ProcIx)>, cursor: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct Phase {
    pub kind: PhaseKind,
    pub dur: Duration,
}

#[derive(Debug)]
pub(crate) struct Execution {
    pub resource: ResIx,
    pub requests: SmallVec<RequestId, 2>,
    pub phases: VecDeque<Phase>,
    pub current: Option<Phase>,
    pub generation: u32,
    pub phase_end: Duration,
    /// Remaining service of the current phase while interrupted.
    pub remaining: Option<Duration>,
}

#[derive(Debug, Default)]
pub(crate) struct SourceRt {
    /// Product creations deferred by the ConWIP cap.
    pub backlog: VecDeque<ProdTypeIx>,
    pub waiting_conwip: bool,
    pub exhausted: bool,
}

// ---------------------------------------------------------------------------
// The world
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct World {
    pub defs: Defs,
    pub clock: Clock,
    pub rng: EngineRng,
    pub samplers: Vec<SamplerRt>,
    pub queues: Vec<QueueRt>,
    pub resources: Vec<ResourceRt>,
    pub products: Slab<Product>,
    pub primitives: Slab<Primitive>,
    pub requests: Slab<Request>,
    pub execs: Slab<Execution>,
    pub matcher: Matcher,
    pub sources: Vec<SourceRt>,
    pub log: EventLog,
    pub live_products: u32,
    pub created_counts: Vec<u64>,
    pub primitive_counts: Vec<u64>,
    /// A terminal fault; the run loop stops and surfaces it.
    pub fatal: Option<SimulationError>,
}

impl World {
    pub fn build(model: &ProductionSystem) -> Result<World, SimulationError> {
        let errors = crate::model::validate(model);
        if !errors.is_empty() {
            return Err(SimulationError::Validation(ValidationFailure(errors)));
        }
        let defs = build_defs(model)?;
        let samplers = defs
            .time_models
            .iter()
            .map(SamplerRt::new)
            .collect::<Vec<_>>();
        let queues = defs
            .ports
            .iter()
            .enumerate()
            .map(|(i, p)| QueueRt::new(PortIx(i), p.capacity))
            .collect::<Vec<_>>();
        let resources = defs
            .resources
            .iter()
            .enumerate()
            .map(|(i, _)| ResourceRt {
                position: Locatable::Resource(ResIx(i)),
                busy: 0,
                locked: 0,
                pending: Vec::new(),
                active_execs: Vec::new(),
                active_interrupts: SmallVec::new(),
                process_down: SmallVec::new(),
                current_setup: None,
                battery_used: 0.0,
                lock_waiters: Vec::new(),
                last_loading: None,
            })
            .collect::<Vec<_>>();
        let matcher = Matcher::build(&defs);

        let mut world = World {
            clock: Clock::default(),
            rng: EngineRng::new(model.seed),
            samplers,
            queues,
            resources,
            products: Slab::new(),
            primitives: Slab::new(),
            requests: Slab::new(),
            execs: Slab::new(),
            matcher,
            sources: defs.sources.iter().map(|_| SourceRt::default()).collect(),
            log: EventLog::default(),
            live_products: 0,
            created_counts: vec![0; defs.product_types.len()],
            primitive_counts: vec![0; defs.primitive_types.len()],
            fatal: None,
            defs,
        };

        world.seed_primitives();
        world.start_state_drivers();
        world.start_sources();
        world.arm_schedule();
        debug!(
            resources = world.defs.resources.len(),
            products = world.defs.product_types.len(),
            "world built"
        );
        Ok(world)
    }

    /// Drives the loop until `deadline`. Terminal faults abort with the log
    /// intact; reaching the deadline (or draining all work with nothing in
    /// flight) is success.
    pub fn run_until(&mut self, deadline: Duration) -> Result<(), SimulationError> {
        loop {
            if let Some(fatal) = self.fatal.take() {
                return Err(fatal);
            }
            match self.clock.pop_next(deadline) {
                Some(wake) => self.dispatch(wake),
                None => {
                    if !self.clock.has_pending() && self.live_products > 0 {
                        return Err(SimulationError::DeadlockDetected {
                            time: self.clock.now().to_seconds(),
                            live: self.live_products as usize,
                        });
                    }
                    return Ok(());
                }
            }
        }
    }

    fn dispatch(&mut self, wake: Wake) {
        trace!(?wake, t = self.clock.now().to_seconds(), "dispatch");
        match wake {
            Wake::SourceTick(src) => self.source_tick(src),
            Wake::OrderRelease { source, order } => self.order_release(source, order),
            Wake::ControllerPoll(res) => self.controller_poll(res),
            Wake::ExecAdvance { exec, generation } => self.exec_advance(exec, generation),
            Wake::BreakdownOnset { resource, state } => self.breakdown_onset(resource, state),
            Wake::BreakdownRepair { resource, state } => self.breakdown_repair(resource, state),
            Wake::ShiftToggle {
                resource,
                state,
                to_available,
            } => self.shift_toggle(resource, state, to_available),
            Wake::ChargingDone { resource, state } => self.charging_done(resource, state),
            Wake::RouterPlan(product) => self.router_plan(product),
            Wake::ScheduleFire(entry) => self.schedule_fire(entry),
            Wake::SinkTake(sink, port) => self.sink_take(sink, port),
        }
    }

    // -- shared helpers -----------------------------------------------------

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn now_seconds(&self) -> f64 {
        self.clock.now().to_seconds()
    }

    pub fn schedule_wakes(&mut self, wakes: Vec<Wake>) {
        for wake in wakes {
            self.clock.schedule_now(wake);
        }
    }

    pub fn sample(&mut self, tm: TmIx, ctx: &TimeContext) -> Option<Duration> {
        self.samplers[tm.0].sample(&mut self.rng, ctx)
    }

    pub fn expected(&self, tm: TmIx, ctx: &TimeContext) -> Duration {
        self.samplers[tm.0].expected(ctx)
    }

    pub fn location_of(&self, locatable: Locatable) -> Location {
        self.defs.location_of(locatable)
    }

    pub fn port_location(&self, port: PortIx) -> Location {
        self.defs.port_location(port)
    }

    pub fn locatable_name(&self, locatable: Locatable) -> &str {
        self.defs.locatable_name(locatable)
    }

    pub fn token_name(&self, token: Token) -> String {
        match token {
            Token::Product(p) => self.products[p.0].name.clone(),
            Token::Primitive(p) => self.primitives[p.0].name.clone(),
        }
    }

    pub fn push_record(&mut self, record: EventRecord) {
        self.log.push(record);
    }

    // -- queue wrappers that also wake waiters ------------------------------

    pub fn try_reserve_put(&mut self, port: PortIx) -> bool {
        self.queues[port.0].try_reserve_put()
    }

    pub fn release_put(&mut self, port: PortIx) {
        let wakes = self.queues[port.0].release_put();
        self.schedule_wakes(wakes);
    }

    pub fn commit_put(&mut self, port: PortIx, token: Token) {
        let wakes = self.queues[port.0].commit_put(token);
        if let Token::Product(p) = token {
            self.products[p.0].location = port;
        }
        self.schedule_wakes(wakes);
    }

    pub fn commit_get(&mut self, port: PortIx, token: Token) {
        let wakes = self.queues[port.0].commit_get(token);
        self.schedule_wakes(wakes);
    }
}

// ---------------------------------------------------------------------------
// Defs construction
// ---------------------------------------------------------------------------

struct Interner<'m> {
    time_models: AHashMap<&'m str, TmIx>,
    processes: AHashMap<&'m str, ProcIx>,
    states: AHashMap<&'m str, StateIx>,
    ports: AHashMap<String, PortIx>,
    nodes: AHashMap<&'m str, NodeIx>,
    resources: AHashMap<&'m str, ResIx>,
    products: AHashMap<&'m str, ProdTypeIx>,
    primitives: AHashMap<&'m str, PrimTypeIx>,
    dependencies: AHashMap<&'m str, DepIx>,
    sources: AHashMap<&'m str, SrcIx>,
    sinks: AHashMap<&'m str, SinkIx>,
    orders: AHashMap<&'m str, usize>,
}

fn build_defs(model: &ProductionSystem) -> Result<Defs, SimulationError> {
    let mut interner = Interner {
        time_models: model
            .time_model_data
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id(), TmIx(i)))
            .collect(),
        processes: model
            .process_data
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id(), ProcIx(i)))
            .collect(),
        states: model
            .state_data
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id(), StateIx(i)))
            .collect(),
        ports: model
            .port_data
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id().to_owned(), PortIx(i)))
            .collect(),
        nodes: model
            .node_data
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), NodeIx(i)))
            .collect(),
        resources: model
            .resource_data
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id(), ResIx(i)))
            .collect(),
        products: model
            .product_data
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), ProdTypeIx(i)))
            .collect(),
        primitives: model
            .primitive_data
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), PrimTypeIx(i)))
            .collect(),
        dependencies: model
            .dependency_data
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id(), DepIx(i)))
            .collect(),
        sources: model
            .source_data
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), SrcIx(i)))
            .collect(),
        sinks: model
            .sink_data
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), SinkIx(i)))
            .collect(),
        orders: model
            .order_data
            .iter()
            .enumerate()
            .map(|(i, o)| (o.id.as_str(), i))
            .collect(),
    };

    let mut defs = Defs {
        time_models: model.time_model_data.clone(),
        conwip: model.conwip_number,
        ..Default::default()
    };

    for process in &model.process_data {
        let tm = |id: &str| interner.time_models[id];
        let pr = |id: &str| interner.processes[id];
        let kind = match process {
            ProcessData::Production { time_model_id, .. } => ProcessKind::Production {
                time_model: tm(time_model_id),
            },
            ProcessData::Capability {
                time_model_id,
                capability,
                ..
            } => ProcessKind::Capability {
                time_model: tm(time_model_id),
                capability: capability.clone(),
            },
            ProcessData::RequiredCapability { capability, .. } => ProcessKind::RequiredCapability {
                capability: capability.clone(),
            },
            ProcessData::Transport {
                time_model_id,
                loading_time_model_id,
                unloading_time_model_id,
                ..
            } => ProcessKind::Transport {
                time_model: tm(time_model_id),
                loading: loading_time_model_id.as_deref().map(tm),
                unloading: unloading_time_model_id.as_deref().map(tm),
            },
            ProcessData::LinkTransport {
                time_model_id,
                links,
                capability,
                loading_time_model_id,
                unloading_time_model_id,
                ..
            } => ProcessKind::LinkTransport {
                time_model: tm(time_model_id),
                links: links
                    .iter()
                    .filter_map(|[from, to]| {
                        Some((resolve_locatable(&interner, from)?, resolve_locatable(&interner, to)?))
                    })
                    .collect(),
                capability: capability.clone(),
                loading: loading_time_model_id.as_deref().map(tm),
                unloading: unloading_time_model_id.as_deref().map(tm),
            },
            ProcessData::Rework {
                time_model_id,
                reworked_process_ids,
                blocking,
                ..
            } => ProcessKind::Rework {
                time_model: tm(time_model_id),
                reworked: reworked_process_ids.iter().map(|p| pr(p)).collect(),
                blocking: *blocking,
            },
            ProcessData::Compound { process_ids, .. } => ProcessKind::Compound {
                members: process_ids.iter().map(|p| pr(p)).collect(),
            },
            ProcessData::ProcessModel { process_graph, .. } => ProcessKind::ProcessModel {
                graph: process_graph
                    .iter()
                    .map(|(p, next)| (pr(p), next.iter().map(|n| pr(n)).collect()))
                    .collect(),
            },
            ProcessData::Loading { time_model_id, .. } => ProcessKind::Loading {
                time_model: tm(time_model_id),
            },
        };
        let failure_rate = match process {
            ProcessData::Production { failure_rate, .. }
            | ProcessData::Capability { failure_rate, .. } => *failure_rate,
            _ => 0.0,
        };
        defs.processes.push(ProcessDef {
            id: process.id().to_owned(),
            kind,
            failure_rate,
        });
    }

    for state in &model.state_data {
        let tm = |id: &str| interner.time_models[id];
        let kind = match state {
            StateData::BreakDown {
                time_model_id,
                repair_time_model_id,
                ..
            } => StateKind::BreakDown {
                interval: tm(time_model_id),
                repair: tm(repair_time_model_id),
            },
            StateData::ProcessBreakDown {
                time_model_id,
                repair_time_model_id,
                process_id,
                ..
            } => StateKind::ProcessBreakDown {
                interval: tm(time_model_id),
                repair: tm(repair_time_model_id),
                process: interner.processes[process_id.as_str()],
            },
            StateData::Setup {
                time_model_id,
                origin_setup,
                target_setup,
                ..
            } => StateKind::Setup {
                duration: tm(time_model_id),
                origin: interner.processes[origin_setup.as_str()],
                target: interner.processes[target_setup.as_str()],
            },
            StateData::NonScheduled {
                time_model_id,
                non_scheduled_time_model_id,
                ..
            } => StateKind::NonScheduled {
                on_window: tm(time_model_id),
                off_window: tm(non_scheduled_time_model_id),
            },
            StateData::Charging {
                time_model_id,
                battery_capacity,
                threshold,
                ..
            } => StateKind::Charging {
                duration: tm(time_model_id),
                battery_capacity: *battery_capacity,
                threshold: *threshold,
            },
        };
        defs.states.push(StateDef {
            id: state.id().to_owned(),
            kind,
        });
    }

    for port in &model.port_data {
        defs.ports.push(PortDef {
            id: port.id().to_owned(),
            capacity: match port.capacity() {
                0 => None,
                n => Some(n),
            },
            location: port.declared_location(),
            interface: port.interface(),
            is_store: port.is_store(),
            owner: None,
        });
    }

    for node in &model.node_data {
        defs.nodes.push(NodeDef {
            id: node.id.clone(),
            location: node.location,
        });
    }

    // Resources come before products/sources so default ports exist for
    // owner assignment; generated ports are appended to the same table.
    for (i, resource) in model.resource_data.iter().enumerate() {
        let rix = ResIx(i);
        let processes: Vec<ProcIx> = resource
            .process_ids()
            .iter()
            .map(|p| interner.processes[p.as_str()])
            .collect();
        let is_transport = processes
            .iter()
            .any(|p| defs.processes[p.0].is_transport());

        let mut input_ports = Vec::new();
        let mut output_ports = Vec::new();
        for pid in resource.port_ids() {
            let pix = interner.ports[pid.as_str()];
            defs.ports[pix.0].owner.get_or_insert(Locatable::Resource(rix));
            if defs.ports[pix.0].interface.accepts_input() {
                input_ports.push(pix);
            }
            if defs.ports[pix.0].interface.accepts_output() {
                output_ports.push(pix);
            }
        }
        if !is_transport && input_ports.is_empty() {
            input_ports.push(add_port(
                &mut defs,
                &mut interner.ports,
                format!("{}_input", resource.id()),
                Locatable::Resource(rix),
                PortInterface::Input,
            ));
        }
        if !is_transport && output_ports.is_empty() {
            output_ports.push(add_port(
                &mut defs,
                &mut interner.ports,
                format!("{}_output", resource.id()),
                Locatable::Resource(rix),
                PortInterface::Output,
            ));
        }
        let buffer = add_port(
            &mut defs,
            &mut interner.ports,
            format!("{}_staging", resource.id()),
            Locatable::Resource(rix),
            PortInterface::InputOutput,
        );

        let subresources = match resource {
            crate::model::ResourceData::SystemResource {
                subresource_ids,
                internal_routing,
                ..
            } => {
                // The routing map orders the hops; fall back to declaration
                // order when absent.
                if internal_routing.is_empty() {
                    subresource_ids
                        .iter()
                        .map(|s| interner.resources[s.as_str()])
                        .collect()
                } else {
                    let mut ordered = Vec::new();
                    for (hop, _) in internal_routing {
                        if let Some(r) = interner.resources.get(hop.as_str())
                            && !ordered.contains(r)
                        {
                            ordered.push(*r);
                        }
                    }
                    for (_, nexts) in internal_routing {
                        for hop in nexts {
                            if let Some(r) = interner.resources.get(hop.as_str())
                                && !ordered.contains(r)
                            {
                                ordered.push(*r);
                            }
                        }
                    }
                    ordered
                }
            }
            _ => Vec::new(),
        };

        defs.resources.push(ResourceDef {
            id: resource.id().to_owned(),
            location: resource.location(),
            capacity: resource.capacity().max(1),
            processes,
            states: resource
                .state_ids()
                .iter()
                .map(|s| interner.states[s.as_str()])
                .collect(),
            policy: resource.control_policy(),
            input_ports,
            output_ports,
            buffer,
            dependencies: resource
                .dependency_ids()
                .iter()
                .map(|d| interner.dependencies[d.as_str()])
                .collect(),
            subresources,
            is_transport,
        });
    }

    for primitive in &model.primitive_data {
        defs.primitive_types.push(PrimitiveTypeDef {
            id: primitive.id.clone(),
            transport: interner.processes[primitive.transport_process.as_str()],
            storages: primitive
                .storages
                .iter()
                .map(|s| interner.ports[s.as_str()])
                .collect(),
            initial: primitive.quantity_in_storages.clone(),
            consumable: primitive.becomes_consumable,
        });
    }

    for dependency in &model.dependency_data {
        let kind = match dependency {
            DependencyData::Primitive {
                required_primitive, ..
            } => DepKind::Primitive {
                ty: interner.primitives[required_primitive.as_str()],
            },
            DependencyData::Resource {
                required_resource,
                per_lot,
                ..
            } => DepKind::Resource {
                resource: interner.resources[required_resource.as_str()],
                per_lot: *per_lot,
            },
            DependencyData::Process {
                required_process, ..
            } => DepKind::Process {
                process: interner.processes[required_process.as_str()],
            },
            DependencyData::Loading {
                loading_process,
                phase,
                can_be_chained,
                ..
            } => DepKind::Loading {
                process: interner.processes[loading_process.as_str()],
                phase: *phase,
                chained: *can_be_chained,
            },
            DependencyData::Lot {
                min_lot_size,
                max_lot_size,
                ..
            } => DepKind::Lot {
                min: (*min_lot_size).max(1),
                max: (*max_lot_size).max(*min_lot_size).max(1),
            },
        };
        defs.dependencies.push(DepDef {
            id: dependency.id().to_owned(),
            kind,
        });
    }

    // A process model offered whole by a system cell stays a single plan
    // step; otherwise the plan inlines its DAG.
    let cell_offered: ahash::AHashSet<ProcIx> = defs
        .resources
        .iter()
        .filter(|r| !r.subresources.is_empty())
        .flat_map(|r| r.processes.iter().copied())
        .collect();

    for product in &model.product_data {
        let plan = build_plan(&product.processes, &interner, &defs, &cell_offered);
        defs.product_types.push(ProductTypeDef {
            id: product.id.clone(),
            plan,
            transport: interner.processes[product.transport_process.as_str()],
            dependencies: product
                .dependency_ids
                .iter()
                .map(|d| interner.dependencies[d.as_str()])
                .collect(),
            becomes_primitive: product
                .becomes_primitive
                .as_deref()
                .map(|p| interner.primitives[p]),
            heuristic: product.routing_heuristic,
        });
    }

    for (i, source) in model.source_data.iter().enumerate() {
        let six = SrcIx(i);
        let mut output_ports: Vec<PortIx> = source
            .output_queue_ids
            .iter()
            .map(|q| interner.ports[q.as_str()])
            .collect();
        for p in &output_ports {
            defs.ports[p.0].owner.get_or_insert(Locatable::Source(six));
        }
        if output_ports.is_empty() {
            output_ports.push(add_port(
                &mut defs,
                &mut interner.ports,
                format!("{}_output", source.id),
                Locatable::Source(six),
                PortInterface::Output,
            ));
        }
        let mut orders: Vec<usize> = source
            .order_ids
            .iter()
            .map(|o| interner.orders[o.as_str()])
            .collect();
        orders.sort_by(|a, b| {
            let oa = &model.order_data[*a];
            let ob = &model.order_data[*b];
            let ta = oa.release_time.unwrap_or(oa.order_time);
            let tb = ob.release_time.unwrap_or(ob.order_time);
            ta.partial_cmp(&tb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ob.priority.cmp(&oa.priority))
                .then(a.cmp(b))
        });
        defs.sources.push(SourceDef {
            id: source.id.clone(),
            location: source.location,
            product_type: interner.products[source.product_type.as_str()],
            time_model: source
                .time_model_id
                .as_deref()
                .map(|t| interner.time_models[t]),
            heuristic: source.routing_heuristic,
            output_ports,
            orders,
        });
    }

    for (i, sink) in model.sink_data.iter().enumerate() {
        let six = SinkIx(i);
        let mut input_ports: Vec<PortIx> = sink
            .input_queue_ids
            .iter()
            .map(|q| interner.ports[q.as_str()])
            .collect();
        for p in &input_ports {
            defs.ports[p.0].owner.get_or_insert(Locatable::Sink(six));
        }
        if input_ports.is_empty() {
            input_ports.push(add_port(
                &mut defs,
                &mut interner.ports,
                format!("{}_input", sink.id),
                Locatable::Sink(six),
                PortInterface::Input,
            ));
        }
        defs.sinks.push(SinkDef {
            id: sink.id.clone(),
            location: sink.location,
            product_type: interner.products[sink.product_type.as_str()],
            input_ports,
        });
    }

    for order in &model.order_data {
        defs.orders.push(OrderDef {
            id: order.id.clone(),
            items: order
                .ordered_products
                .iter()
                .map(|op| (interner.products[op.product_type.as_str()], op.quantity))
                .collect(),
            release_time: order.release_time.unwrap_or(order.order_time),
            priority: order.priority,
        });
    }

    for entry in &model.schedule {
        defs.schedule.push(ScheduleDef {
            time: entry.time,
            resource: interner.resources[entry.resource.as_str()],
            process: interner.processes[entry.process.as_str()],
            product_type: interner.products[entry.product.as_str()],
            expected_end: entry.expected_end_time,
        });
    }

    // Store ports without an owner stand alone; declared port locations
    // take precedence over owners (already encoded in PortDef).
    Ok(defs)
}

fn resolve_locatable(interner: &Interner<'_>, id: &str) -> Option<Locatable> {
    if let Some(r) = interner.resources.get(id) {
        Some(Locatable::Resource(*r))
    } else if let Some(n) = interner.nodes.get(id) {
        Some(Locatable::Node(*n))
    } else if let Some(s) = interner.sources.get(id) {
        Some(Locatable::Source(*s))
    } else if let Some(s) = interner.sinks.get(id) {
        Some(Locatable::Sink(*s))
    } else {
        interner.ports.get(id).map(|p| Locatable::Port(*p))
    }
}

fn add_port(
    defs: &mut Defs,
    port_names: &mut AHashMap<String, PortIx>,
    id: String,
    owner: Locatable,
    interface: PortInterface,
) -> PortIx {
    let ix = PortIx(defs.ports.len());
    defs.ports.push(PortDef {
        id: id.clone(),
        capacity: None,
        location: None,
        interface,
        is_store: false,
        owner: Some(owner),
    });
    port_names.insert(id, ix);
    ix
}

/// Normalizes a product's declared plan into steps + predecessor sets,
/// expanding a single process-model reference into its internal DAG unless
/// a system cell runs the model as one unit.
fn build_plan(
    plan: &ProcessPlan,
    interner: &Interner,
    defs: &Defs,
    cell_offered: &ahash::AHashSet<ProcIx>,
) -> PlanDef {
    match plan {
        ProcessPlan::Sequence(ids) => {
            if ids.len() == 1 {
                let pix = interner.processes[ids[0].as_str()];
                if let ProcessKind::ProcessModel { graph } = &defs.processes[pix.0].kind
                    && !cell_offered.contains(&pix)
                {
                    return plan_from_graph(graph);
                }
            }
            let steps: Vec<ProcIx> = ids.iter().map(|p| interner.processes[p.as_str()]).collect();
            let preds = (0..steps.len())
                .map(|i| if i == 0 { vec![] } else { vec![i - 1] })
                .collect();
            PlanDef { steps, preds }
        }
        ProcessPlan::Graph(adjacency) => {
            let graph: Vec<(ProcIx, Vec<ProcIx>)> = adjacency
                .iter()
                .map(|(p, next)| {
                    (
                        interner.processes[p.as_str()],
                        next.iter().map(|n| interner.processes[n.as_str()]).collect(),
                    )
                })
                .collect();
            plan_from_graph(&graph)
        }
    }
}

fn plan_from_graph(graph: &[(ProcIx, Vec<ProcIx>)]) -> PlanDef {
    let steps: Vec<ProcIx> = graph.iter().map(|(p, _)| *p).collect();
    let index_of = |p: ProcIx| steps.iter().position(|s| *s == p);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, (_, successors)) in graph.iter().enumerate() {
        for succ in successors {
            if let Some(j) = index_of(*succ) {
                preds[j].push(i);
            }
        }
    }
    PlanDef { steps, preds }
}
