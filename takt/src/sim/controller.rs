//! Per-resource controllers.
//!
//! A controller serves the pending requests of one resource: it reorders
//! them under the configured control policy, acquires both queue endpoints
//! and all dependencies before anything starts, then drives the execution
//! phase chain (setup, loading, production; or the four transport legs).
//! Anything it cannot start leaves a continuation on the blocking condition
//! and is retried on the next poll.

use crate::model::dependency::LoadingPhase;
use crate::model::resource::ControlPolicy;
use crate::sim::clock::Wake;
use crate::sim::engine::{DepKind, Execution, Phase, PhaseKind, ProcessKind, StateKind, World};
use crate::sim::log::{Activity, EventRecord, StateType};
use crate::sim::request::{Request, RequestKind, TransportPurpose};
use crate::sim::time_model::TimeContext;
use crate::sim::{ExecId, Locatable, PortIx, ProcIx, RequestId, ResIx, Token};
use hifitime::Duration;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::trace;

/// Outcome of one start attempt.
enum StartOutcome {
    Started,
    /// Continuations are parked on whatever blocked the start.
    Blocked,
}

impl World {
    /// Adds a request to its controller's pending list and triggers a poll.
    pub(crate) fn enqueue_request(&mut self, request: RequestId) {
        let resource = self.requests[request.0].resource;
        self.resources[resource.0].pending.push(request);
        self.clock.schedule_now(Wake::ControllerPoll(resource));
    }

    pub(crate) fn controller_poll(&mut self, resource: ResIx) {
        if self.fatal.is_some() {
            return;
        }
        let rt = &self.resources[resource.0];
        if rt.down() {
            return;
        }
        loop {
            let rt = &self.resources[resource.0];
            let def = &self.defs.resources[resource.0];
            if rt.busy + rt.locked >= def.capacity || rt.pending.is_empty() {
                return;
            }
            let ordered = self.order_pending(resource);
            let mut started = false;
            for request in ordered {
                if !self.resources[resource.0].pending.contains(&request) {
                    continue;
                }
                if matches!(self.try_start(resource, request), StartOutcome::Started) {
                    started = true;
                    break;
                }
            }
            if !started {
                return;
            }
        }
    }

    /// Pending requests in policy order. SPT keys draw no randomness; they
    /// use the time model expectation for the concrete route.
    fn order_pending(&self, resource: ResIx) -> Vec<RequestId> {
        let rt = &self.resources[resource.0];
        let mut requests = rt.pending.clone();
        match self.defs.resources[resource.0].policy {
            ControlPolicy::Fifo => {
                requests.sort_by_key(|r| self.requests[r.0].arrival);
            }
            ControlPolicy::Lifo => {
                requests.sort_by_key(|r| std::cmp::Reverse(self.requests[r.0].arrival));
            }
            ControlPolicy::Spt | ControlPolicy::SptTransport => {
                requests.sort_by_key(|r| {
                    (
                        OrderedFloat(self.expected_service_seconds(*r)),
                        self.requests[r.0].arrival,
                    )
                });
            }
        }
        requests
    }

    pub(crate) fn expected_service_seconds(&self, request: RequestId) -> f64 {
        let req = &self.requests[request.0];
        let process = &self.defs.processes[req.process.0];
        let Some(tm) = process.time_model() else {
            return 0.0;
        };
        if req.is_transport() {
            let position = self.location_of(self.resources[req.resource.0].position);
            let origin = self.port_location(req.origin);
            let target = self.port_location(req.target);
            let empty = self.expected(tm, &TimeContext::between(position, origin));
            let loaded = self.expected(tm, &TimeContext::between(origin, target));
            (empty + loaded).to_seconds()
        } else {
            self.expected(tm, &TimeContext::default()).to_seconds()
        }
    }

    fn try_start(&mut self, resource: ResIx, request: RequestId) -> StartOutcome {
        if self.requests[request.0].is_transport() {
            self.try_start_transport(resource, request)
        } else {
            self.try_start_production(resource, request)
        }
    }

    // -- production ---------------------------------------------------------

    fn try_start_production(&mut self, resource: ResIx, request: RequestId) -> StartOutcome {
        let process = self.requests[request.0].process;
        if self.resources[resource.0].process_down.contains(&process) {
            return StartOutcome::Blocked;
        }

        // Process dependencies gate before anything is reserved.
        if !self.process_dependencies_met(request) {
            return StartOutcome::Blocked;
        }

        // Lot assembly: everything below runs per lot member.
        let lot = match self.gather_lot(resource, request) {
            Some(lot) => lot,
            None => return StartOutcome::Blocked,
        };

        // Reserve the product of every member at its origin.
        let mut reserved_tokens: SmallVec<(PortIx, Token), 2> = SmallVec::new();
        for member in &lot {
            let req = &self.requests[member.0];
            let (origin, cargo) = (req.origin, req.cargo);
            if !self.queues[origin.0].try_reserve_get(cargo) {
                for (port, token) in reserved_tokens {
                    self.queues[port.0].release_get(token);
                }
                self.queues[origin.0].wait_get(Wake::ControllerPoll(resource));
                return StartOutcome::Blocked;
            }
            reserved_tokens.push((origin, cargo));
        }

        // Reserve an output slot per member. Internal sub-requests of a
        // system cell keep the cell's staging buffer as their destination.
        let mut reserved_puts: SmallVec<PortIx, 2> = SmallVec::new();
        let output_ports = if self.requests[request.0].parent.is_some() {
            vec![self.requests[request.0].target]
        } else {
            self.defs.resources[resource.0].output_ports.clone()
        };
        for member in &lot {
            let chosen = output_ports.iter().copied().find(|p| self.try_reserve_put(*p));
            match chosen {
                Some(port) => {
                    self.requests[member.0].target = port;
                    reserved_puts.push(port);
                }
                None => {
                    for (port, token) in reserved_tokens {
                        self.queues[port.0].release_get(token);
                    }
                    for port in reserved_puts {
                        self.release_put(port);
                    }
                    for port in &output_ports {
                        self.queues[port.0].wait_put(Wake::ControllerPoll(resource));
                    }
                    return StartOutcome::Blocked;
                }
            }
        }

        // Primitive and co-resource dependencies, in the global order.
        if !self.acquire_dependencies(resource, &lot) {
            for (port, token) in reserved_tokens {
                self.queues[port.0].release_get(token);
            }
            for port in reserved_puts {
                self.release_put(port);
            }
            return StartOutcome::Blocked;
        }

        // Committed: pull every member out of its origin queue.
        for member in &lot {
            let req = &self.requests[member.0];
            let (origin, cargo) = (req.origin, req.cargo);
            self.commit_get(origin, cargo);
            if let Token::Product(p) = cargo {
                self.products[p.0].location = self.defs.resources[resource.0].buffer;
            }
            self.requests[member.0].started = true;
            self.resources[resource.0]
                .pending
                .retain(|r| r != member);
        }
        self.resources[resource.0].busy += lot.len() as u32;

        if self.defs.resources[resource.0].subresources.is_empty() {
            self.start_production_execution(resource, lot);
        } else {
            self.start_system_execution(resource, lot);
        }
        StartOutcome::Started
    }

    fn process_dependencies_met(&self, request: RequestId) -> bool {
        let req = &self.requests[request.0];
        let Token::Product(product) = req.cargo else {
            return true;
        };
        let done = &self.products[product.0];
        let ty = &self.defs.product_types[done.ty.0];
        for dep in &self.defs.resources[req.resource.0].dependencies {
            if let DepKind::Process { process } = self.defs.dependencies[dep.0].kind {
                let completed = ty
                    .plan
                    .steps
                    .iter()
                    .enumerate()
                    .any(|(i, step)| *step == process && done.done[i]);
                if !completed {
                    return false;
                }
            }
        }
        true
    }

    /// Collects the lot for a request: the request itself when no lot
    /// dependency applies, otherwise `min..=max` policy-ordered matching
    /// siblings, bounded by free capacity.
    fn gather_lot(&mut self, resource: ResIx, request: RequestId) -> Option<Vec<RequestId>> {
        let lot_dep = self.requests[request.0].lot;
        let Some(dep) = lot_dep else {
            return Some(vec![request]);
        };
        let DepKind::Lot { min, max } = self.defs.dependencies[dep.0].kind else {
            return Some(vec![request]);
        };
        let rt = &self.resources[resource.0];
        let def = &self.defs.resources[resource.0];
        let free = def.capacity.saturating_sub(rt.busy + rt.locked);
        if free < min {
            return None;
        }

        let matches = |a: &Request, b: &Request| -> bool {
            if a.kind != b.kind {
                return false;
            }
            match a.kind {
                RequestKind::Production => a.process == b.process,
                RequestKind::Transport { .. } => {
                    a.process == b.process && a.origin == b.origin && a.target == b.target
                }
            }
        };

        let mut siblings: Vec<RequestId> = self
            .order_pending(resource)
            .into_iter()
            .filter(|r| {
                *r != request && matches(&self.requests[request.0], &self.requests[r.0])
            })
            .collect();
        if (siblings.len() + 1) < min as usize {
            return None;
        }
        let take = (max.min(free) as usize).saturating_sub(1);
        siblings.truncate(take);
        let mut lot = vec![request];
        lot.extend(siblings);
        Some(lot)
    }

    fn start_production_execution(&mut self, resource: ResIx, lot: Vec<RequestId>) {
        let process = self.requests[lot[0].0].process;
        let mut phases = VecDeque::new();

        if let Some(setup) = self.setup_phase(resource, process) {
            phases.push_back(setup);
        }
        for phase in self.loading_phases(resource, LoadingPhase::Before) {
            phases.push_back(phase);
        }
        let duration = self
            .defs.processes[process.0]
            .time_model()
            .and_then(|tm| self.sample(tm, &TimeContext::default()))
            .unwrap_or(Duration::ZERO);
        phases.push_back(Phase {
            kind: PhaseKind::Production,
            dur: duration,
        });
        for phase in self.loading_phases(resource, LoadingPhase::After) {
            phases.push_back(phase);
        }

        self.spawn_execution(resource, lot, phases);
    }

    fn start_system_execution(&mut self, resource: ResIx, lot: Vec<RequestId>) {
        // Tokens wait in the internal buffer so sub-steps can pick them up.
        let buffer = self.defs.resources[resource.0].buffer;
        for member in &lot {
            let cargo = self.requests[member.0].cargo;
            assert!(self.try_reserve_put(buffer));
            self.commit_put(buffer, cargo);
        }
        let process = self.requests[lot[0].0].process;
        let steps = self.system_steps(resource, process);
        let mut phases = VecDeque::new();
        phases.push_back(Phase {
            kind: PhaseKind::SystemChain { steps, cursor: 0 },
            dur: Duration::ZERO,
        });
        self.spawn_execution(resource, lot, phases);
    }

    /// Internal decomposition of a cell-level process: process models and
    /// compounds expand into their members; each step maps to the first
    /// sub-resource (in routing order) that offers it.
    fn system_steps(&self, resource: ResIx, process: ProcIx) -> Vec<(ResIx, ProcIx)> {
        let mut internal: Vec<ProcIx> = Vec::new();
        match &self.defs.processes[process.0].kind {
            ProcessKind::ProcessModel { graph } => {
                internal.extend(graph.iter().map(|(p, _)| *p));
            }
            ProcessKind::Compound { members } => internal.extend(members.iter().copied()),
            _ => internal.push(process),
        }
        let subs = &self.defs.resources[resource.0].subresources;
        let mut steps = Vec::new();
        for step in internal {
            let candidate = self
                .matcher
                .production_candidates(step)
                .iter()
                .find(|(r, _)| subs.contains(r))
                .copied()
                .or_else(|| {
                    subs.iter()
                        .find(|s| self.defs.resources[s.0].processes.contains(&step))
                        .map(|s| (*s, step))
                });
            if let Some(found) = candidate {
                steps.push(found);
            }
        }
        steps
    }

    fn setup_phase(&mut self, resource: ResIx, process: ProcIx) -> Option<Phase> {
        let current = self.resources[resource.0].current_setup;
        if current == Some(process) {
            return None;
        }
        let states = self.defs.resources[resource.0].states.clone();
        for state in states {
            if let StateKind::Setup {
                duration,
                origin,
                target,
            } = self.defs.states[state.0].kind
                && target == process
                && (current.is_none() || current == Some(origin))
            {
                let dur = self
                    .sample(duration, &TimeContext::default())
                    .unwrap_or(Duration::ZERO);
                return Some(Phase {
                    kind: PhaseKind::Setup {
                        state,
                        target: process,
                    },
                    dur,
                });
            }
        }
        // No matching changeover declared; switch instantly.
        self.resources[resource.0].current_setup = Some(process);
        None
    }

    fn loading_phases(&mut self, resource: ResIx, when: LoadingPhase) -> Vec<Phase> {
        let deps = self.defs.resources[resource.0].dependencies.clone();
        let mut phases = Vec::new();
        for dep in deps {
            if let DepKind::Loading {
                process,
                phase,
                chained,
            } = self.defs.dependencies[dep.0].kind
                && phase == when
            {
                let elided = chained && self.resources[resource.0].last_loading == Some(process);
                let dur = if elided {
                    Duration::ZERO
                } else {
                    self.defs.processes[process.0]
                        .time_model()
                        .and_then(|tm| self.sample(tm, &TimeContext::default()))
                        .unwrap_or(Duration::ZERO)
                };
                phases.push(Phase {
                    kind: PhaseKind::Loading {
                        process,
                        after: when == LoadingPhase::After,
                    },
                    dur,
                });
            }
        }
        phases
    }

    // -- transport ----------------------------------------------------------

    fn try_start_transport(&mut self, resource: ResIx, request: RequestId) -> StartOutcome {
        let req = &self.requests[request.0];
        let (origin, cargo, process) = (req.origin, req.cargo, req.process);
        if self.resources[resource.0].process_down.contains(&process) {
            return StartOutcome::Blocked;
        }
        // Primitive movements reserve their cargo at dispatch; everything
        // else claims it here, before traveling to pick it up.
        let pre_reserved = matches!(
            req.kind,
            RequestKind::Transport {
                purpose: TransportPurpose::PrimitiveFetch { .. } | TransportPurpose::PrimitiveReturn,
            }
        );
        if pre_reserved {
            if !self.queues[origin.0].contains(cargo) {
                self.queues[origin.0].wait_get(Wake::ControllerPoll(resource));
                return StartOutcome::Blocked;
            }
        } else if !self.queues[origin.0].try_reserve_get(cargo) {
            self.queues[origin.0].wait_get(Wake::ControllerPoll(resource));
            return StartOutcome::Blocked;
        }

        let req = &mut self.requests[request.0];
        req.started = true;
        self.resources[resource.0].pending.retain(|r| *r != request);
        self.resources[resource.0].busy += 1;

        let phases = self.transport_phases(resource, request);
        self.spawn_execution(resource, vec![request], phases);
        StartOutcome::Started
    }

    fn transport_phases(&mut self, resource: ResIx, request: RequestId) -> VecDeque<Phase> {
        let req = &self.requests[request.0];
        let (origin, target, process) = (req.origin, req.target, req.process);
        let position = self.resources[resource.0].position;
        let (loading_tm, unloading_tm) = self.defs.processes[process.0].loading_models();

        let mut phases = VecDeque::new();
        let empty = self.leg_duration(process, position, Locatable::Port(origin));
        if empty > Duration::ZERO {
            phases.push_back(Phase {
                kind: PhaseKind::EmptyMove,
                dur: empty,
            });
        }
        let pickup = loading_tm
            .and_then(|tm| self.sample(tm, &TimeContext::default()))
            .unwrap_or(Duration::ZERO);
        phases.push_back(Phase {
            kind: PhaseKind::Pickup,
            dur: pickup,
        });
        let loaded = self.leg_duration(process, Locatable::Port(origin), Locatable::Port(target));
        phases.push_back(Phase {
            kind: PhaseKind::LoadedMove,
            dur: loaded,
        });
        let dropoff = unloading_tm
            .and_then(|tm| self.sample(tm, &TimeContext::default()))
            .unwrap_or(Duration::ZERO);
        phases.push_back(Phase {
            kind: PhaseKind::Dropoff,
            dur: dropoff,
        });
        phases
    }

    /// Travel duration for one leg. Link transports follow their routed
    /// path distance; everything else asks the time model directly with the
    /// endpoint pair as context.
    fn leg_duration(&mut self, process: ProcIx, from: Locatable, to: Locatable) -> Duration {
        if from == to {
            return Duration::ZERO;
        }
        let Some(tm) = self.defs.processes[process.0].time_model() else {
            return Duration::ZERO;
        };
        if let ProcessKind::LinkTransport { .. } = self.defs.processes[process.0].kind {
            let endpoints = (
                self.matcher.graph_endpoint(&self.defs, process, from),
                self.matcher.graph_endpoint(&self.defs, process, to),
            );
            if let (Some(a), Some(b)) = endpoints
                && let Some((_, distance)) = self.matcher.route(&self.defs, process, a, b)
            {
                // Feed the routed distance through the model as a straight
                // segment so reaction time and speed still apply.
                let ctx = TimeContext::between([0.0, 0.0], [distance, 0.0]);
                return self
                    .sample(tm, &ctx)
                    .unwrap_or(Duration::ZERO);
            }
        }
        let ctx = TimeContext::between(self.location_of(from), self.location_of(to));
        self.sample(tm, &ctx).unwrap_or(Duration::ZERO)
    }

    // -- execution phase chain ----------------------------------------------

    fn spawn_execution(
        &mut self,
        resource: ResIx,
        lot: Vec<RequestId>,
        phases: VecDeque<Phase>,
    ) {
        let exec = ExecId(self.execs.insert(Execution {
            resource,
            requests: lot.iter().copied().collect(),
            phases,
            current: None,
            generation: 0,
            phase_end: self.now(),
            remaining: None,
        }));
        self.resources[resource.0].active_execs.push(exec);
        trace!(?exec, resource = %self.defs.resources[resource.0].id, "execution spawned");
        self.begin_next_phase(exec);
    }

    /// Pops the next phase, runs its start-of-phase effects, and schedules
    /// its completion.
    fn begin_next_phase(&mut self, exec: ExecId) {
        let Some(phase) = self.execs[exec.0].phases.pop_front() else {
            self.complete_execution(exec);
            return;
        };
        let resource = self.execs[exec.0].resource;
        let dur = phase.dur;
        let now = self.now_seconds();
        let expected_end = (self.now() + dur).to_seconds();

        match &phase.kind {
            PhaseKind::Setup { state, .. } => {
                let record = EventRecord::new(
                    now,
                    self.defs.resources[resource.0].id.clone(),
                    self.defs.states[state.0].id.clone(),
                    Some(StateType::Setup),
                    Activity::StartState,
                )
                .with_expected_end(expected_end);
                self.push_record(record);
            }
            PhaseKind::Loading { process, .. } => {
                for request in self.execs[exec.0].requests.clone() {
                    let product = self.token_name(self.requests[request.0].cargo);
                    let record = EventRecord::new(
                        now,
                        self.defs.resources[resource.0].id.clone(),
                        self.defs.processes[process.0].id.clone(),
                        Some(StateType::Production),
                        Activity::StartState,
                    )
                    .with_product(product)
                    .with_process(self.defs.processes[process.0].id.clone())
                    .with_expected_end(expected_end);
                    self.push_record(record);
                }
            }
            PhaseKind::Production => {
                for request in self.execs[exec.0].requests.clone() {
                    let req = &self.requests[request.0];
                    let process = req.process;
                    let product = self.token_name(req.cargo);
                    let record = EventRecord::new(
                        now,
                        self.defs.resources[resource.0].id.clone(),
                        self.defs.processes[process.0].id.clone(),
                        Some(StateType::Production),
                        Activity::StartState,
                    )
                    .with_product(product)
                    .with_process(self.defs.processes[process.0].id.clone())
                    .with_expected_end(expected_end);
                    self.push_record(record);
                }
            }
            PhaseKind::EmptyMove => {
                let request = self.execs[exec.0].requests[0];
                let req = &self.requests[request.0];
                let origin = self.locatable_name(self.resources[resource.0].position).to_owned();
                let target = self.defs.ports[req.origin.0].id.clone();
                let process = req.process;
                let record = EventRecord::new(
                    now,
                    self.defs.resources[resource.0].id.clone(),
                    self.defs.processes[process.0].id.clone(),
                    Some(StateType::Transport),
                    Activity::StartState,
                )
                .with_route(origin, target)
                .with_empty_transport(true)
                .with_expected_end(expected_end);
                self.push_record(record);
            }
            PhaseKind::Pickup => {
                // The transporter stands at the origin; the cargo leaves its
                // queue the moment loading begins.
                let request = self.execs[exec.0].requests[0];
                let req = &self.requests[request.0];
                let (origin, cargo) = (req.origin, req.cargo);
                self.resources[resource.0].position = Locatable::Port(origin);
                self.commit_get(origin, cargo);
                if let Token::Primitive(p) = cargo {
                    self.primitives[p.0].whereabouts =
                        crate::sim::engine::PrimitiveWhere::InTransit;
                }
            }
            PhaseKind::LoadedMove => {
                let request = self.execs[exec.0].requests[0];
                let req = &self.requests[request.0];
                let origin = self.defs.ports[req.origin.0].id.clone();
                let target = self.defs.ports[req.target.0].id.clone();
                let process = req.process;
                let cargo = self.token_name(req.cargo);
                let record = EventRecord::new(
                    now,
                    self.defs.resources[resource.0].id.clone(),
                    self.defs.processes[process.0].id.clone(),
                    Some(StateType::Transport),
                    Activity::StartState,
                )
                .with_product(cargo)
                .with_route(origin, target)
                .with_empty_transport(false)
                .with_expected_end(expected_end);
                self.push_record(record);
            }
            PhaseKind::Dropoff => {
                let request = self.execs[exec.0].requests[0];
                let target = self.requests[request.0].target;
                self.resources[resource.0].position = Locatable::Port(target);
            }
            PhaseKind::SystemChain { steps, .. } => {
                for request in self.execs[exec.0].requests.clone() {
                    let req = &self.requests[request.0];
                    let process = req.process;
                    let product = self.token_name(req.cargo);
                    let record = EventRecord::new(
                        now,
                        self.defs.resources[resource.0].id.clone(),
                        self.defs.processes[process.0].id.clone(),
                        Some(StateType::Production),
                        Activity::StartState,
                    )
                    .with_product(product)
                    .with_process(self.defs.processes[process.0].id.clone());
                    self.push_record(record);
                }
                let steps = steps.clone();
                self.execs[exec.0].current = Some(phase);
                self.dispatch_system_step(exec, &steps, 0);
                return;
            }
        }

        let generation = self.execs[exec.0].generation;
        self.execs[exec.0].phase_end = self.now() + dur;
        self.execs[exec.0].current = Some(phase);
        self.clock
            .schedule_in(dur, Wake::ExecAdvance { exec, generation });
    }

    pub(crate) fn exec_advance(&mut self, exec: ExecId, generation: u32) {
        let Some(execution) = self.execs.get(exec.0) else {
            return;
        };
        if execution.generation != generation || execution.remaining.is_some() {
            return;
        }
        self.finish_current_phase(exec);
        self.begin_next_phase(exec);
    }

    /// End-of-phase bookkeeping and records.
    fn finish_current_phase(&mut self, exec: ExecId) {
        let Some(phase) = self.execs[exec.0].current.take() else {
            return;
        };
        let resource = self.execs[exec.0].resource;
        let now = self.now_seconds();
        match &phase.kind {
            PhaseKind::Setup { state, target } => {
                self.resources[resource.0].current_setup = Some(*target);
                let record = EventRecord::new(
                    now,
                    self.defs.resources[resource.0].id.clone(),
                    self.defs.states[state.0].id.clone(),
                    Some(StateType::Setup),
                    Activity::EndState,
                );
                self.push_record(record);
            }
            PhaseKind::Loading { process, .. } => {
                self.resources[resource.0].last_loading = Some(*process);
                for request in self.execs[exec.0].requests.clone() {
                    let product = self.token_name(self.requests[request.0].cargo);
                    let record = EventRecord::new(
                        now,
                        self.defs.resources[resource.0].id.clone(),
                        self.defs.processes[process.0].id.clone(),
                        Some(StateType::Production),
                        Activity::EndState,
                    )
                    .with_product(product);
                    self.push_record(record);
                }
            }
            PhaseKind::Production => {
                for request in self.execs[exec.0].requests.clone() {
                    let req = &self.requests[request.0];
                    let process = req.process;
                    let product = self.token_name(req.cargo);
                    let record = EventRecord::new(
                        now,
                        self.defs.resources[resource.0].id.clone(),
                        self.defs.processes[process.0].id.clone(),
                        Some(StateType::Production),
                        Activity::EndState,
                    )
                    .with_product(product)
                    .with_process(self.defs.processes[process.0].id.clone());
                    self.push_record(record);
                }
            }
            PhaseKind::EmptyMove => {
                let record = EventRecord::new(
                    now,
                    self.defs.resources[resource.0].id.clone(),
                    self.defs.processes[self.requests[self.execs[exec.0].requests[0].0].process.0]
                        .id
                        .clone(),
                    Some(StateType::Transport),
                    Activity::EndState,
                )
                .with_empty_transport(true);
                self.push_record(record);
                self.resources[resource.0].battery_used += phase.dur.to_seconds();
            }
            PhaseKind::LoadedMove => {
                let request = self.execs[exec.0].requests[0];
                let req = &self.requests[request.0];
                let cargo = self.token_name(req.cargo);
                let record = EventRecord::new(
                    now,
                    self.defs.resources[resource.0].id.clone(),
                    self.defs.processes[req.process.0].id.clone(),
                    Some(StateType::Transport),
                    Activity::EndState,
                )
                .with_product(cargo)
                .with_empty_transport(false);
                self.push_record(record);
                self.resources[resource.0].battery_used += phase.dur.to_seconds();
            }
            PhaseKind::Pickup | PhaseKind::Dropoff | PhaseKind::SystemChain { .. } => {}
        }
    }

    // -- completion ---------------------------------------------------------

    fn complete_execution(&mut self, exec: ExecId) {
        let execution = self.execs.remove(exec.0);
        let resource = execution.resource;
        self.resources[resource.0]
            .active_execs
            .retain(|e| *e != exec);
        let lot_size = execution.requests.len() as u32;
        self.resources[resource.0].busy =
            self.resources[resource.0].busy.saturating_sub(lot_size);

        let first = execution.requests[0];
        if self.requests[first.0].is_transport() {
            self.complete_transport(resource, first);
        } else {
            for request in execution.requests.clone() {
                self.complete_production(resource, request);
            }
        }

        self.check_battery(resource);
        self.clock.schedule_now(Wake::ControllerPoll(resource));
    }

    fn complete_production(&mut self, resource: ResIx, request: RequestId) {
        let req = &self.requests[request.0];
        let (cargo, target, process, required, plan_step, parent) = (
            req.cargo,
            req.target,
            req.process,
            req.required,
            req.plan_step,
            req.parent,
        );
        self.commit_put(target, cargo);
        self.release_dependencies(resource, request);

        if let Some(parent) = parent {
            // Internal sub-step of a system cell; the parent chain advances
            // instead of the router.
            self.requests.remove(request.0);
            self.system_chain_advance(parent);
            return;
        }

        if let Token::Product(product) = cargo {
            self.products[product.0].active_production = None;
            // Failure draw happens once, at completion.
            let failure_rate = self.defs.processes[required.0].failure_rate;
            let failed = failure_rate > 0.0 && self.rng.uniform() < failure_rate;

            if let ProcessKind::Rework { .. } = self.defs.processes[process.0].kind {
                // A completed rework clears the failure; a blocking rework
                // left the original step un-done, so it re-runs next.
                self.products[product.0].reworked = true;
            } else if failed && self.has_rework_for(required) {
                self.products[product.0].failed = Some(required);
                let blocking = self.rework_blocking(required);
                if let Some(step) = plan_step
                    && !blocking
                {
                    self.products[product.0].done[step] = true;
                }
                // A blocking rework leaves the step un-done so it re-runs.
            } else if let Some(step) = plan_step {
                self.products[product.0].done[step] = true;
            }
            self.requests.remove(request.0);
            self.clock.schedule_now(Wake::RouterPlan(product));
        } else {
            self.requests.remove(request.0);
        }
    }

    fn has_rework_for(&self, failed: ProcIx) -> bool {
        !self.matcher.rework_candidates(failed).is_empty()
    }

    /// Whether the first matching rework process for `failed` is blocking.
    fn rework_blocking(&self, failed: ProcIx) -> bool {
        self.matcher
            .rework_candidates(failed)
            .first()
            .map(|(_, p)| {
                matches!(
                    self.defs.processes[p.0].kind,
                    ProcessKind::Rework { blocking: true, .. }
                )
            })
            .unwrap_or(false)
    }

    fn complete_transport(&mut self, resource: ResIx, request: RequestId) {
        let req = &self.requests[request.0];
        let (cargo, target, purpose) = (
            req.cargo,
            req.target,
            match req.kind {
                RequestKind::Transport { purpose } => purpose,
                RequestKind::Production => unreachable!("production request in transport path"),
            },
        );
        self.commit_put(target, cargo);
        self.requests.remove(request.0);

        match purpose {
            TransportPurpose::FeedProduction => {
                if let Token::Product(p) = cargo {
                    self.products[p.0].active_transport = None;
                }
            }
            TransportPurpose::ToSink(sink) => {
                if let Token::Product(p) = cargo {
                    self.products[p.0].active_transport = None;
                }
                self.clock.schedule_now(Wake::SinkTake(sink, target));
            }
            TransportPurpose::PrimitiveFetch { consumer, stamp } => {
                let alive = self
                    .requests
                    .get(consumer.0)
                    .is_some_and(|r| r.arrival == stamp);
                if alive {
                    self.primitive_arrived(consumer, cargo, target);
                } else if let Token::Primitive(p) = cargo {
                    self.return_primitive_from(p, target);
                }
            }
            TransportPurpose::PrimitiveReturn => {
                if let Token::Primitive(p) = cargo {
                    self.primitives[p.0].whereabouts =
                        crate::sim::engine::PrimitiveWhere::Store(target);
                }
            }
        }
    }

    // -- system cells -------------------------------------------------------

    /// Launches the `cursor`-th internal sub-step of a system-cell
    /// execution as a child request on the chosen sub-resource.
    pub(crate) fn dispatch_system_step(
        &mut self,
        exec: ExecId,
        steps: &[(ResIx, ProcIx)],
        cursor: usize,
    ) {
        if cursor >= steps.len() {
            self.finish_system_chain(exec);
            return;
        }
        let (sub, process) = steps[cursor];
        let parent_request = self.execs[exec.0].requests[0];
        let cargo = self.requests[parent_request.0].cargo;
        let system = self.execs[exec.0].resource;
        let buffer = self.defs.resources[system.0].buffer;
        assert!(self.try_reserve_put(buffer));

        let primitives_needed = self.defs.resources[sub.0]
            .dependencies
            .iter()
            .filter_map(|d| match self.defs.dependencies[d.0].kind {
                DepKind::Primitive { ty } => Some(ty),
                _ => None,
            })
            .collect();
        let arrival = self.clock.next_seq();
        let child = RequestId(self.requests.insert(crate::sim::request::Request {
            kind: RequestKind::Production,
            resource: sub,
            process,
            required: process,
            origin: buffer,
            target: buffer,
            cargo,
            plan_step: None,
            arrival,
            deps: crate::sim::request::DepProgress {
                primitives_needed,
                ..Default::default()
            },
            started: false,
            cancelled: false,
            lot: None,
            parent: Some(exec),
        }));
        trace!(?exec, sub = %self.defs.resources[sub.0].id, "system sub-step dispatched");
        self.enqueue_request(child);
    }

    /// A child completed; move the chain forward.
    pub(crate) fn system_chain_advance(&mut self, exec: ExecId) {
        let Some(execution) = self.execs.get_mut(exec.0) else {
            return;
        };
        let Some(Phase {
            kind: PhaseKind::SystemChain { steps, cursor },
            ..
        }) = &mut execution.current
        else {
            return;
        };
        *cursor += 1;
        let next = *cursor;
        let steps = steps.clone();
        self.dispatch_system_step(exec, &steps, next);
    }

    /// All sub-steps ran; close the cell-level production state and hand
    /// the execution to the normal completion path.
    fn finish_system_chain(&mut self, exec: ExecId) {
        let resource = self.execs[exec.0].resource;
        let buffer = self.defs.resources[resource.0].buffer;
        let now = self.now_seconds();
        for request in self.execs[exec.0].requests.clone() {
            let req = &self.requests[request.0];
            let process = req.process;
            let cargo = req.cargo;
            let product = self.token_name(cargo);
            let record = EventRecord::new(
                now,
                self.defs.resources[resource.0].id.clone(),
                self.defs.processes[process.0].id.clone(),
                Some(StateType::Production),
                Activity::EndState,
            )
            .with_product(product)
            .with_process(self.defs.processes[process.0].id.clone());
            self.push_record(record);
            // The token waits in the internal buffer between sub-steps;
            // completion moves it to the declared output.
            if self.queues[buffer.0].contains(cargo) {
                self.commit_get(buffer, cargo);
            }
        }
        self.execs[exec.0].current = None;
        self.complete_execution(exec);
    }
}
