//! The per-product router.
//!
//! Each live product is walked through its process plan: read the next
//! ready step, pick a compatible (resource, process) pair under the
//! product's routing heuristic, reserve the destination queue, then hand a
//! transport request and a production request to the chosen controllers.
//! Completion notifications loop back here until the plan is exhausted and
//! the product is routed to a sink.

use crate::model::resource::RoutingHeuristic;
use crate::sim::clock::Wake;
use crate::sim::engine::{DepKind, PrimitiveWhere, ProcessKind, World};
use crate::sim::log::{Activity, EventRecord};
use crate::sim::request::{DepProgress, Request, RequestKind, TransportPurpose};
use crate::sim::{
    PortIx, ProcIx, ProductId, RequestId, ResIx, SimulationError, SinkIx, Token,
};
use ordered_float::OrderedFloat;
use tracing::{debug, warn};

/// What a product should do next.
enum NextStep {
    Step { plan_node: usize, process: ProcIx },
    Rework { failed: ProcIx },
    Sink,
}

impl World {
    pub(crate) fn router_plan(&mut self, product: ProductId) {
        let Some(prod) = self.products.get(product.0) else {
            return;
        };
        // A product with work in flight will report back when it lands.
        if prod.active_production.is_some() || prod.active_transport.is_some() {
            return;
        }

        match self.next_step(product) {
            NextStep::Rework { failed } => {
                let candidates = self.matcher.rework_candidates(failed).to_vec();
                if candidates.is_empty() {
                    warn!(
                        product = %self.products[product.0].name,
                        process = %self.defs.processes[failed.0].id,
                        "failure drawn but no rework process offered; continuing"
                    );
                    self.products[product.0].failed = None;
                    self.router_plan(product);
                    return;
                }
                self.products[product.0].failed = None;
                self.plan_production(product, failed, None, candidates, true);
            }
            NextStep::Step { plan_node, process } => {
                let candidates = self.matcher.production_candidates(process).to_vec();
                if candidates.is_empty() {
                    self.product_failed(
                        product,
                        SimulationError::NoCompatibleResource {
                            product: self.products[product.0].name.clone(),
                            process: self.defs.processes[process.0].id.clone(),
                        },
                    );
                    return;
                }
                self.plan_production(product, process, Some(plan_node), candidates, false);
            }
            NextStep::Sink => self.plan_sink(product),
        }
    }

    fn next_step(&self, product: ProductId) -> NextStep {
        let prod = &self.products[product.0];
        if let Some(failed) = prod.failed {
            return NextStep::Rework { failed };
        }
        let plan = &self.defs.product_types[prod.ty.0].plan;
        for (i, step) in plan.steps.iter().enumerate() {
            if !prod.done[i] && plan.preds[i].iter().all(|p| prod.done[*p]) {
                return NextStep::Step {
                    plan_node: i,
                    process: *step,
                };
            }
        }
        NextStep::Sink
    }

    /// Plans one production step: resource choice, destination reservation,
    /// and the feeding transport.
    fn plan_production(
        &mut self,
        product: ProductId,
        required: ProcIx,
        plan_node: Option<usize>,
        candidates: Vec<(ResIx, ProcIx)>,
        is_rework: bool,
    ) {
        let heuristic = self.defs.product_types[self.products[product.0].ty.0].heuristic;
        let Some((resource, offered, input)) = self.choose_production_target(&candidates, heuristic)
        else {
            // Every candidate input queue is full; retry when any frees up.
            for (r, _) in &candidates {
                for port in self.defs.resources[r.0].input_ports.clone() {
                    self.queues[port.0].wait_put(Wake::RouterPlan(product));
                }
            }
            return;
        };
        assert!(self.try_reserve_put(input));

        let resource_def = &self.defs.resources[resource.0];
        let lot = resource_def.dependencies.iter().copied().find(|d| {
            matches!(self.defs.dependencies[d.0].kind, DepKind::Lot { .. })
        });
        let primitives_needed = resource_def
            .dependencies
            .iter()
            .filter_map(|d| match self.defs.dependencies[d.0].kind {
                DepKind::Primitive { ty } => Some(ty),
                _ => None,
            })
            .collect();
        let target = resource_def
            .output_ports
            .first()
            .copied()
            .unwrap_or(resource_def.buffer);

        let arrival = self.clock.next_seq();
        let request = RequestId(self.requests.insert(Request {
            kind: RequestKind::Production,
            resource,
            process: offered,
            required,
            origin: input,
            target,
            cargo: Token::Product(product),
            plan_step: plan_node,
            arrival,
            deps: DepProgress {
                primitives_needed,
                ..DepProgress::default()
            },
            started: false,
            cancelled: false,
            lot,
            parent: None,
        }));
        self.products[product.0].active_production = Some(request);
        debug!(
            product = %self.products[product.0].name,
            process = %self.defs.processes[required.0].id,
            resource = %self.defs.resources[resource.0].id,
            rework = is_rework,
            "step planned"
        );
        self.enqueue_request(request);

        // Feed the product to the chosen input queue. A product already
        // sitting there occupies a slot, so the arrival reservation is
        // surplus.
        let at = self.products[product.0].location;
        if at == input {
            self.release_put(input);
            return;
        }
        let transport = self.defs.product_types[self.products[product.0].ty.0].transport;
        match self.dispatch_transport(
            Token::Product(product),
            at,
            input,
            transport,
            TransportPurpose::FeedProduction,
        ) {
            Some(t) => {
                self.products[product.0].active_transport = Some(t);
            }
            None => {
                self.release_put(input);
                self.cancel_planned_production(product);
                let error = self.transport_error(transport, at, input);
                self.product_failed(product, error);
            }
        }
    }

    /// Applies the routing heuristic over candidates, returning the chosen
    /// resource, offered process, and an input port with free space.
    fn choose_production_target(
        &mut self,
        candidates: &[(ResIx, ProcIx)],
        heuristic: RoutingHeuristic,
    ) -> Option<(ResIx, ProcIx, PortIx)> {
        let viable: Vec<(ResIx, ProcIx, PortIx)> = candidates
            .iter()
            .filter_map(|(r, p)| {
                self.defs.resources[r.0]
                    .input_ports
                    .iter()
                    .copied()
                    .find(|q| self.queues[q.0].has_space())
                    .map(|q| (*r, *p, q))
            })
            .collect();
        if viable.is_empty() {
            return None;
        }
        let chosen = match heuristic {
            RoutingHeuristic::Fifo => 0,
            RoutingHeuristic::Random => self.rng.index(viable.len()),
            RoutingHeuristic::ShortestQueue => viable
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, _, q))| self.queues[q.0].committed_load())
                .map(|(i, _)| i)
                .unwrap_or(0),
        };
        Some(viable[chosen])
    }

    /// Creates a transport request and enqueues it on a compatible
    /// transporter. The target reservation must already be held by the
    /// caller.
    pub(crate) fn dispatch_transport(
        &mut self,
        cargo: Token,
        origin: PortIx,
        target: PortIx,
        required: ProcIx,
        purpose: TransportPurpose,
    ) -> Option<RequestId> {
        let candidates = self
            .matcher
            .transport_candidates(required, origin, target)
            .to_vec();
        if candidates.is_empty() {
            return None;
        }
        let heuristic = match cargo {
            Token::Product(p) => self.defs.product_types[self.products[p.0].ty.0].heuristic,
            Token::Primitive(_) => RoutingHeuristic::Fifo,
        };
        let chosen = match heuristic {
            RoutingHeuristic::Fifo => 0,
            RoutingHeuristic::Random => self.rng.index(candidates.len()),
            RoutingHeuristic::ShortestQueue => candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, (r, _))| {
                    let rt = &self.resources[r.0];
                    rt.pending.len() as u32 + rt.busy
                })
                .map(|(i, _)| i)
                .unwrap_or(0),
        };
        let (resource, process) = candidates[chosen];
        let arrival = self.clock.next_seq();
        let request = RequestId(self.requests.insert(Request {
            kind: RequestKind::Transport { purpose },
            resource,
            process,
            required,
            origin,
            target,
            cargo,
            plan_step: None,
            arrival,
            deps: DepProgress::default(),
            started: false,
            cancelled: false,
            lot: None,
            parent: None,
        }));
        self.enqueue_request(request);
        Some(request)
    }

    fn transport_error(&self, transport: ProcIx, origin: PortIx, target: PortIx) -> SimulationError {
        let link = matches!(
            self.defs.processes[transport.0].kind,
            ProcessKind::LinkTransport { .. }
        );
        if link {
            SimulationError::NoRouteFound {
                origin: self.defs.ports[origin.0].id.clone(),
                target: self.defs.ports[target.0].id.clone(),
            }
        } else {
            SimulationError::NoCompatibleResource {
                product: String::new(),
                process: self.defs.processes[transport.0].id.clone(),
            }
        }
    }

    fn plan_sink(&mut self, product: ProductId) {
        let ty = self.products[product.0].ty;
        let Some((sink_ix, _)) = self
            .defs
            .sinks
            .iter()
            .enumerate()
            .find(|(_, s)| s.product_type == ty)
        else {
            self.product_failed(
                product,
                SimulationError::NoCompatibleResource {
                    product: self.products[product.0].name.clone(),
                    process: "sink".to_owned(),
                },
            );
            return;
        };
        let sink = SinkIx(sink_ix);
        let input = self.defs.sinks[sink.0].input_ports[0];
        assert!(self.try_reserve_put(input));

        let at = self.products[product.0].location;
        if at == input {
            self.release_put(input);
            self.clock.schedule_now(Wake::SinkTake(sink, input));
            return;
        }
        let transport = self.defs.product_types[ty.0].transport;
        match self.dispatch_transport(
            Token::Product(product),
            at,
            input,
            transport,
            TransportPurpose::ToSink(sink),
        ) {
            Some(t) => {
                self.products[product.0].active_transport = Some(t);
            }
            None => {
                self.release_put(input);
                let error = self.transport_error(transport, at, input);
                self.product_failed(product, error);
            }
        }
    }

    /// Unwinds an unstarted planned production request (pending-list entry
    /// and dependency state) without touching the product. The caller owns
    /// the input-queue reservation and releases it when still unconsumed.
    pub(crate) fn cancel_planned_production(&mut self, product: ProductId) {
        let Some(request) = self.products[product.0].active_production.take() else {
            return;
        };
        let req = &self.requests[request.0];
        if req.started {
            self.products[product.0].active_production = Some(request);
            return;
        }
        let resource = req.resource;
        self.resources[resource.0].pending.retain(|r| *r != request);
        let inbound = self.requests[request.0].deps.primitives_inbound;
        if inbound > 0 {
            self.requests[request.0].cancelled = true;
        } else {
            self.unwind_cancelled_request(request);
        }
    }

    /// Drops a cancelled request once nothing is in flight toward it,
    /// sending any staged primitives home.
    pub(crate) fn unwind_cancelled_request(&mut self, request: RequestId) {
        let resource = self.requests[request.0].resource;
        self.release_dependencies(resource, request);
        self.requests.remove(request.0);
    }

    /// A per-product fault: log it, unwind the instance, keep simulating.
    pub(crate) fn product_failed(&mut self, product: ProductId, error: SimulationError) {
        warn!(product = %self.products[product.0].name, %error, "product failed");
        let record = EventRecord::new(
            self.now_seconds(),
            String::new(),
            format!("failed: {error}"),
            None,
            Activity::FinishProduct,
        )
        .with_product(self.products[product.0].name.clone());
        self.push_record(record);
        self.drop_product(product);
    }

    /// Removes a product instance, releasing carried primitives and the
    /// ConWIP slot.
    pub(crate) fn drop_product(&mut self, product: ProductId) {
        let carried = std::mem::take(&mut self.products[product.0].carried);
        for primitive in carried {
            self.place_primitive_in_store(primitive);
        }
        self.products.remove(product.0);
        self.live_products = self.live_products.saturating_sub(1);
        self.wake_conwip_sources();
    }

    /// Puts a carried primitive straight into the nearest store with free
    /// space (carried instances travel with their product, so there is no
    /// transport leg on release). Consumables are destroyed.
    pub(crate) fn place_primitive_in_store(&mut self, primitive: crate::sim::PrimitiveId) {
        let ty = self.primitives[primitive.0].ty;
        if self.defs.primitive_types[ty.0].consumable {
            self.primitives.remove(primitive.0);
            return;
        }
        let location = match self.primitives[primitive.0].whereabouts {
            PrimitiveWhere::Store(s) => self.port_location(s),
            PrimitiveWhere::Resource(r) => self.defs.resources[r.0].location,
            PrimitiveWhere::CarriedBy(p) => self
                .products
                .get(p.0)
                .map(|prod| self.port_location(prod.location))
                .unwrap_or([0.0, 0.0]),
            PrimitiveWhere::InTransit => [0.0, 0.0],
        };
        let mut stores = self.defs.primitive_types[ty.0].storages.clone();
        stores.sort_by_key(|s| {
            OrderedFloat(
                crate::model::time_model::DistanceMetric::Euclidean
                    .measure(self.port_location(*s), location),
            )
        });
        for store in stores {
            if self.queues[store.0].has_space() {
                let wakes = self.queues[store.0].force_put(Token::Primitive(primitive));
                self.primitives[primitive.0].whereabouts = PrimitiveWhere::Store(store);
                self.schedule_wakes(wakes);
                return;
            }
        }
        // No storage space anywhere; the instance is lost to the run.
        warn!(
            primitive = %self.primitives[primitive.0].name,
            "no store can take returned primitive"
        );
        self.primitives.remove(primitive.0);
    }
}
