//! Sources, order sources, sinks, and the pinned schedule driver.

use crate::sim::clock::Wake;
use crate::sim::engine::{DepKind, PrimitiveWhere, Primitive, Product, World};
use crate::sim::log::{Activity, EventRecord};
use crate::sim::request::{DepProgress, Request, RequestKind};
use crate::sim::time_model::TimeContext;
use crate::sim::{PortIx, PrimTypeIx, PrimitiveId, ProdTypeIx, ProductId, RequestId, SinkIx, SrcIx, Token};
use smallvec::SmallVec;
use tracing::{debug, warn};

impl World {
    // -- startup ------------------------------------------------------------

    /// Places the declared initial stock of every primitive type into its
    /// stores. Conservation starts here: instances are only ever moved or,
    /// for consumable types, destroyed.
    pub(crate) fn seed_primitives(&mut self) {
        for ty_ix in 0..self.defs.primitive_types.len() {
            let ty = PrimTypeIx(ty_ix);
            let pairs: Vec<(PortIx, u32)> = self.defs.primitive_types[ty_ix]
                .storages
                .iter()
                .copied()
                .zip(self.defs.primitive_types[ty_ix].initial.iter().copied())
                .collect();
            for (store, quantity) in pairs {
                for _ in 0..quantity {
                    let name = format!(
                        "{}_{}",
                        self.defs.primitive_types[ty_ix].id, self.primitive_counts[ty_ix]
                    );
                    self.primitive_counts[ty_ix] += 1;
                    let id = PrimitiveId(self.primitives.insert(Primitive {
                        name,
                        ty,
                        whereabouts: PrimitiveWhere::Store(store),
                    }));
                    self.queues[store.0].force_put(Token::Primitive(id));
                }
            }
        }
    }

    pub(crate) fn start_sources(&mut self) {
        for src_ix in 0..self.defs.sources.len() {
            let src = SrcIx(src_ix);
            if !self.defs.sources[src_ix].orders.is_empty() {
                for order in self.defs.sources[src_ix].orders.clone() {
                    let release = self.defs.orders[order].release_time;
                    self.clock.schedule_at(
                        crate::sim::seconds(release),
                        Wake::OrderRelease { source: src, order },
                    );
                }
                continue;
            }
            let Some(tm) = self.defs.sources[src_ix].time_model else {
                continue;
            };
            match self.sample(tm, &TimeContext::default()) {
                Some(delta) => self.clock.schedule_in(delta, Wake::SourceTick(src)),
                None => self.sources[src_ix].exhausted = true,
            }
        }
    }

    pub(crate) fn arm_schedule(&mut self) {
        for (i, entry) in self.defs.schedule.iter().enumerate() {
            self.clock
                .schedule_at(crate::sim::seconds(entry.time), Wake::ScheduleFire(i));
        }
    }

    // -- timed sources ------------------------------------------------------

    pub(crate) fn source_tick(&mut self, src: SrcIx) {
        if self.sources[src.0].exhausted {
            return;
        }
        let is_order_source = !self.defs.sources[src.0].orders.is_empty();
        if is_order_source {
            self.drain_backlog(src);
            return;
        }

        if self.conwip_reached() {
            self.sources[src.0].waiting_conwip = true;
            return;
        }
        let port = self.defs.sources[src.0].output_ports[0];
        if !self.queues[port.0].has_space() {
            self.queues[port.0].wait_put(Wake::SourceTick(src));
            return;
        }
        let ty = self.defs.sources[src.0].product_type;
        let Some(product) = self.create_product(ty, port, src) else {
            // Carried primitives are out of stock; retry when storages move.
            for storage in self.carried_primitive_storages(ty) {
                self.queues[storage.0].wait_get(Wake::SourceTick(src));
            }
            return;
        };
        self.emit_product(product, port, src);

        let tm = self.defs.sources[src.0].time_model.unwrap();
        match self.sample(tm, &TimeContext::default()) {
            Some(delta) => self.clock.schedule_in(delta, Wake::SourceTick(src)),
            None => self.sources[src.0].exhausted = true,
        }
    }

    // -- order sources ------------------------------------------------------

    pub(crate) fn order_release(&mut self, src: SrcIx, order: usize) {
        let items = self.defs.orders[order].items.clone();
        debug!(
            order = %self.defs.orders[order].id,
            source = %self.defs.sources[src.0].id,
            "order released"
        );
        for (ty, quantity) in items {
            for _ in 0..quantity {
                self.sources[src.0].backlog.push_back(ty);
            }
        }
        self.drain_backlog(src);
    }

    fn drain_backlog(&mut self, src: SrcIx) {
        while let Some(ty) = self.sources[src.0].backlog.front().copied() {
            if self.conwip_reached() {
                self.sources[src.0].waiting_conwip = true;
                return;
            }
            let port = self.defs.sources[src.0].output_ports[0];
            if !self.queues[port.0].has_space() {
                self.queues[port.0].wait_put(Wake::SourceTick(src));
                return;
            }
            let Some(product) = self.create_product(ty, port, src) else {
                for storage in self.carried_primitive_storages(ty) {
                    self.queues[storage.0].wait_get(Wake::SourceTick(src));
                }
                return;
            };
            self.sources[src.0].backlog.pop_front();
            self.emit_product(product, port, src);
        }
    }

    // -- product creation ---------------------------------------------------

    pub(crate) fn conwip_reached(&self) -> bool {
        match self.defs.conwip {
            Some(cap) => self.live_products >= cap,
            None => false,
        }
    }

    /// Resumes every source suspended on the ConWIP cap.
    pub(crate) fn wake_conwip_sources(&mut self) {
        for src_ix in 0..self.sources.len() {
            if self.sources[src_ix].waiting_conwip {
                self.sources[src_ix].waiting_conwip = false;
                self.clock.schedule_now(Wake::SourceTick(SrcIx(src_ix)));
            }
        }
    }

    fn carried_primitive_storages(&self, ty: ProdTypeIx) -> Vec<PortIx> {
        let mut out = Vec::new();
        for dep in &self.defs.product_types[ty.0].dependencies {
            if let DepKind::Primitive { ty: prim } = self.defs.dependencies[dep.0].kind {
                out.extend(self.defs.primitive_types[prim.0].storages.iter().copied());
            }
        }
        out
    }

    /// Builds a product instance, claiming one carried primitive per
    /// product-level primitive dependency. Returns `None` (and takes
    /// nothing) when stock is missing.
    fn create_product(&mut self, ty: ProdTypeIx, at: PortIx, _src: SrcIx) -> Option<ProductId> {
        let mut carried: SmallVec<PrimitiveId, 2> = SmallVec::new();
        let deps = self.defs.product_types[ty.0].dependencies.clone();
        for dep in deps {
            let DepKind::Primitive { ty: prim } = self.defs.dependencies[dep.0].kind else {
                continue;
            };
            let storages = self.defs.primitive_types[prim.0].storages.clone();
            let mut taken = None;
            for store in storages {
                let candidate = self.queues[store.0].find_available(|t| match t {
                    Token::Primitive(p) => self.primitives[p.0].ty == prim,
                    Token::Product(_) => false,
                });
                if let Some(Token::Primitive(p)) = candidate {
                    self.commit_get(store, Token::Primitive(p));
                    taken = Some(p);
                    break;
                }
            }
            match taken {
                Some(p) => carried.push(p),
                None => {
                    // Roll back anything already claimed.
                    for p in carried {
                        self.place_primitive_in_store(p);
                    }
                    return None;
                }
            }
        }

        let plan_len = self.defs.product_types[ty.0].plan.steps.len();
        let name = format!("{}_{}", self.defs.product_types[ty.0].id, self.created_counts[ty.0]);
        self.created_counts[ty.0] += 1;
        let product = ProductId(self.products.insert(Product {
            name,
            ty,
            location: at,
            done: vec![false; plan_len],
            failed: None,
            reworked: false,
            carried: SmallVec::new(),
            created_at: self.now(),
            active_production: None,
            active_transport: None,
        }));
        for p in &carried {
            self.primitives[p.0].whereabouts = PrimitiveWhere::CarriedBy(product);
        }
        self.products[product.0].carried = carried;
        self.live_products += 1;
        Some(product)
    }

    /// Lands a fresh product in the source's output queue, logs the
    /// creation, and hands it to the router.
    fn emit_product(&mut self, product: ProductId, port: PortIx, src: SrcIx) {
        assert!(self.try_reserve_put(port));
        self.commit_put(port, Token::Product(product));
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.sources[src.0].id.clone(),
            self.defs.sources[src.0].id.clone(),
            None,
            Activity::CreateProduct,
        )
        .with_product(self.products[product.0].name.clone());
        self.push_record(record);
        self.clock.schedule_now(Wake::RouterPlan(product));
    }

    // -- schedule driver ----------------------------------------------------

    /// A pinned schedule entry: the product appears directly at the named
    /// resource's input and a matching request starts there.
    pub(crate) fn schedule_fire(&mut self, entry: usize) {
        let def = &self.defs.schedule[entry];
        let (resource, process, ty, expected_end) =
            (def.resource, def.process, def.product_type, def.expected_end);
        let input = self.defs.resources[resource.0].input_ports.first().copied();
        let Some(input) = input else {
            warn!(
                resource = %self.defs.resources[resource.0].id,
                "scheduled event targets a resource without input ports"
            );
            return;
        };
        let Some(product) = self.create_product(ty, input, SrcIx(0)) else {
            warn!("scheduled event could not claim carried primitives; skipped");
            return;
        };
        let wakes = self.queues[input.0].force_put(Token::Product(product));
        self.schedule_wakes(wakes);
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.resources[resource.0].id.clone(),
            self.defs.resources[resource.0].id.clone(),
            None,
            Activity::CreateProduct,
        )
        .with_product(self.products[product.0].name.clone());
        self.push_record(record);

        let plan_step = self.defs.product_types[ty.0]
            .plan
            .steps
            .iter()
            .position(|s| *s == process);
        let target = self.defs.resources[resource.0]
            .output_ports
            .first()
            .copied()
            .unwrap_or(self.defs.resources[resource.0].buffer);
        let primitives_needed = self.defs.resources[resource.0]
            .dependencies
            .iter()
            .filter_map(|d| match self.defs.dependencies[d.0].kind {
                DepKind::Primitive { ty } => Some(ty),
                _ => None,
            })
            .collect();
        let arrival = self.clock.next_seq();
        let request = RequestId(self.requests.insert(Request {
            kind: RequestKind::Production,
            resource,
            process,
            required: process,
            origin: input,
            target,
            cargo: Token::Product(product),
            plan_step,
            arrival,
            deps: DepProgress {
                primitives_needed,
                ..DepProgress::default()
            },
            started: false,
            cancelled: false,
            lot: None,
            parent: None,
        }));
        let _ = expected_end;
        self.products[product.0].active_production = Some(request);
        self.enqueue_request(request);
    }

    // -- sinks --------------------------------------------------------------

    /// Drains every available matching product from a sink input queue.
    pub(crate) fn sink_take(&mut self, sink: SinkIx, port: PortIx) {
        let ty = self.defs.sinks[sink.0].product_type;
        loop {
            let candidate = self.queues[port.0].find_available(|t| match t {
                Token::Product(p) => self.products[p.0].ty == ty,
                Token::Primitive(_) => false,
            });
            let Some(Token::Product(product)) = candidate else {
                return;
            };
            self.commit_get(port, Token::Product(product));
            self.finish_product(product, sink);
        }
    }

    fn finish_product(&mut self, product: ProductId, sink: SinkIx) {
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.sinks[sink.0].id.clone(),
            self.defs.sinks[sink.0].id.clone(),
            None,
            Activity::FinishProduct,
        )
        .with_product(self.products[product.0].name.clone());
        self.push_record(record);
        debug!(product = %self.products[product.0].name, "finished");

        // A finished instance may live on as a primitive.
        if let Some(prim_ty) = self.defs.product_types[self.products[product.0].ty.0].becomes_primitive
        {
            let name = format!(
                "{}_{}",
                self.defs.primitive_types[prim_ty.0].id, self.primitive_counts[prim_ty.0]
            );
            self.primitive_counts[prim_ty.0] += 1;
            let id = PrimitiveId(self.primitives.insert(Primitive {
                name,
                ty: prim_ty,
                whereabouts: PrimitiveWhere::InTransit,
            }));
            self.place_primitive_in_store(id);
        }
        self.drop_product(product);
    }
}
