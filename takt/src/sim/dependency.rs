//! The dependency manager.
//!
//! Requests acquire their dependencies in one fixed global order —
//! primitive, resource, process, loading, lot — so that two controllers
//! can never hold halves of each other's requirements. Partial
//! acquisitions are rolled back on every early exit; the one exception is
//! primitives that have already been physically fetched, which stay staged
//! at the resource until the request runs or is cancelled.

use crate::sim::clock::Wake;
use crate::sim::engine::{DepKind, PrimitiveWhere, World};
use crate::sim::log::{Activity, EventRecord};
use crate::sim::request::TransportPurpose;
use crate::sim::{PortIx, PrimTypeIx, PrimitiveId, RequestId, ResIx, SimulationError, Token};
use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use tracing::{debug, warn};

impl World {
    /// Primitive and co-resource acquisition for every member of a lot.
    /// Returns true when the lot may start. On false, co-locks taken during
    /// this attempt are released; staged primitives stay.
    pub(crate) fn acquire_dependencies(&mut self, resource: ResIx, lot: &[RequestId]) -> bool {
        // Primitives first.
        for member in lot {
            if !self.ensure_primitives(resource, *member) {
                return false;
            }
        }

        // Then co-resources. `per_lot` locks one holder for the whole lot.
        let deps = self.defs.resources[resource.0].dependencies.clone();
        let mut taken: SmallVec<(RequestId, ResIx), 2> = SmallVec::new();
        for dep in &deps {
            let DepKind::Resource {
                resource: co,
                per_lot,
            } = self.defs.dependencies[dep.0].kind
            else {
                continue;
            };
            let holders: &[RequestId] = if per_lot { &lot[..1] } else { lot };
            for member in holders {
                if self.try_lock_resource(co) {
                    self.requests[member.0].deps.resources_locked.push(co);
                    taken.push((*member, co));
                    let record = EventRecord::new(
                        self.now_seconds(),
                        self.defs.resources[co.0].id.clone(),
                        self.defs.dependencies[dep.0].id.clone(),
                        None,
                        Activity::StartState,
                    )
                    .with_dependency(self.defs.dependencies[dep.0].id.clone())
                    .with_requesting_item(self.token_name(self.requests[member.0].cargo));
                    self.push_record(record);
                } else {
                    // Roll back this attempt's locks and wait for release.
                    for (req, locked) in taken {
                        self.unlock_resource(locked);
                        self.requests[req.0].deps.resources_locked.pop();
                    }
                    self.resources[co.0]
                        .lock_waiters
                        .push(Wake::ControllerPoll(resource));
                    return false;
                }
            }
        }
        true
    }

    fn try_lock_resource(&mut self, resource: ResIx) -> bool {
        let rt = &self.resources[resource.0];
        let def = &self.defs.resources[resource.0];
        if rt.down() || rt.busy + rt.locked >= def.capacity {
            false
        } else {
            self.resources[resource.0].locked += 1;
            true
        }
    }

    fn unlock_resource(&mut self, resource: ResIx) {
        let rt = &mut self.resources[resource.0];
        rt.locked = rt.locked.saturating_sub(1);
        let waiters = std::mem::take(&mut rt.lock_waiters);
        self.schedule_wakes(waiters);
        self.clock.schedule_now(Wake::ControllerPoll(resource));
    }

    /// True when every primitive the request needs is staged at the
    /// resource. Fetch transports are dispatched for anything missing.
    fn ensure_primitives(&mut self, resource: ResIx, request: RequestId) -> bool {
        if self.requests[request.0].deps.primitives_ready() {
            return true;
        }
        if self.requests[request.0].deps.primitives_inbound > 0 {
            return false;
        }
        let needed = std::mem::take(&mut self.requests[request.0].deps.primitives_needed);
        let mut all_dispatched = true;
        for ty in needed {
            match self.begin_primitive_fetch(resource, request, ty) {
                Ok(()) => {
                    self.requests[request.0].deps.primitives_inbound += 1;
                }
                Err(()) => {
                    self.requests[request.0].deps.primitives_needed.push(ty);
                    all_dispatched = false;
                }
            }
        }
        // Even when all fetches are under way the lot cannot start yet.
        let _ = all_dispatched;
        false
    }

    /// Finds an instance of `ty` in a store and dispatches a fetch
    /// transport toward the requesting resource's staging area.
    fn begin_primitive_fetch(
        &mut self,
        resource: ResIx,
        request: RequestId,
        ty: PrimTypeIx,
    ) -> Result<(), ()> {
        let type_def = &self.defs.primitive_types[ty.0];
        let storages = type_def.storages.clone();
        let transport = type_def.transport;
        let target_location = self.defs.resources[resource.0].location;

        // Nearest store first, declaration order on ties.
        let mut ordered: Vec<PortIx> = storages.clone();
        ordered.sort_by_key(|s| {
            OrderedFloat(crate::model::time_model::DistanceMetric::Euclidean.measure(
                self.port_location(*s),
                target_location,
            ))
        });

        let mut found: Option<(PortIx, PrimitiveId)> = None;
        for store in &ordered {
            let candidate = self.queues[store.0].find_available(|t| match t {
                Token::Primitive(p) => self.primitives[p.0].ty == ty,
                Token::Product(_) => false,
            });
            if let Some(Token::Primitive(p)) = candidate {
                found = Some((*store, p));
                break;
            }
        }

        let Some((store, primitive)) = found else {
            if self.live_primitives_of(ty) == 0 {
                self.fatal = Some(SimulationError::DependencyUnsatisfiable {
                    primitive: self.defs.primitive_types[ty.0].id.clone(),
                });
            } else {
                // All instances are in use; retry when any storage changes.
                for store in &storages {
                    self.queues[store.0].wait_get(Wake::ControllerPoll(resource));
                }
            }
            return Err(());
        };

        let buffer = self.defs.resources[resource.0].buffer;
        let cargo = Token::Primitive(primitive);
        // Claim the instance before the transporter travels to it.
        self.queues[store.0].try_reserve_get(cargo);
        assert!(self.try_reserve_put(buffer));
        let stamp = self.requests[request.0].arrival;
        let dispatched = self.dispatch_transport(
            cargo,
            store,
            buffer,
            transport,
            TransportPurpose::PrimitiveFetch {
                consumer: request,
                stamp,
            },
        );
        if dispatched.is_none() {
            warn!(
                primitive = %self.defs.primitive_types[ty.0].id,
                resource = %self.defs.resources[resource.0].id,
                "no transporter can fetch primitive"
            );
            self.queues[store.0].release_get(cargo);
            self.release_put(buffer);
            return Err(());
        }
        debug!(
            primitive = %self.primitives[primitive.0].name,
            to = %self.defs.resources[resource.0].id,
            "primitive fetch dispatched"
        );
        Ok(())
    }

    pub(crate) fn live_primitives_of(&self, ty: PrimTypeIx) -> usize {
        self.primitives.iter().filter(|(_, p)| p.ty == ty).count()
    }

    /// A fetched primitive landed in the consumer's staging area.
    pub(crate) fn primitive_arrived(&mut self, consumer: RequestId, cargo: Token, port: PortIx) {
        let Token::Primitive(primitive) = cargo else {
            return;
        };
        let consumer_alive = self
            .requests
            .get(consumer.0)
            .is_some_and(|r| !r.cancelled);
        if !consumer_alive {
            // The request died while the fetch was in flight; send the
            // instance home and let a fully-drained cancelled request
            // unwind.
            let mut drained = false;
            if let Some(req) = self.requests.get_mut(consumer.0)
                && req.cancelled
            {
                req.deps.primitives_inbound = req.deps.primitives_inbound.saturating_sub(1);
                drained = req.deps.primitives_inbound == 0;
            }
            if drained {
                self.unwind_cancelled_request(consumer);
            }
            self.return_primitive_from(primitive, port);
            return;
        }
        let resource = self.requests[consumer.0].resource;
        self.primitives[primitive.0].whereabouts = PrimitiveWhere::Resource(resource);
        let deps = &mut self.requests[consumer.0].deps;
        deps.primitives_inbound = deps.primitives_inbound.saturating_sub(1);
        deps.primitives_held.push(primitive);

        let dep_id = self.primitive_dep_id(resource, self.primitives[primitive.0].ty);
        let record = EventRecord::new(
            self.now_seconds(),
            self.defs.resources[resource.0].id.clone(),
            dep_id.clone(),
            None,
            Activity::StartState,
        )
        .with_dependency(dep_id)
        .with_requesting_item(self.token_name(self.requests[consumer.0].cargo));
        self.push_record(record);

        self.clock.schedule_now(Wake::ControllerPoll(resource));
    }

    fn primitive_dep_id(&self, resource: ResIx, ty: PrimTypeIx) -> String {
        for dep in &self.defs.resources[resource.0].dependencies {
            if let DepKind::Primitive { ty: dep_ty } = self.defs.dependencies[dep.0].kind
                && dep_ty == ty
            {
                return self.defs.dependencies[dep.0].id.clone();
            }
        }
        self.defs.primitive_types[ty.0].id.clone()
    }

    /// Releases everything a finished (or dying) request holds.
    pub(crate) fn release_dependencies(&mut self, resource: ResIx, request: RequestId) {
        let held = std::mem::take(&mut self.requests[request.0].deps.primitives_held);
        for primitive in held {
            let dep_id = self.primitive_dep_id(resource, self.primitives[primitive.0].ty);
            let record = EventRecord::new(
                self.now_seconds(),
                self.defs.resources[resource.0].id.clone(),
                dep_id.clone(),
                None,
                Activity::EndState,
            )
            .with_dependency(dep_id)
            .with_requesting_item(self.token_name(self.requests[request.0].cargo));
            self.push_record(record);

            let buffer = self.defs.resources[resource.0].buffer;
            self.return_primitive_from(primitive, buffer);
        }

        let locked = std::mem::take(&mut self.requests[request.0].deps.resources_locked);
        for co in locked {
            let record = EventRecord::new(
                self.now_seconds(),
                self.defs.resources[co.0].id.clone(),
                self.defs.resources[co.0].id.clone(),
                None,
                Activity::EndState,
            )
            .with_dependency(self.defs.resources[co.0].id.clone())
            .with_requesting_item(self.token_name(self.requests[request.0].cargo));
            self.push_record(record);
            self.unlock_resource(co);
        }
    }

    /// Sends a primitive sitting in `from` back to the nearest store with
    /// free space. Consumable types are destroyed instead.
    pub(crate) fn return_primitive_from(&mut self, primitive: PrimitiveId, from: PortIx) {
        let ty = self.primitives[primitive.0].ty;
        let type_def = &self.defs.primitive_types[ty.0];
        if type_def.consumable {
            self.queues[from.0].release_get(Token::Primitive(primitive));
            if self.queues[from.0].contains(Token::Primitive(primitive)) {
                self.commit_get(from, Token::Primitive(primitive));
            }
            self.primitives.remove(primitive.0);
            return;
        }
        let transport = type_def.transport;
        let origin_location = self.port_location(from);
        let mut stores = type_def.storages.clone();
        stores.sort_by_key(|s| {
            OrderedFloat(crate::model::time_model::DistanceMetric::Euclidean.measure(
                self.port_location(*s),
                origin_location,
            ))
        });
        let Some(target) = stores.iter().copied().find(|s| {
            *s != from && self.queues[s.0].has_space()
        }) else {
            // Nowhere to go; the instance stays where it is.
            return;
        };
        if !self.try_reserve_put(target) {
            return;
        }
        let cargo = Token::Primitive(primitive);
        self.queues[from.0].try_reserve_get(cargo);
        if self
            .dispatch_transport(cargo, from, target, transport, TransportPurpose::PrimitiveReturn)
            .is_none()
        {
            self.queues[from.0].release_get(cargo);
            self.release_put(target);
        }
    }
}
