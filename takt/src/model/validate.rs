//! Single-pass model validation.
//!
//! Every cross-field consistency rule is checked here, after construction
//! and before the engine is built. The engine never runs on an unvalidated
//! model.

use crate::model::{PortData, ProcessData, ProductionSystem};
use crate::model::product::ProcessPlan;
use ahash::{AHashMap, AHashSet};
use derive_more::{Display, Error};
use tracing::warn;

#[derive(Debug, Clone, Display, Error)]
pub enum ValidationError {
    #[display("duplicate ID {_0:?}")]
    DuplicateId(#[error(not(source))] String),
    #[display("{kind} {id:?} references unknown {field} {target:?}")]
    UnresolvedReference {
        kind: &'static str,
        id: String,
        field: &'static str,
        target: String,
    },
    #[display("resource {_0:?} offers production processes but has no input port")]
    MissingInputPort(#[error(not(source))] String),
    #[display("resource {_0:?} offers production processes but has no output port")]
    MissingOutputPort(#[error(not(source))] String),
    #[display("no resource offers required process {process:?} of product {product:?}")]
    UnprovidedProcess { product: String, process: String },
    #[display("link transport process {process:?} references unknown locatable {target:?}")]
    UnknownLinkEndpoint { process: String, target: String },
    #[display("primitive {_0:?} declares mismatched storages and quantities")]
    MismatchedPrimitiveStock(#[error(not(source))] String),
    #[display("schedule entry at t={time} references unknown {field} {target:?}")]
    InvalidScheduleEntry {
        time: f64,
        field: &'static str,
        target: String,
    },
}

struct Ids<'m> {
    time_models: AHashSet<&'m str>,
    processes: AHashMap<&'m str, &'m ProcessData>,
    states: AHashSet<&'m str>,
    ports: AHashMap<&'m str, &'m PortData>,
    nodes: AHashSet<&'m str>,
    primitives: AHashSet<&'m str>,
    resources: AHashSet<&'m str>,
    products: AHashSet<&'m str>,
    dependencies: AHashSet<&'m str>,
    sources: AHashSet<&'m str>,
    sinks: AHashSet<&'m str>,
    orders: AHashSet<&'m str>,
}

/// Walks the whole configuration and returns every inconsistency found.
/// An empty result is the engine's precondition.
pub fn validate(system: &ProductionSystem) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let ids = Ids {
        time_models: system.time_model_data.iter().map(|t| t.id()).collect(),
        processes: system.process_data.iter().map(|p| (p.id(), p)).collect(),
        states: system.state_data.iter().map(|s| s.id()).collect(),
        ports: system.port_data.iter().map(|p| (p.id(), p)).collect(),
        nodes: system.node_data.iter().map(|n| n.id.as_str()).collect(),
        primitives: system.primitive_data.iter().map(|p| p.id.as_str()).collect(),
        resources: system.resource_data.iter().map(|r| r.id()).collect(),
        products: system.product_data.iter().map(|p| p.id.as_str()).collect(),
        dependencies: system.dependency_data.iter().map(|d| d.id()).collect(),
        sources: system.source_data.iter().map(|s| s.id.as_str()).collect(),
        sinks: system.sink_data.iter().map(|s| s.id.as_str()).collect(),
        orders: system.order_data.iter().map(|o| o.id.as_str()).collect(),
    };

    let mut seen: AHashSet<&str> = AHashSet::new();
    for id in system
        .time_model_data
        .iter()
        .map(|t| t.id())
        .chain(system.process_data.iter().map(|p| p.id()))
        .chain(system.state_data.iter().map(|s| s.id()))
        .chain(system.port_data.iter().map(|p| p.id()))
        .chain(system.node_data.iter().map(|n| n.id.as_str()))
        .chain(system.primitive_data.iter().map(|p| p.id.as_str()))
        .chain(system.resource_data.iter().map(|r| r.id()))
        .chain(system.product_data.iter().map(|p| p.id.as_str()))
        .chain(system.dependency_data.iter().map(|d| d.id()))
        .chain(system.source_data.iter().map(|s| s.id.as_str()))
        .chain(system.sink_data.iter().map(|s| s.id.as_str()))
        .chain(system.order_data.iter().map(|o| o.id.as_str()))
    {
        if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId(id.to_owned()));
        }
    }

    check_references(system, &ids, &mut errors);
    check_ports(system, &ids, &mut errors);
    check_process_coverage(system, &ids, &mut errors);
    check_links(system, &ids, &mut errors);
    check_schedule(system, &ids, &mut errors);
    warn_shared_coordinates(system);

    errors
}

fn unresolved(
    kind: &'static str,
    id: &str,
    field: &'static str,
    target: &str,
) -> ValidationError {
    ValidationError::UnresolvedReference {
        kind,
        id: id.to_owned(),
        field,
        target: target.to_owned(),
    }
}

fn check_references(system: &ProductionSystem, ids: &Ids, errors: &mut Vec<ValidationError>) {
    for process in &system.process_data {
        if let Some(tm) = process.time_model_id()
            && !ids.time_models.contains(tm)
        {
            errors.push(unresolved("process", process.id(), "time model", tm));
        }
        match process {
            ProcessData::Transport {
                id,
                loading_time_model_id,
                unloading_time_model_id,
                ..
            }
            | ProcessData::LinkTransport {
                id,
                loading_time_model_id,
                unloading_time_model_id,
                ..
            } => {
                for tm in [loading_time_model_id, unloading_time_model_id]
                    .into_iter()
                    .flatten()
                {
                    if !ids.time_models.contains(tm.as_str()) {
                        errors.push(unresolved("process", id, "time model", tm));
                    }
                }
            }
            ProcessData::Rework {
                id,
                reworked_process_ids,
                ..
            } => {
                for p in reworked_process_ids {
                    if !ids.processes.contains_key(p.as_str()) {
                        errors.push(unresolved("rework process", id, "process", p));
                    }
                }
            }
            ProcessData::Compound {
                id, process_ids, ..
            } => {
                for p in process_ids {
                    if !ids.processes.contains_key(p.as_str()) {
                        errors.push(unresolved("compound process", id, "process", p));
                    }
                }
            }
            ProcessData::ProcessModel {
                id, process_graph, ..
            } => {
                for (p, next) in process_graph {
                    for q in std::iter::once(p).chain(next) {
                        if !ids.processes.contains_key(q.as_str()) {
                            errors.push(unresolved("process model", id, "process", q));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    for state in &system.state_data {
        if !ids.time_models.contains(state.time_model_id()) {
            errors.push(unresolved("state", state.id(), "time model", state.time_model_id()));
        }
        match state {
            crate::model::StateData::BreakDown {
                id,
                repair_time_model_id,
                ..
            }
            | crate::model::StateData::ProcessBreakDown {
                id,
                repair_time_model_id,
                ..
            } => {
                if !ids.time_models.contains(repair_time_model_id.as_str()) {
                    errors.push(unresolved("state", id, "repair time model", repair_time_model_id));
                }
            }
            crate::model::StateData::NonScheduled {
                id,
                non_scheduled_time_model_id,
                ..
            } => {
                if !ids.time_models.contains(non_scheduled_time_model_id.as_str()) {
                    errors.push(unresolved(
                        "state",
                        id,
                        "non-scheduled time model",
                        non_scheduled_time_model_id,
                    ));
                }
            }
            crate::model::StateData::Setup {
                id,
                origin_setup,
                target_setup,
                ..
            } => {
                for p in [origin_setup, target_setup] {
                    if !ids.processes.contains_key(p.as_str()) {
                        errors.push(unresolved("setup state", id, "process", p));
                    }
                }
            }
            _ => {}
        }
        if let crate::model::StateData::ProcessBreakDown { id, process_id, .. } = state
            && !ids.processes.contains_key(process_id.as_str())
        {
            errors.push(unresolved("state", id, "process", process_id));
        }
    }

    for resource in &system.resource_data {
        for p in resource.process_ids() {
            if !ids.processes.contains_key(p.as_str()) {
                errors.push(unresolved("resource", resource.id(), "process", p));
            }
        }
        for s in resource.state_ids() {
            if !ids.states.contains(s.as_str()) {
                errors.push(unresolved("resource", resource.id(), "state", s));
            }
        }
        for q in resource.port_ids() {
            if !ids.ports.contains_key(q.as_str()) {
                errors.push(unresolved("resource", resource.id(), "port", q));
            }
        }
        for d in resource.dependency_ids() {
            if !ids.dependencies.contains(d.as_str()) {
                errors.push(unresolved("resource", resource.id(), "dependency", d));
            }
        }
        if let crate::model::ResourceData::SystemResource {
            id,
            subresource_ids,
            ..
        } = resource
        {
            for sub in subresource_ids {
                if !ids.resources.contains(sub.as_str()) {
                    errors.push(unresolved("system resource", id, "sub-resource", sub));
                }
            }
        }
    }

    for dep in &system.dependency_data {
        match dep {
            crate::model::DependencyData::Primitive {
                id,
                required_primitive,
                ..
            } => {
                if !ids.primitives.contains(required_primitive.as_str()) {
                    errors.push(unresolved("dependency", id, "primitive", required_primitive));
                }
            }
            crate::model::DependencyData::Resource {
                id,
                required_resource,
                ..
            } => {
                if !ids.resources.contains(required_resource.as_str()) {
                    errors.push(unresolved("dependency", id, "resource", required_resource));
                }
            }
            crate::model::DependencyData::Process {
                id,
                required_process,
                ..
            } => {
                if !ids.processes.contains_key(required_process.as_str()) {
                    errors.push(unresolved("dependency", id, "process", required_process));
                }
            }
            crate::model::DependencyData::Loading {
                id,
                loading_process,
                ..
            } => {
                if !ids.processes.contains_key(loading_process.as_str()) {
                    errors.push(unresolved("dependency", id, "loading process", loading_process));
                }
            }
            crate::model::DependencyData::Lot { .. } => {}
        }
    }

    for primitive in &system.primitive_data {
        if primitive.storages.len() != primitive.quantity_in_storages.len() {
            errors.push(ValidationError::MismatchedPrimitiveStock(primitive.id.clone()));
        }
        if !ids.processes.contains_key(primitive.transport_process.as_str()) {
            errors.push(unresolved(
                "primitive",
                &primitive.id,
                "transport process",
                &primitive.transport_process,
            ));
        }
        for storage in &primitive.storages {
            match ids.ports.get(storage.as_str()) {
                Some(port) if port.is_store() => {}
                _ => errors.push(unresolved("primitive", &primitive.id, "store", storage)),
            }
        }
    }

    for product in &system.product_data {
        if !ids.processes.contains_key(product.transport_process.as_str()) {
            errors.push(unresolved(
                "product",
                &product.id,
                "transport process",
                &product.transport_process,
            ));
        }
        for p in plan_processes(&product.processes) {
            if !ids.processes.contains_key(p) {
                errors.push(unresolved("product", &product.id, "process", p));
            }
        }
        for d in &product.dependency_ids {
            if !ids.dependencies.contains(d.as_str()) {
                errors.push(unresolved("product", &product.id, "dependency", d));
            }
        }
        if let Some(prim) = &product.becomes_primitive
            && !ids.primitives.contains(prim.as_str())
        {
            errors.push(unresolved("product", &product.id, "primitive", prim));
        }
    }

    for source in &system.source_data {
        if !ids.products.contains(source.product_type.as_str()) {
            errors.push(unresolved("source", &source.id, "product type", &source.product_type));
        }
        if let Some(tm) = &source.time_model_id
            && !ids.time_models.contains(tm.as_str())
        {
            errors.push(unresolved("source", &source.id, "time model", tm));
        }
        for q in &source.output_queue_ids {
            if !ids.ports.contains_key(q.as_str()) {
                errors.push(unresolved("source", &source.id, "queue", q));
            }
        }
        for o in &source.order_ids {
            if !ids.orders.contains(o.as_str()) {
                errors.push(unresolved("source", &source.id, "order", o));
            }
        }
        if source.time_model_id.is_none() && source.order_ids.is_empty() {
            errors.push(unresolved("source", &source.id, "time model", "<none>"));
        }
    }

    for sink in &system.sink_data {
        if !ids.products.contains(sink.product_type.as_str()) {
            errors.push(unresolved("sink", &sink.id, "product type", &sink.product_type));
        }
        for q in &sink.input_queue_ids {
            if !ids.ports.contains_key(q.as_str()) {
                errors.push(unresolved("sink", &sink.id, "queue", q));
            }
        }
    }

    for order in &system.order_data {
        for op in &order.ordered_products {
            if !ids.products.contains(op.product_type.as_str()) {
                errors.push(unresolved("order", &order.id, "product type", &op.product_type));
            }
        }
    }
}

fn plan_processes(plan: &ProcessPlan) -> Vec<&str> {
    match plan {
        ProcessPlan::Sequence(steps) => steps.iter().map(|s| s.as_str()).collect(),
        ProcessPlan::Graph(adjacency) => adjacency
            .iter()
            .flat_map(|(p, next)| std::iter::once(p.as_str()).chain(next.iter().map(|n| n.as_str())))
            .collect(),
    }
}

fn check_ports(system: &ProductionSystem, ids: &Ids, errors: &mut Vec<ValidationError>) {
    for resource in &system.resource_data {
        let offers_production = resource.process_ids().iter().any(|p| {
            ids.processes
                .get(p.as_str())
                .is_some_and(|proc| !proc.is_transport())
        });
        // Resources without declared ports get default queues at build.
        if !offers_production || resource.port_ids().is_empty() {
            continue;
        }
        let ports: Vec<_> = resource
            .port_ids()
            .iter()
            .filter_map(|q| ids.ports.get(q.as_str()))
            .collect();
        if !ports.iter().any(|p| p.interface().accepts_input()) {
            errors.push(ValidationError::MissingInputPort(resource.id().to_owned()));
        }
        if !ports.iter().any(|p| p.interface().accepts_output()) {
            errors.push(ValidationError::MissingOutputPort(resource.id().to_owned()));
        }
    }
}

/// Structural coverage check: every required process of every product type
/// must be offered by at least one resource. Capability requirements match
/// offered capabilities; compound and process-model requirements recurse.
fn check_process_coverage(system: &ProductionSystem, ids: &Ids, errors: &mut Vec<ValidationError>) {
    let mut offered_ids: AHashSet<&str> = AHashSet::new();
    let mut offered_capabilities: AHashSet<&str> = AHashSet::new();
    for resource in &system.resource_data {
        for p in resource.process_ids() {
            let Some(process) = ids.processes.get(p.as_str()) else {
                continue;
            };
            collect_offers(process, ids, &mut offered_ids, &mut offered_capabilities);
        }
    }

    for product in &system.product_data {
        for step in plan_processes(&product.processes) {
            let Some(process) = ids.processes.get(step) else {
                continue;
            };
            if !requirement_covered(process, ids, &offered_ids, &offered_capabilities) {
                errors.push(ValidationError::UnprovidedProcess {
                    product: product.id.clone(),
                    process: step.to_owned(),
                });
            }
        }
    }
}

fn collect_offers<'m>(
    process: &'m ProcessData,
    ids: &Ids<'m>,
    offered_ids: &mut AHashSet<&'m str>,
    offered_capabilities: &mut AHashSet<&'m str>,
) {
    offered_ids.insert(process.id());
    match process {
        ProcessData::Capability { capability, .. }
        | ProcessData::LinkTransport { capability, .. } => {
            if !capability.is_empty() {
                offered_capabilities.insert(capability);
            }
        }
        ProcessData::Compound { process_ids, .. } => {
            for p in process_ids {
                if let Some(inner) = ids.processes.get(p.as_str()) {
                    collect_offers(inner, ids, offered_ids, offered_capabilities);
                }
            }
        }
        _ => {}
    }
}

fn requirement_covered(
    process: &ProcessData,
    ids: &Ids,
    offered_ids: &AHashSet<&str>,
    offered_capabilities: &AHashSet<&str>,
) -> bool {
    match process {
        ProcessData::RequiredCapability { capability, .. } => {
            offered_capabilities.contains(capability.as_str())
        }
        ProcessData::Capability { capability, .. } => {
            offered_capabilities.contains(capability.as_str())
        }
        ProcessData::Compound { process_ids, .. } => process_ids.iter().any(|p| {
            ids.processes
                .get(p.as_str())
                .is_some_and(|inner| requirement_covered(inner, ids, offered_ids, offered_capabilities))
        }),
        ProcessData::ProcessModel { process_graph, .. } => process_graph.iter().all(|(p, _)| {
            ids.processes
                .get(p.as_str())
                .is_some_and(|inner| requirement_covered(inner, ids, offered_ids, offered_capabilities))
        }),
        _ => offered_ids.contains(process.id()),
    }
}

fn check_links(system: &ProductionSystem, ids: &Ids, errors: &mut Vec<ValidationError>) {
    let locatable = |id: &str| {
        ids.resources.contains(id)
            || ids.nodes.contains(id)
            || ids.sources.contains(id)
            || ids.sinks.contains(id)
            || ids.ports.contains_key(id)
    };
    for process in &system.process_data {
        if let ProcessData::LinkTransport { id, links, .. } = process {
            for link in links {
                for end in link {
                    if !locatable(end) {
                        errors.push(ValidationError::UnknownLinkEndpoint {
                            process: id.clone(),
                            target: end.clone(),
                        });
                    }
                }
            }
        }
    }
}

fn check_schedule(system: &ProductionSystem, ids: &Ids, errors: &mut Vec<ValidationError>) {
    for entry in &system.schedule {
        if !ids.resources.contains(entry.resource.as_str()) {
            errors.push(ValidationError::InvalidScheduleEntry {
                time: entry.time,
                field: "resource",
                target: entry.resource.clone(),
            });
        }
        if !ids.processes.contains_key(entry.process.as_str()) {
            errors.push(ValidationError::InvalidScheduleEntry {
                time: entry.time,
                field: "process",
                target: entry.process.clone(),
            });
        }
        if !ids.products.contains(entry.product.as_str()) {
            errors.push(ValidationError::InvalidScheduleEntry {
                time: entry.time,
                field: "product",
                target: entry.product.clone(),
            });
        }
    }
}

/// Shared coordinates are permitted (queues and their owning resource often
/// coincide) but worth surfacing when two physical entities collide.
fn warn_shared_coordinates(system: &ProductionSystem) {
    let mut by_location: AHashMap<(u64, u64), &str> = AHashMap::new();
    let physical = system
        .resource_data
        .iter()
        .map(|r| (r.id(), r.location()))
        .chain(system.node_data.iter().map(|n| (n.id.as_str(), n.location)));
    for (id, location) in physical {
        let key = (location[0].to_bits(), location[1].to_bits());
        if let Some(other) = by_location.insert(key, id)
            && other != id
        {
            warn!(a = other, b = id, "locatables share identical coordinates");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn minimal() -> ProductionSystem {
        ProductionSystem {
            time_model_data: vec![TimeModelData::Function {
                id: "tm".into(),
                description: String::new(),
                distribution_function: time_model::DistributionFunction::Constant,
                location: 1.0,
                scale: 0.0,
                batch_size: 100,
            }],
            process_data: vec![ProcessData::Production {
                id: "p1".into(),
                description: String::new(),
                time_model_id: "tm".into(),
                failure_rate: 0.0,
            }],
            resource_data: vec![ResourceData::Resource {
                id: "m1".into(),
                description: String::new(),
                location: [0.0, 0.0],
                capacity: 1,
                process_ids: vec!["p1".into()],
                state_ids: vec![],
                control_policy: ControlPolicy::Fifo,
                port_ids: vec![],
                dependency_ids: vec![],
            }],
            product_data: vec![ProductData {
                id: "prod".into(),
                description: String::new(),
                processes: product::ProcessPlan::Sequence(vec!["p1".into()]),
                transport_process: "p1".into(),
                routing_heuristic: RoutingHeuristic::Fifo,
                dependency_ids: vec![],
                becomes_primitive: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn minimal_model_passes() {
        assert!(validate(&minimal()).is_empty());
    }

    #[test]
    fn duplicate_ids_are_reported() {
        let mut system = minimal();
        system.process_data.push(ProcessData::Production {
            id: "p1".into(),
            description: String::new(),
            time_model_id: "tm".into(),
            failure_rate: 0.0,
        });
        let errors = validate(&system);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateId(id) if id == "p1")));
    }

    #[test]
    fn dangling_time_model_is_reported() {
        let mut system = minimal();
        system.process_data.push(ProcessData::Production {
            id: "p2".into(),
            description: String::new(),
            time_model_id: "missing".into(),
            failure_rate: 0.0,
        });
        let errors = validate(&system);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnresolvedReference { target, .. } if target == "missing")));
    }

    #[test]
    fn unprovided_process_is_reported() {
        let mut system = minimal();
        system.process_data.push(ProcessData::Production {
            id: "p2".into(),
            description: String::new(),
            time_model_id: "tm".into(),
            failure_rate: 0.0,
        });
        system.product_data[0].processes =
            product::ProcessPlan::Sequence(vec!["p1".into(), "p2".into()]);
        let errors = validate(&system);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnprovidedProcess { process, .. } if process == "p2")));
    }
}
