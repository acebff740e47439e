//! The process matcher.
//!
//! A static precomputation performed once after validation. Processes are
//! reduced to structural signatures (production by ID, capability by
//! capability string, link transport by canonical link topology plus
//! capability); two processes match iff a requirement signature equals an
//! offer signature. The router then answers "who can run this step" and
//! "who can move this item from here to there" with O(1) lookups.

use crate::model::time_model::DistanceMetric;
use crate::sim::engine::{Defs, ProcessKind};
use crate::sim::path::{LinkGraph, shortest_route};
use crate::sim::{Locatable, PortIx, ProcIx, ResIx};
use ahash::AHashMap;

type Candidates = Vec<(ResIx, ProcIx)>;

#[derive(Debug, Default)]
pub(crate) struct Matcher {
    production: AHashMap<ProcIx, Candidates>,
    rework: AHashMap<ProcIx, Candidates>,
    transport: AHashMap<(PortIx, PortIx, ProcIx), Candidates>,
    graphs: AHashMap<ProcIx, LinkGraph>,
    routes: AHashMap<(ProcIx, Locatable, Locatable), Option<(Vec<Locatable>, f64)>>,
}

impl Matcher {
    pub fn build(defs: &Defs) -> Self {
        let mut matcher = Matcher::default();

        for (i, process) in defs.processes.iter().enumerate() {
            if let ProcessKind::LinkTransport { links, .. } = &process.kind {
                matcher.graphs.insert(ProcIx(i), LinkGraph::from_links(links));
            }
        }

        // Offer tables keyed by signature, in resource declaration order.
        // System cells offer their declared processes whole (the cell runs
        // a compound or process model as one unit); leaf resources expand
        // grouped processes into their members.
        let mut offered_production: AHashMap<String, Candidates> = AHashMap::new();
        let mut offered_transport: AHashMap<String, Candidates> = AHashMap::new();
        for (r, resource) in defs.resources.iter().enumerate() {
            let rix = ResIx(r);
            let is_cell = !resource.subresources.is_empty();
            let mut offers: Vec<ProcIx> = Vec::new();
            if is_cell {
                offers.extend(resource.processes.iter().copied());
            } else {
                for p in &resource.processes {
                    expand_offer(defs, *p, &mut offers);
                }
            }
            for p in offers {
                let process = &defs.processes[p.0];
                if let ProcessKind::Rework { reworked, .. } = &process.kind {
                    for failed in reworked {
                        matcher.rework.entry(*failed).or_default().push((rix, p));
                    }
                }
                let table = if process.is_transport() {
                    &mut offered_transport
                } else {
                    &mut offered_production
                };
                for sig in offer_signatures(defs, p, is_cell) {
                    let entry = table.entry(sig).or_default();
                    if !entry.contains(&(rix, p)) {
                        entry.push((rix, p));
                    }
                }
            }
        }

        // Production compatibility for every process appearing as a plan
        // step of any product type.
        for ty in &defs.product_types {
            for step in &ty.plan.steps {
                matcher.production.entry(*step).or_insert_with(|| {
                    gather(defs, *step, &offered_production)
                });
            }
        }
        // Rework processes are routed like plan steps too.
        let rework_targets: Vec<ProcIx> = matcher
            .rework
            .values()
            .flat_map(|c| c.iter().map(|(_, p)| *p))
            .collect();
        for p in rework_targets {
            matcher
                .production
                .entry(p)
                .or_insert_with(|| gather(defs, p, &offered_production));
        }

        // Transport compatibility over all ordered port pairs for every
        // transport requirement in the model; this also pre-tests
        // reachability and warms the route cache.
        let mut required_transports: Vec<ProcIx> = Vec::new();
        for ty in &defs.product_types {
            if !required_transports.contains(&ty.transport) {
                required_transports.push(ty.transport);
            }
        }
        for ty in &defs.primitive_types {
            if !required_transports.contains(&ty.transport) {
                required_transports.push(ty.transport);
            }
        }
        for required in &required_transports {
            let candidates = gather(defs, *required, &offered_transport);
            for origin in 0..defs.ports.len() {
                for target in 0..defs.ports.len() {
                    if origin == target {
                        continue;
                    }
                    let key = (PortIx(origin), PortIx(target), *required);
                    let mut feasible = Candidates::new();
                    for (rix, p) in &candidates {
                        if matcher.pair_feasible(defs, *p, PortIx(origin), PortIx(target)) {
                            feasible.push((*rix, *p));
                        }
                    }
                    matcher.transport.insert(key, feasible);
                }
            }
        }

        matcher
    }

    pub fn production_candidates(&self, required: ProcIx) -> &[(ResIx, ProcIx)] {
        self.production
            .get(&required)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rework_candidates(&self, failed: ProcIx) -> &[(ResIx, ProcIx)] {
        self.rework.get(&failed).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transport_candidates(
        &self,
        required: ProcIx,
        origin: PortIx,
        target: PortIx,
    ) -> &[(ResIx, ProcIx)] {
        self.transport
            .get(&(origin, target, required))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Maps a journey endpoint into the link graph of `process`: the
    /// locatable itself when linked, otherwise its owner.
    pub fn graph_endpoint(&self, defs: &Defs, process: ProcIx, locatable: Locatable) -> Option<Locatable> {
        let graph = self.graphs.get(&process)?;
        if graph.contains(locatable) {
            return Some(locatable);
        }
        if let Locatable::Port(p) = locatable
            && let Some(owner) = defs.ports[p.0].owner
            && graph.contains(owner)
        {
            return Some(owner);
        }
        None
    }

    fn pair_feasible(&mut self, defs: &Defs, process: ProcIx, origin: PortIx, target: PortIx) -> bool {
        match &defs.processes[process.0].kind {
            ProcessKind::Transport { .. } => true,
            ProcessKind::LinkTransport { .. } => {
                let (Some(from), Some(to)) = (
                    self.graph_endpoint(defs, process, Locatable::Port(origin)),
                    self.graph_endpoint(defs, process, Locatable::Port(target)),
                ) else {
                    return false;
                };
                self.route(defs, process, from, to).is_some()
            }
            _ => false,
        }
    }

    /// Cached shortest route for a link-transport process between two graph
    /// nodes. Computed on first use; positions of graph nodes are static.
    pub fn route(
        &mut self,
        defs: &Defs,
        process: ProcIx,
        origin: Locatable,
        target: Locatable,
    ) -> Option<(Vec<Locatable>, f64)> {
        let key = (process, origin, target);
        if !self.routes.contains_key(&key) {
            let metric = link_metric(defs, process);
            let result = self.graphs.get(&process).and_then(|graph| {
                shortest_route(graph, origin, target, |l| defs.location_of(l), metric)
            });
            self.routes.insert(key, result);
        }
        self.routes[&key].clone()
    }
}

/// The metric a link-transport process measures its segments with: its
/// distance time model's metric, euclidean otherwise.
pub(crate) fn link_metric(defs: &Defs, process: ProcIx) -> DistanceMetric {
    if let Some(tm) = defs.processes[process.0].time_model()
        && let crate::model::TimeModelData::Distance { metric, .. } = &defs.time_models[tm.0]
    {
        return *metric;
    }
    DistanceMetric::Euclidean
}

fn expand_offer(defs: &Defs, process: ProcIx, out: &mut Vec<ProcIx>) {
    match &defs.processes[process.0].kind {
        ProcessKind::Compound { members } => {
            for m in members {
                expand_offer(defs, *m, out);
            }
        }
        ProcessKind::ProcessModel { graph } => {
            for (m, _) in graph {
                expand_offer(defs, *m, out);
            }
        }
        _ => {
            if !out.contains(&process) {
                out.push(process);
            }
        }
    }
}

/// Signatures under which a concrete process is offered. `whole` is set for
/// system cells, which offer grouped processes as single units.
fn offer_signatures(defs: &Defs, process: ProcIx, whole: bool) -> Vec<String> {
    let def = &defs.processes[process.0];
    match &def.kind {
        ProcessKind::Production { .. } => vec![format!("prod:{}", def.id)],
        ProcessKind::Capability { capability, .. } => vec![format!("cap:{capability}")],
        ProcessKind::Transport { .. } => vec![format!("trans:{}", def.id)],
        ProcessKind::LinkTransport { capability, .. } => {
            let mut sigs = vec![link_signature(defs, process)];
            if !capability.is_empty() {
                sigs.push(format!("transcap:{capability}"));
            }
            sigs
        }
        ProcessKind::Rework { .. } => vec![format!("rework:{}", def.id)],
        ProcessKind::Compound { .. } | ProcessKind::ProcessModel { .. } if whole => {
            vec![format!("prod:{}", def.id)]
        }
        _ => Vec::new(),
    }
}

/// Signatures a requirement queries, in preference order.
fn requirement_signatures(defs: &Defs, process: ProcIx, out: &mut Vec<String>) {
    let def = &defs.processes[process.0];
    match &def.kind {
        ProcessKind::Production { .. } => out.push(format!("prod:{}", def.id)),
        ProcessKind::Capability { capability, .. } => out.push(format!("cap:{capability}")),
        ProcessKind::RequiredCapability { capability } => {
            out.push(format!("cap:{capability}"));
            out.push(format!("transcap:{capability}"));
        }
        ProcessKind::Transport { .. } => out.push(format!("trans:{}", def.id)),
        ProcessKind::LinkTransport { capability, .. } => {
            out.push(link_signature(defs, process));
            if !capability.is_empty() {
                out.push(format!("transcap:{capability}"));
            }
        }
        ProcessKind::Rework { .. } => out.push(format!("rework:{}", def.id)),
        ProcessKind::Compound { members } => {
            // A cell offering the whole group matches first; leaf members
            // satisfy the requirement individually otherwise.
            out.push(format!("prod:{}", def.id));
            for m in members {
                requirement_signatures(defs, *m, out);
            }
        }
        ProcessKind::ProcessModel { .. } => out.push(format!("prod:{}", def.id)),
        ProcessKind::Loading { .. } => {}
    }
}

/// Canonical structural identity of a link-transport process: capability
/// plus the sorted edge list.
fn link_signature(defs: &Defs, process: ProcIx) -> String {
    let ProcessKind::LinkTransport {
        links, capability, ..
    } = &defs.processes[process.0].kind
    else {
        return String::new();
    };
    let mut edges: Vec<String> = links
        .iter()
        .map(|(from, to)| format!("{}>{}", defs.locatable_name(*from), defs.locatable_name(*to)))
        .collect();
    edges.sort();
    format!("link:{capability}:{}", edges.join(","))
}

fn gather(defs: &Defs, required: ProcIx, offered: &AHashMap<String, Candidates>) -> Candidates {
    let mut sigs = Vec::new();
    requirement_signatures(defs, required, &mut sigs);
    let mut out = Candidates::new();
    for sig in sigs {
        if let Some(candidates) = offered.get(&sig) {
            for c in candidates {
                if !out.contains(c) {
                    out.push(*c);
                }
            }
        }
    }
    out
}
