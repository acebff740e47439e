//! Shortest-path search over link-transport graphs.
//!
//! A link-transport process defines a directed graph over locatables; the
//! finder returns the cheapest route by summed segment distance under the
//! process's metric. Ties resolve by insertion order, keeping runs
//! deterministic.

use crate::model::Location;
use crate::model::time_model::DistanceMetric;
use crate::sim::Locatable;
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Default)]
pub(crate) struct LinkGraph {
    pub nodes: Vec<Locatable>,
    adjacency: AHashMap<Locatable, Vec<Locatable>>,
}

impl LinkGraph {
    pub fn from_links(links: &[(Locatable, Locatable)]) -> Self {
        let mut graph = LinkGraph::default();
        for (from, to) in links {
            for node in [from, to] {
                if !graph.adjacency.contains_key(node) {
                    graph.adjacency.insert(*node, Vec::new());
                    graph.nodes.push(*node);
                }
            }
            let successors = graph.adjacency.get_mut(from).unwrap();
            if !successors.contains(to) {
                successors.push(*to);
            }
        }
        graph
    }

    pub fn contains(&self, node: Locatable) -> bool {
        self.adjacency.contains_key(&node)
    }

    fn successors(&self, node: Locatable) -> &[Locatable] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Dijkstra over the link graph. Returns the node sequence (origin first)
/// and the total distance, or `None` when the target is unreachable.
pub(crate) fn shortest_route(
    graph: &LinkGraph,
    origin: Locatable,
    target: Locatable,
    locate: impl Fn(Locatable) -> Location,
    metric: DistanceMetric,
) -> Option<(Vec<Locatable>, f64)> {
    if !graph.contains(origin) || !graph.contains(target) {
        return None;
    }

    let mut best: AHashMap<Locatable, f64> = AHashMap::new();
    let mut previous: AHashMap<Locatable, Locatable> = AHashMap::new();
    let mut heap = BinaryHeap::new();
    let mut tie = 0u64;

    best.insert(origin, 0.0);
    heap.push(Reverse((OrderedFloat(0.0), tie, origin)));

    while let Some(Reverse((OrderedFloat(cost), _, node))) = heap.pop() {
        if node == target {
            let mut route = vec![target];
            let mut cursor = target;
            while let Some(prev) = previous.get(&cursor) {
                route.push(*prev);
                cursor = *prev;
            }
            route.reverse();
            return Some((route, cost));
        }
        if best.get(&node).is_some_and(|b| cost > *b) {
            continue;
        }
        let from = locate(node);
        for next in graph.successors(node) {
            let segment = metric.measure(from, locate(*next));
            let candidate = cost + segment;
            if best.get(next).is_none_or(|b| candidate < *b) {
                best.insert(*next, candidate);
                previous.insert(*next, node);
                tie += 1;
                heap.push(Reverse((OrderedFloat(candidate), tie, *next)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::NodeIx;

    fn node(n: usize) -> Locatable {
        Locatable::Node(NodeIx(n))
    }

    fn line_positions(l: Locatable) -> Location {
        match l {
            Locatable::Node(NodeIx(n)) => [n as f64, 0.0],
            _ => [0.0, 0.0],
        }
    }

    #[test]
    fn follows_the_only_route() {
        let graph = LinkGraph::from_links(&[(node(0), node(1)), (node(1), node(2))]);
        let (route, dist) =
            shortest_route(&graph, node(0), node(2), line_positions, DistanceMetric::Euclidean)
                .unwrap();
        assert_eq!(route, vec![node(0), node(1), node(2)]);
        assert_eq!(dist, 2.0);
    }

    #[test]
    fn prefers_the_cheaper_branch() {
        // 0 -> 3 directly, or 0 -> 1 -> 3; direct is longer in hops but
        // positions make it shorter.
        let positions = |l: Locatable| match l {
            Locatable::Node(NodeIx(0)) => [0.0, 0.0],
            Locatable::Node(NodeIx(1)) => [0.0, 5.0],
            Locatable::Node(NodeIx(3)) => [1.0, 0.0],
            _ => [0.0, 0.0],
        };
        let graph = LinkGraph::from_links(&[
            (node(0), node(1)),
            (node(1), node(3)),
            (node(0), node(3)),
        ]);
        let (route, dist) =
            shortest_route(&graph, node(0), node(3), positions, DistanceMetric::Euclidean).unwrap();
        assert_eq!(route, vec![node(0), node(3)]);
        assert_eq!(dist, 1.0);
    }

    #[test]
    fn respects_edge_direction() {
        let graph = LinkGraph::from_links(&[(node(0), node(1))]);
        assert!(
            shortest_route(&graph, node(1), node(0), line_positions, DistanceMetric::Euclidean)
                .is_none()
        );
    }

    #[test]
    fn disconnected_targets_are_unreachable() {
        let graph = LinkGraph::from_links(&[(node(0), node(1)), (node(2), node(3))]);
        assert!(
            shortest_route(&graph, node(0), node(3), line_positions, DistanceMetric::Euclidean)
                .is_none()
        );
    }
}
