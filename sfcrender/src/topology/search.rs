//! Shortest path queries over the topology graph. Both queries are read-only and deterministic
//! for a fixed graph.

use super::TopologyGraph;
use petgraph::algo::dijkstra;
use petgraph::prelude::*;
use std::collections::VecDeque;

/// Number of edges on the shortest path from `a` to `b`, ignoring weights. A path has at least
/// one edge, so `a == b` is unreachable unless `a` has a self loop.
pub fn shortest_path_length(topo: &TopologyGraph, a: NodeIndex, b: NodeIndex) -> Option<usize> {
    let graph = topo.graph();
    if a.index() >= graph.node_count() || b.index() >= graph.node_count() {
        return None;
    }
    if a == b {
        return graph.find_edge(a, a).map(|_| 1);
    }

    let mut dist: Vec<Option<usize>> = vec![None; graph.node_count()];
    let mut queue = VecDeque::new();
    dist[a.index()] = Some(0);
    queue.push_back(a);
    while let Some(u) = queue.pop_front() {
        let d = dist[u.index()].unwrap_or(0);
        for v in graph.neighbors(u) {
            if dist[v.index()].is_some() {
                continue;
            }
            if v == b {
                return Some(d + 1);
            }
            dist[v.index()] = Some(d + 1);
            queue.push_back(v);
        }
    }
    None
}

/// Minimal total weight of a path from `a` to `b`. Same reachability rules as
/// [`shortest_path_length`].
pub fn weighted_shortest_path_cost(topo: &TopologyGraph, a: NodeIndex, b: NodeIndex) -> Option<u64> {
    let graph = topo.graph();
    if a.index() >= graph.node_count() || b.index() >= graph.node_count() {
        return None;
    }
    if a == b {
        return graph.find_edge(a, a).map(|e| u64::from(graph[e]));
    }
    let costs = dijkstra(graph, a, Some(b), |e| u64::from(*e.weight()));
    costs.get(&b).copied()
}
