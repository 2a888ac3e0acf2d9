use super::TopologyError;
use crate::inventory::{Inventory, InventorySnapshot};
use log::*;
use petgraph::prelude::*;
use std::collections::HashMap;

/// Weight of an edge without a configured weight.
pub const DEFAULT_WEIGHT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Function,
    Forwarder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyNode {
    pub name: String,
    pub kind: NodeKind,
}

/// Index-based topology graph. Nodes live in a flat array, edges are index pairs carrying a
/// weight.
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    graph: UnGraph<TopologyNode, u32>,
    functions: HashMap<String, NodeIndex>,
    forwarders: HashMap<String, NodeIndex>,
    weighted: bool,
}

impl TopologyGraph {
    /// Build the graph with all edge weights set to 1.
    pub fn build(snapshot: &InventorySnapshot) -> Self {
        Self::construct(snapshot, false)
    }

    /// Build the graph, copying the weights of the function dictionaries and the forwarder links.
    pub fn build_weighted(snapshot: &InventorySnapshot) -> Self {
        Self::construct(snapshot, true)
    }

    /// Take a fresh snapshot of the inventory and build the graph from it.
    pub fn from_inventory(inventory: &dyn Inventory, weighted: bool) -> Result<Self, TopologyError> {
        let snapshot = InventorySnapshot::load(inventory)?;
        Ok(Self::construct(&snapshot, weighted))
    }

    fn construct(snapshot: &InventorySnapshot, weighted: bool) -> Self {
        let mut topo = Self {
            graph: UnGraph::default(),
            functions: HashMap::new(),
            forwarders: HashMap::new(),
            weighted,
        };

        for function in snapshot.functions() {
            let idx = topo.graph.add_node(TopologyNode { name: function.name.clone(), kind: NodeKind::Function });
            topo.functions.insert(function.name.clone(), idx);
        }
        for forwarder in snapshot.forwarders() {
            let idx = topo.graph.add_node(TopologyNode { name: forwarder.name.clone(), kind: NodeKind::Forwarder });
            topo.forwarders.insert(forwarder.name.clone(), idx);
        }

        // attachments listed in the forwarder dictionaries carry the weights
        for forwarder in snapshot.forwarders() {
            let ff = topo.forwarders[&forwarder.name];
            for (function, entry) in &forwarder.functions {
                match topo.functions.get(function) {
                    Some(f) => {
                        let f = *f;
                        topo.connect(f, ff, entry.weight);
                    }
                    None => debug!("Forwarder {} lists unknown function {}", forwarder.name, function),
                }
            }
        }
        for function in snapshot.functions() {
            let f = topo.functions[&function.name];
            for attachment in &function.attachments {
                match topo.forwarders.get(&attachment.forwarder) {
                    Some(ff) => {
                        let ff = *ff;
                        if topo.graph.find_edge(f, ff).is_none() {
                            topo.connect(f, ff, None);
                        }
                    }
                    None => debug!("Function {} attaches to unknown forwarder {}", function.name, attachment.forwarder),
                }
            }
        }
        for forwarder in snapshot.forwarders() {
            let a = topo.forwarders[&forwarder.name];
            for (peer, link) in &forwarder.links {
                match topo.forwarders.get(peer) {
                    Some(b) => {
                        let b = *b;
                        topo.connect(a, b, link.weight);
                    }
                    None => warn!("Forwarder {} links to unknown forwarder {}", forwarder.name, peer),
                }
            }
        }

        trace!(
            "Built {} topology with {} nodes and {} edges",
            if weighted { "weighted" } else { "unweighted" },
            topo.graph.node_count(),
            topo.graph.edge_count()
        );
        topo
    }

    /// Add an edge, or lower the weight of an existing one. Links configured on both ends
    /// collapse into a single edge.
    fn connect(&mut self, a: NodeIndex, b: NodeIndex, weight: Option<u32>) {
        let weight = if self.weighted { weight.unwrap_or(DEFAULT_WEIGHT) } else { DEFAULT_WEIGHT };
        match self.graph.find_edge(a, b) {
            Some(e) => {
                let current = self.graph[e];
                self.graph[e] = current.min(weight);
            }
            None => {
                self.graph.add_edge(a, b, weight);
            }
        }
    }

    pub fn graph(&self) -> &UnGraph<TopologyNode, u32> {
        &self.graph
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn function_node(&self, name: &str) -> Option<NodeIndex> {
        self.functions.get(name).copied()
    }

    pub fn forwarder_node(&self, name: &str) -> Option<NodeIndex> {
        self.forwarders.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&TopologyNode> {
        self.graph.node_weight(idx)
    }

    /// Whether the function is attached to any forwarder.
    pub fn is_attached(&self, function: &str) -> bool {
        match self.function_node(function) {
            Some(idx) => self.graph.neighbors(idx).next().is_some(),
            None => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
