//! # Topology
//!
//! The topology graph connects function instances to the forwarders hosting them, and forwarders
//! to each other. It is rebuilt from an inventory snapshot for every scheduling operation and
//! never persisted.

mod graph;
pub mod search;

pub use graph::{NodeKind, TopologyGraph, TopologyNode};
pub use search::{shortest_path_length, weighted_shortest_path_cost};

use crate::inventory::InventoryError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Cannot read the inventory: {0}")]
    Inventory(#[from] InventoryError),
}
