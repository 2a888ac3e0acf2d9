//! # Example topologies
//!
//! Small inventories used in the tests and by the binary. Every topology implements
//! [`ExampleTopology`], which builds a fresh [`InMemoryInventory`] holding the functions,
//! forwarders, chains and path specs of the topology.

use crate::inventory::InMemoryInventory;

mod ring;
mod two_forwarders;

pub use ring::Ring;
pub use two_forwarders::TwoForwarders;

/// Trait that all example topologies implement.
pub trait ExampleTopology {
    /// Path spec rendered by default.
    const PATH_SPEC: &'static str;

    /// Build the inventory.
    fn inventory() -> InMemoryInventory;
}

/// Build the inventory of an example topology by name.
pub fn by_name(name: &str) -> Option<InMemoryInventory> {
    match name.to_ascii_lowercase().replace('_', "-").as_str() {
        "two-forwarders" => Some(TwoForwarders::inventory()),
        "ring" => Some(Ring::inventory()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inventory::Inventory;

    #[test]
    fn test_by_name() {
        assert!(by_name("Two_Forwarders").is_some());
        assert!(by_name("ring").is_some());
        assert!(by_name("mesh").is_none());
    }

    #[test]
    fn test_default_path_specs_exist() {
        assert!(TwoForwarders::inventory().path_spec(TwoForwarders::PATH_SPEC).unwrap().is_some());
        assert!(Ring::inventory().path_spec(Ring::PATH_SPEC).unwrap().is_some());
    }
}
