use super::ExampleTopology;
use crate::inventory::{InMemoryInventory, InventoryDocument};
use crate::model::{
    Chain, Forwarder, ForwarderLink, FunctionInstance, FunctionTypeDef, LoadSample, PathSpec,
};
use maplit::btreemap;

/// Six forwarders `r0 .. r5` connected in a ring. Every forwarder hosts one firewall, one DPI
/// engine and one NAT. DPI is bidirectional, so the default chain gets a reverse path.
///
/// Load grows along the ring: the instances on `ri` run at `10 * i` percent CPU. The link
/// `r5 - r0` is ten times as expensive as the others.
pub struct Ring {}

impl Ring {
    pub const SIZE: usize = 6;

    fn forwarder_name(i: usize) -> String {
        format!("r{}", i % Self::SIZE)
    }
}

impl ExampleTopology for Ring {
    const PATH_SPEC: &'static str = "ring";

    fn inventory() -> InMemoryInventory {
        let mut doc = InventoryDocument {
            function_types: vec![
                FunctionTypeDef { name: "firewall".into(), ..Default::default() },
                FunctionTypeDef { name: "dpi".into(), bidirectional: true, ..Default::default() },
                FunctionTypeDef { name: "nat".into(), ..Default::default() },
            ],
            chains: vec![Chain::new("ring-chain", &["firewall", "dpi", "nat"])],
            path_specs: vec![PathSpec::new(Self::PATH_SPEC, "ring-chain")],
            ..Default::default()
        };

        for i in 0..Self::SIZE {
            let name = Self::forwarder_name(i);
            let next = Self::forwarder_name(i + 1);
            let weight = if i + 1 == Self::SIZE { 10 } else { 1 };
            doc.forwarders.push(Forwarder {
                links: btreemap! { next => ForwarderLink { weight: Some(weight) } },
                ..Forwarder::new(name.clone())
            });
            for (prefix, function_type) in &[("fw", "firewall"), ("dpi", "dpi"), ("nat", "nat")] {
                let function = format!("{}-{}", prefix, i);
                doc.monitoring.insert(function.clone(), LoadSample::new(10.0 * i as f64, 20.0));
                doc.functions.push(FunctionInstance::new(function, *function_type).attached_to(name.clone()));
            }
        }
        InMemoryInventory::from_document(doc)
    }
}
