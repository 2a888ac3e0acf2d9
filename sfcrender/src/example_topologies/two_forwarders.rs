use super::ExampleTopology;
use crate::inventory::InMemoryInventory;
use crate::model::{
    AttachedFunction, Chain, DataPlaneLocator, Forwarder, ForwarderAttachment, FunctionInstance,
    FunctionTypeDef, PathSpec,
};

/// Firewall `A` behind forwarder `F1`, DPI engine `B` behind forwarder `F2`, and a link between
/// the two forwarders.
///
/// ```text
///   A        B
///   |        |
///   F1 ---- F2
/// ```
pub struct TwoForwarders {}

impl TwoForwarders {
    /// Same chain as [`ExampleTopology::PATH_SPEC`], flagged symmetric.
    pub const SYMMETRIC_PATH_SPEC: &'static str = "web-symmetric";
    /// Chain with a type that has no instance.
    pub const UNPLACEABLE_PATH_SPEC: &'static str = "wan";

    fn function(name: &str, function_type: &str, forwarder: &str, subnet: u8) -> FunctionInstance {
        let mut function = FunctionInstance::new(name, function_type);
        function.management_address = Some(format!("172.16.0.{}", subnet));
        function.locators.push(DataPlaneLocator::new(format!("{}-vxlan", name), format!("10.{}.0.10", subnet)));
        function.attachments.push(ForwarderAttachment {
            forwarder: forwarder.to_string(),
            forwarder_locator: Some(format!("{}-to-{}", forwarder, name)),
        });
        function
    }

    fn forwarder(name: &str, function: &str, peer: &str, subnet: u8) -> Forwarder {
        Forwarder::new(name)
            .with_locator(DataPlaneLocator::new(format!("{}-to-{}", name, function), format!("10.{}.0.1", subnet)))
            .with_locator(DataPlaneLocator::new(format!("{}-eth0", name), format!("192.168.{}.1", subnet)).non_function())
            .with_function(
                function,
                AttachedFunction { locator: Some(format!("{}-to-{}", name, function)), weight: None },
            )
            .with_link(peer, None)
    }
}

impl ExampleTopology for TwoForwarders {
    const PATH_SPEC: &'static str = "web";

    fn inventory() -> InMemoryInventory {
        let inventory = InMemoryInventory::new();
        inventory.add_function_type(FunctionTypeDef { name: "firewall".into(), ..Default::default() });
        inventory.add_function_type(FunctionTypeDef { name: "dpi".into(), ..Default::default() });

        inventory.add_function(Self::function("A", "firewall", "F1", 1));
        inventory.add_function(Self::function("B", "dpi", "F2", 2));
        inventory.add_forwarder(Self::forwarder("F1", "A", "F2", 1));
        inventory.add_forwarder(Self::forwarder("F2", "B", "F1", 2));

        inventory.add_chain(Chain::new("firewall-dpi", &["firewall", "dpi"]));
        inventory.add_chain(Chain::new("firewall-wan", &["firewall", "wan-optimizer"]));

        let mut web = PathSpec::new(Self::PATH_SPEC, "firewall-dpi");
        web.scheduler = Some("shortest-path".to_string());
        let mut symmetric = web.clone();
        symmetric.name = Self::SYMMETRIC_PATH_SPEC.to_string();
        symmetric.symmetric = Some(true);
        let mut wan = PathSpec::new(Self::UNPLACEABLE_PATH_SPEC, "firewall-wan");
        wan.scheduler = Some("shortest-path".to_string());

        inventory.add_path_spec(web);
        inventory.add_path_spec(symmetric);
        inventory.add_path_spec(wan);
        inventory
    }
}
