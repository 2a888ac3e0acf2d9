use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a class of functions, e.g. `firewall` or `dpi`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionType(pub String);

impl FunctionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FunctionType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Registry entry for a function type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionTypeDef {
    pub name: FunctionType,
    /// Traffic through functions of this type must also traverse them on the way back.
    #[serde(default)]
    pub bidirectional: bool,
    /// Instance names registered for this type. May lag behind the function records.
    #[serde(default)]
    pub instances: Vec<String>,
}

/// A data-plane locator on a function or forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneLocator {
    pub name: String,
    pub address: String,
    /// Set on forwarder locators that face other forwarders instead of functions.
    #[serde(default)]
    pub non_function: bool,
}

impl DataPlaneLocator {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self { name: name.into(), address: address.into(), non_function: false }
    }

    pub fn non_function(mut self) -> Self {
        self.non_function = true;
        self
    }
}

/// The forwarder side of a function attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderAttachment {
    pub forwarder: String,
    #[serde(default)]
    pub forwarder_locator: Option<String>,
}

/// A deployed function instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInstance {
    pub name: String,
    pub function_type: FunctionType,
    #[serde(default)]
    pub management_address: Option<String>,
    #[serde(default)]
    pub locators: Vec<DataPlaneLocator>,
    #[serde(default)]
    pub attachments: Vec<ForwarderAttachment>,
    /// The instance may only serve rendered paths of a single chain. Any number of paths of that
    /// chain may share it.
    #[serde(default)]
    pub one_chain_only: bool,
}

impl FunctionInstance {
    pub fn new(name: impl Into<String>, function_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function_type: FunctionType(function_type.into()),
            management_address: None,
            locators: Vec::new(),
            attachments: Vec::new(),
            one_chain_only: false,
        }
    }

    /// Attach the instance to `forwarder`.
    pub fn attached_to(mut self, forwarder: impl Into<String>) -> Self {
        self.attachments.push(ForwarderAttachment { forwarder: forwarder.into(), forwarder_locator: None });
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.one_chain_only = true;
        self
    }
}

/// Entry in the forwarder's function dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttachedFunction {
    /// Forwarder locator facing the function.
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub weight: Option<u32>,
}

/// Entry in the forwarder's link dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForwarderLink {
    #[serde(default)]
    pub weight: Option<u32>,
}

/// A service function forwarder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Forwarder {
    pub name: String,
    #[serde(default)]
    pub management_address: Option<String>,
    #[serde(default)]
    pub locators: Vec<DataPlaneLocator>,
    #[serde(default)]
    pub functions: BTreeMap<String, AttachedFunction>,
    #[serde(default)]
    pub links: BTreeMap<String, ForwarderLink>,
}

impl Forwarder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_locator(mut self, locator: DataPlaneLocator) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn with_function(mut self, function: impl Into<String>, entry: AttachedFunction) -> Self {
        self.functions.insert(function.into(), entry);
        self
    }

    pub fn with_link(mut self, peer: impl Into<String>, weight: Option<u32>) -> Self {
        self.links.insert(peer.into(), ForwarderLink { weight });
        self
    }
}

/// A named set of interchangeable instances of one function type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionGroup {
    pub name: String,
    pub function_type: FunctionType,
    pub members: Vec<String>,
}

/// Latest monitoring sample of a function instance, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub cpu: f64,
    pub memory: f64,
}

impl LoadSample {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self { cpu, memory }
    }

    /// Remaining capacity, `100 - max(cpu, memory)`.
    pub fn headroom(&self) -> f64 {
        100.0 - self.cpu.max(self.memory)
    }
}

/// One element of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub name: String,
    pub function_type: FunctionType,
    /// Place the group as a whole instead of a single instance.
    #[serde(default)]
    pub group: Option<String>,
}

impl ChainEntry {
    pub fn of_type(function_type: impl Into<String>) -> Self {
        let function_type = function_type.into();
        Self { name: function_type.clone(), function_type: FunctionType(function_type), group: None }
    }
}

/// Ordered list of required function types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    pub entries: Vec<ChainEntry>,
}

impl Chain {
    pub fn new(name: impl Into<String>, types: &[&str]) -> Self {
        Self { name: name.into(), entries: types.iter().map(|t| ChainEntry::of_type(*t)).collect() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Explicit placement of one hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopOverride {
    pub hop_number: usize,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub forwarder: Option<String>,
}

impl HopOverride {
    pub fn function(hop_number: usize, function: impl Into<String>) -> Self {
        Self { hop_number, function: Some(function.into()), group: None, forwarder: None }
    }

    pub fn group(hop_number: usize, group: impl Into<String>) -> Self {
        Self { hop_number, function: None, group: Some(group.into()), forwarder: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    VxlanGpe,
    Mpls,
    Mac,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::VxlanGpe
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encapsulation {
    Nsh,
    Transparent,
}

impl Default for Encapsulation {
    fn default() -> Self {
        Encapsulation::Nsh
    }
}

/// Binding of a chain to a name and its scheduling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathSpec {
    pub name: String,
    pub chain: String,
    #[serde(default)]
    pub hops: Vec<HopOverride>,
    /// `None` leaves the decision to the bidirectional flag of the chain's types.
    #[serde(default)]
    pub symmetric: Option<bool>,
    /// Overrides the configured scheduler for this path spec.
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub encapsulation: Encapsulation,
}

impl PathSpec {
    pub fn new(name: impl Into<String>, chain: impl Into<String>) -> Self {
        Self { name: name.into(), chain: chain.into(), ..Default::default() }
    }
}
