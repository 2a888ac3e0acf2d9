use super::{Encapsulation, Transport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path identifier carried in the service header.
pub type PathId = u32;

/// Service index of the first hop. Every following hop decrements it by one.
pub const MAX_SERVICE_INDEX: u8 = 255;

/// What a hop steers traffic through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HopTarget {
    Function(String),
    Group(String),
}

impl HopTarget {
    pub fn name(&self) -> &str {
        match self {
            HopTarget::Function(n) | HopTarget::Group(n) => n,
        }
    }

    pub fn function(&self) -> Option<&str> {
        match self {
            HopTarget::Function(n) => Some(n),
            HopTarget::Group(_) => None,
        }
    }
}

impl fmt::Display for HopTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopTarget::Function(n) => write!(f, "{}", n),
            HopTarget::Group(n) => write!(f, "group {}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub hop_number: u8,
    pub service_index: u8,
    pub target: HopTarget,
    pub forwarder: String,
    pub forwarder_locator: Option<String>,
}

/// A scheduled realization of a path spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedServicePath {
    pub name: String,
    pub path_id: PathId,
    pub starting_index: u8,
    pub symmetric_path_id: Option<PathId>,
    pub transport: Transport,
    pub encapsulation: Encapsulation,
    pub path_spec: String,
    pub chain: String,
    /// Set on the generated return path of a symmetric pair.
    pub reverse: bool,
    pub hops: Vec<Hop>,
}

impl RenderedServicePath {
    /// Names of all distinct forwarders on the path, in traversal order.
    pub fn forwarders(&self) -> Vec<&str> {
        let mut result: Vec<&str> = Vec::new();
        for hop in &self.hops {
            if !result.contains(&hop.forwarder.as_str()) {
                result.push(&hop.forwarder);
            }
        }
        result
    }

    /// All distinct hop targets on the path, in traversal order.
    pub fn targets(&self) -> Vec<&HopTarget> {
        let mut result: Vec<&HopTarget> = Vec::new();
        for hop in &self.hops {
            if !result.contains(&&hop.target) {
                result.push(&hop.target);
            }
        }
        result
    }

    pub fn first_hop(&self) -> Option<&Hop> {
        self.hops.first()
    }
}

impl fmt::Display for RenderedServicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (path id {}, spec {})", self.name, self.path_id, self.path_spec)?;
        for hop in &self.hops {
            writeln!(
                f,
                "  hop {:>3} | si {:>3} | {} @ {}",
                hop.hop_number, hop.service_index, hop.target, hop.forwarder
            )?;
        }
        Ok(())
    }
}
