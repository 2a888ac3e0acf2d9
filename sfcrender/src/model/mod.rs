//! # Data model
//!
//! Inventory records (function instances, forwarders, chains and path specs) are read-only to the
//! renderer. The rendered service path and its hops are produced by the renderer and owned by the
//! store once written.

mod rsp;
mod types;

pub use rsp::{Hop, HopTarget, PathId, RenderedServicePath, MAX_SERVICE_INDEX};
pub use types::{
    AttachedFunction, Chain, ChainEntry, DataPlaneLocator, Encapsulation, Forwarder,
    ForwarderAttachment, ForwarderLink, FunctionGroup, FunctionInstance, FunctionType,
    FunctionTypeDef, HopOverride, LoadSample, PathSpec, Transport,
};
