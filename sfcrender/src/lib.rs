//! # SfcRender
//!
//! This crate renders service function chains into rendered service paths. A chain is an ordered
//! list of function types; a rendered path is the ordered list of concrete function instances and
//! the forwarders hosting them, together with a path id and one service index per hop.
//!
//! ## Structure
//!
//! - [`topology`]: The topology graph built from an inventory snapshot, and the shortest path
//!   queries over it.
//! - [`scheduler`]: The placement strategies, selected through [`scheduler::SchedulerKind`].
//! - [`pathid`]: Allocation of path ids and their symmetric pairs.
//! - [`render`]: The [`render::RspRenderer`], which validates, schedules, allocates, persists and
//!   registers a rendered path, rolling everything back on failure. It also derives the reverse
//!   path of symmetric chains.
//! - [`service`]: A worker pool accepting render requests from many callers.
//! - [`store`] and [`inventory`]: The collaborator boundaries, with in-memory implementations.
//! - [`config`]: Renderer settings.
//! - [`example_topologies`]: Small inventories used in tests and by the binary.
//!
//! ## Usage
//!
//! ```
//! use sfcrender::example_topologies::{ExampleTopology, TwoForwarders};
//! use sfcrender::render::{CreateRequest, RspRenderer};
//! use sfcrender::store::MemoryStore;
//! use sfcrender::RendererConfig;
//! use std::sync::Arc;
//!
//! let inventory = Arc::new(TwoForwarders::inventory());
//! let store = Arc::new(MemoryStore::new());
//! let renderer = RspRenderer::new(inventory, store, RendererConfig::default()).unwrap();
//! let paths = renderer.create_rendered_path(&CreateRequest::new(TwoForwarders::PATH_SPEC)).unwrap();
//! let rsp = renderer.rendered_path(&paths.forward).unwrap().unwrap();
//! assert_eq!(rsp.hops.len(), 2);
//! ```

pub mod config;
pub mod example_topologies;
pub mod inventory;
pub mod model;
pub mod pathid;
pub mod render;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod topology;

#[cfg(test)]
mod test;

pub use config::{ConfigError, RendererConfig};
pub use render::{CreateRequest, RenderedPaths, RspRenderer};
pub use service::RenderService;

use inventory::InventoryError;
use model::FunctionType;
use pathid::PathIdError;
use scheduler::SchedulerError;
use store::{RecordKey, StoreError};
use thiserror::Error;
use topology::TopologyError;

/// Reason a render or delete request failed.
#[derive(Debug, Error)]
pub enum Error {
    /// The path spec does not exist.
    #[error("Path spec {0} not found")]
    PathSpecNotFound(String),
    /// The chain referenced by the path spec does not exist.
    #[error("Chain {chain} of path spec {path_spec} not found")]
    ChainNotFound { path_spec: String, chain: String },
    #[error("Chain {0} has no entries")]
    EmptyChain(String),
    /// More hops than service indices.
    #[error("A chain of {0} hops exceeds the service index range")]
    ChainTooLong(usize),
    /// A one-chain-only instance is already used by a path of another chain.
    #[error("Function {function} is restricted to one chain and already used by {used_by:?}")]
    OneChainOnlyViolation { function: String, used_by: Vec<String> },
    #[error("No feasible placement for chain entry {entry} of type {function_type}")]
    NoFeasiblePlacement { entry: String, function_type: FunctionType },
    #[error("{0} placements exceed the enumeration limit")]
    SearchSpaceTooLarge(usize),
    #[error("Function {0} is not attached to any known forwarder")]
    UnattachedFunction(String),
    #[error("Forwarder {0} not found")]
    ForwarderNotFound(String),
    #[error("Forwarder {0} has no unambiguous non-function locator")]
    AmbiguousForwarderLocator(String),
    #[error("No free path id left")]
    PathIdExhausted,
    #[error("Path id error: {0}")]
    PathId(PathIdError),
    /// A store write kept conflicting after the store's own retries.
    #[error("Persistence conflict on {0:?}")]
    PersistenceConflict(RecordKey),
    /// The path record was written, but a dependent record was not.
    #[error("Cannot write the dependent state of {path}: {source}")]
    PartialStateWriteFailure { path: String, source: StoreError },
    #[error("Rendered path {0} already exists")]
    RenderedPathExists(String),
    #[error("Rendered path {0} not found")]
    RenderedPathNotFound(String),
    /// A process-wide lock was not acquired within the configured wait. The request can be
    /// retried.
    #[error("Timed out waiting for a lock")]
    LockTimeout,
    #[error("Inventory Error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("Store Error: {0}")]
    Store(StoreError),
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("No answer within {0:?}")]
    RequestTimeout(std::time::Duration),
    #[error("The render service has stopped")]
    ServiceStopped,
}

// The store, path-id and scheduler errors are sorted into the kinds callers act on, so a
// conflict or lock timeout is retryable no matter which layer reported it.
impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(key) => Error::PersistenceConflict(key),
            e => Error::Store(e),
        }
    }
}

impl From<PathIdError> for Error {
    fn from(e: PathIdError) -> Self {
        match e {
            PathIdError::Exhausted => Error::PathIdExhausted,
            PathIdError::LockTimeout => Error::LockTimeout,
            PathIdError::Store(e) => e.into(),
            e => Error::PathId(e),
        }
    }
}

impl From<SchedulerError> for Error {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::NoFeasiblePlacement { entry, function_type } => {
                Error::NoFeasiblePlacement { entry, function_type }
            }
            SchedulerError::SearchSpaceTooLarge(n) => Error::SearchSpaceTooLarge(n),
            SchedulerError::LockTimeout => Error::LockTimeout,
        }
    }
}

impl Error {
    /// Whether the same request may succeed when sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout | Error::PersistenceConflict(_) | Error::RequestTimeout(_))
    }
}
