//! # Persistence collaborator
//!
//! Boundary to the transactional key-value store. Every operation is scoped to one of the two
//! logical partitions. Implementations retry optimistic-concurrency conflicts on their own (see
//! [`retry`]) and only surface [`StoreError::Conflict`] once that budget is exhausted.

mod memory;
pub mod retry;

pub use memory::{Fault, MemoryStore, StoreOp};

use crate::model::{PathId, RenderedServicePath};
use std::collections::BTreeSet;
use thiserror::Error;

/// Logical partition of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Configuration,
    Operational,
}

/// Key of a record managed by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    RenderedPath(String),
    PathId(PathId),
    /// Paths traversing a forwarder.
    ForwarderState(String),
    /// Paths traversing a function instance.
    FunctionState(String),
    /// Paths placed on a function group as a whole.
    GroupState(String),
    /// Paths rendered from a path spec.
    PathSpecState(String),
}

/// Allocation state of a path id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathIdState {
    Free,
    Allocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathIdRecord {
    pub state: PathIdState,
    /// The symmetric id paired with this one.
    pub pair: Option<PathId>,
}

impl PathIdRecord {
    pub fn allocated(pair: Option<PathId>) -> Self {
        Self { state: PathIdState::Allocated, pair }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    RenderedPath(RenderedServicePath),
    PathId(PathIdRecord),
    PathNames(BTreeSet<String>),
}

impl Record {
    /// Combine `self` with `update` for a merge write. Name sets are unioned, everything else is
    /// replaced.
    pub fn merged(self, update: Record) -> Record {
        match (self, update) {
            (Record::PathNames(mut old), Record::PathNames(new)) => {
                old.extend(new);
                Record::PathNames(old)
            }
            (_, update) => update,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict that persisted through all retries.
    #[error("Conflict while writing {0:?}, retries exhausted")]
    Conflict(RecordKey),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Record {0:?} holds an unexpected value")]
    UnexpectedRecord(RecordKey),
}

/// Typed access to the store.
pub trait DataStore: Send + Sync {
    fn read(&self, partition: Partition, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// Write `record`, combining it with the existing value (see [`Record::merged`]).
    fn merge(&self, partition: Partition, key: RecordKey, record: Record) -> Result<(), StoreError>;

    /// Write `record`, replacing any existing value.
    fn put(&self, partition: Partition, key: RecordKey, record: Record) -> Result<(), StoreError>;

    /// Write `record` only if no record exists under `key`, atomically. Returns whether it was
    /// written.
    fn insert(&self, partition: Partition, key: RecordKey, record: Record) -> Result<bool, StoreError>;

    /// Delete the record. Deleting an absent record succeeds.
    fn delete(&self, partition: Partition, key: &RecordKey) -> Result<(), StoreError>;
}

/// Read a rendered path.
pub fn read_rendered_path(
    store: &dyn DataStore,
    name: &str,
) -> Result<Option<RenderedServicePath>, StoreError> {
    let key = RecordKey::RenderedPath(name.to_string());
    match store.read(Partition::Operational, &key)? {
        Some(Record::RenderedPath(rsp)) => Ok(Some(rsp)),
        Some(_) => Err(StoreError::UnexpectedRecord(key)),
        None => Ok(None),
    }
}

/// Read a set of path names. An absent record is an empty set.
pub fn read_path_names(store: &dyn DataStore, key: &RecordKey) -> Result<BTreeSet<String>, StoreError> {
    match store.read(Partition::Operational, key)? {
        Some(Record::PathNames(names)) => Ok(names),
        Some(_) => Err(StoreError::UnexpectedRecord(key.clone())),
        None => Ok(BTreeSet::new()),
    }
}
