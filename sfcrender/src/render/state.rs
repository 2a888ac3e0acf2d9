//! Operational records that depend on rendered paths.
//!
//! Every rendered path registers its name under each forwarder it traverses, under each
//! function instance or group it steers through, and under its path spec. Instances and groups
//! are kept in separate records, so a group may share its name with an instance. The records are plain
//! name sets; a set that becomes empty is deleted.

use crate::model::{HopTarget, RenderedServicePath};
use crate::store::{read_path_names, DataStore, Partition, Record, RecordKey, StoreError};
use log::*;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct StateCoordinator {
    store: Arc<dyn DataStore>,
    // serializes the read-modify-write of removals against concurrent additions
    write_lock: Mutex<()>,
}

impl StateCoordinator {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store, write_lock: Mutex::new(()) }
    }

    /// Keys of all records the path registers under: forwarders first, then hop targets, then
    /// the path spec. Each key appears once.
    pub fn keys_of(rsp: &RenderedServicePath) -> Vec<RecordKey> {
        let mut keys: Vec<RecordKey> = rsp.forwarders().into_iter().map(|f| RecordKey::ForwarderState(f.to_string())).collect();
        keys.extend(rsp.targets().into_iter().map(|t| match t {
            HopTarget::Function(name) => RecordKey::FunctionState(name.clone()),
            HopTarget::Group(name) => RecordKey::GroupState(name.clone()),
        }));
        keys.push(RecordKey::PathSpecState(rsp.path_spec.clone()));
        keys
    }

    /// Add `path` to the name set stored under `key`.
    pub fn add_path(&self, key: &RecordKey, path: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut names = BTreeSet::new();
        names.insert(path.to_string());
        self.store.merge(Partition::Operational, key.clone(), Record::PathNames(names))?;
        trace!("Registered {} under {:?}", path, key);
        Ok(())
    }

    /// Remove `path` from the name set stored under `key`, deleting the record once it is empty.
    pub fn remove_path(&self, key: &RecordKey, path: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut names = read_path_names(self.store.as_ref(), key)?;
        if !names.remove(path) {
            return Ok(());
        }
        if names.is_empty() {
            self.store.delete(Partition::Operational, key)?;
        } else {
            self.store.put(Partition::Operational, key.clone(), Record::PathNames(names))?;
        }
        trace!("Unregistered {} from {:?}", path, key);
        Ok(())
    }

    /// Register a path under all of its dependent records. Stops at the first failure and returns
    /// the keys written so far together with the error.
    pub fn register(&self, rsp: &RenderedServicePath) -> Result<Vec<RecordKey>, (Vec<RecordKey>, StoreError)> {
        let mut written = Vec::new();
        for key in Self::keys_of(rsp) {
            if let Err(e) = self.add_path(&key, &rsp.name) {
                return Err((written, e));
            }
            written.push(key);
        }
        Ok(written)
    }

    /// Remove a path from all of its dependent records. Every record is attempted; the first
    /// error is returned.
    pub fn unregister(&self, rsp: &RenderedServicePath) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in Self::keys_of(rsp) {
            if let Err(e) = self.remove_path(&key, &rsp.name) {
                warn!("Cannot unregister {} from {:?}: {}", rsp.name, key, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn paths_of_function(&self, function: &str) -> Result<BTreeSet<String>, StoreError> {
        read_path_names(self.store.as_ref(), &RecordKey::FunctionState(function.to_string()))
    }

    pub fn paths_of_group(&self, group: &str) -> Result<BTreeSet<String>, StoreError> {
        read_path_names(self.store.as_ref(), &RecordKey::GroupState(group.to_string()))
    }

    pub fn paths_of_forwarder(&self, forwarder: &str) -> Result<BTreeSet<String>, StoreError> {
        read_path_names(self.store.as_ref(), &RecordKey::ForwarderState(forwarder.to_string()))
    }

    pub fn paths_of_path_spec(&self, path_spec: &str) -> Result<BTreeSet<String>, StoreError> {
        read_path_names(self.store.as_ref(), &RecordKey::PathSpecState(path_spec.to_string()))
    }
}
