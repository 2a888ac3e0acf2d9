use super::retry::with_retries;
use super::{DataStore, Partition, Record, RecordKey, StoreError};
use log::*;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Store operation, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    Merge,
    Put,
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FaultKind {
    Conflict,
    Unavailable,
}

/// A failure injected into a [`MemoryStore`]. The fault fires on the next `attempts` matching
/// attempts and is removed afterwards.
#[derive(Debug, Clone)]
pub struct Fault {
    op: StoreOp,
    key: Option<RecordKey>,
    attempts: usize,
    kind: FaultKind,
}

impl Fault {
    /// Conflict on `attempts` consecutive attempts of `op` on `key`.
    pub fn conflict(op: StoreOp, key: RecordKey, attempts: usize) -> Self {
        Self { op, key: Some(key), attempts, kind: FaultKind::Conflict }
    }

    /// Conflict on `attempts` consecutive attempts of `op`, on any key.
    pub fn conflict_any(op: StoreOp, attempts: usize) -> Self {
        Self { op, key: None, attempts, kind: FaultKind::Conflict }
    }

    /// Fail the next attempt of `op` on `key` as unavailable.
    pub fn unavailable(op: StoreOp, key: RecordKey) -> Self {
        Self { op, key: Some(key), attempts: 1, kind: FaultKind::Unavailable }
    }

    fn matches(&self, op: StoreOp, key: &RecordKey) -> bool {
        self.op == op && self.key.as_ref().map(|k| k == key).unwrap_or(true)
    }

    fn error(&self, key: &RecordKey) -> StoreError {
        match self.kind {
            FaultKind::Conflict => StoreError::Conflict(key.clone()),
            FaultKind::Unavailable => StoreError::Unavailable(format!("injected fault on {:?}", key)),
        }
    }
}

/// In-memory implementation of the store, with fault injection for testing the compensation
/// paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(Partition, RecordKey), Record>>,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// All records of a partition, sorted by key.
    pub fn records(&self, partition: Partition) -> Vec<(RecordKey, Record)> {
        let mut result: Vec<_> = self
            .records
            .read()
            .iter()
            .filter(|((p, _), _)| *p == partition)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_fault(&self, op: StoreOp, key: &RecordKey) -> Result<(), StoreError> {
        let mut faults = self.faults.lock();
        if let Some(pos) = faults.iter().position(|f| f.matches(op, key)) {
            let err = faults[pos].error(key);
            faults[pos].attempts -= 1;
            if faults[pos].attempts == 0 {
                faults.remove(pos);
            }
            trace!("Injected fault on {:?} {:?}: {}", op, key, err);
            return Err(err);
        }
        Ok(())
    }
}

impl DataStore for MemoryStore {
    fn read(&self, partition: Partition, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        with_retries(|| {
            self.check_fault(StoreOp::Read, key)?;
            Ok(self.records.read().get(&(partition, key.clone())).cloned())
        })
    }

    fn merge(&self, partition: Partition, key: RecordKey, record: Record) -> Result<(), StoreError> {
        with_retries(|| {
            self.check_fault(StoreOp::Merge, &key)?;
            let mut records = self.records.write();
            let slot = (partition, key.clone());
            let merged = match records.remove(&slot) {
                Some(old) => old.merged(record.clone()),
                None => record.clone(),
            };
            records.insert(slot, merged);
            Ok(())
        })
    }

    fn put(&self, partition: Partition, key: RecordKey, record: Record) -> Result<(), StoreError> {
        with_retries(|| {
            self.check_fault(StoreOp::Put, &key)?;
            self.records.write().insert((partition, key.clone()), record.clone());
            Ok(())
        })
    }

    fn insert(&self, partition: Partition, key: RecordKey, record: Record) -> Result<bool, StoreError> {
        with_retries(|| {
            self.check_fault(StoreOp::Insert, &key)?;
            let mut records = self.records.write();
            let slot = (partition, key.clone());
            if records.contains_key(&slot) {
                return Ok(false);
            }
            records.insert(slot, record.clone());
            Ok(true)
        })
    }

    fn delete(&self, partition: Partition, key: &RecordKey) -> Result<(), StoreError> {
        with_retries(|| {
            self.check_fault(StoreOp::Delete, key)?;
            self.records.write().remove(&(partition, key.clone()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::retry::MAX_RETRIES;
    use crate::store::{PathIdRecord, Partition::*};

    #[test]
    fn test_put_read_delete() {
        let store = MemoryStore::new();
        let key = RecordKey::PathId(3);
        let record = Record::PathId(PathIdRecord::allocated(None));
        store.put(Operational, key.clone(), record.clone()).unwrap();
        assert_eq!(store.read(Operational, &key).unwrap(), Some(record));
        assert_eq!(store.read(Configuration, &key).unwrap(), None);
        store.delete(Operational, &key).unwrap();
        assert_eq!(store.read(Operational, &key).unwrap(), None);
        // deleting twice is fine
        store.delete(Operational, &key).unwrap();
    }

    #[test]
    fn test_insert_keeps_existing_record() {
        let store = MemoryStore::new();
        let key = RecordKey::PathId(3);
        let first = Record::PathId(PathIdRecord::allocated(None));
        let second = Record::PathId(PathIdRecord::allocated(Some(4099)));
        assert!(store.insert(Operational, key.clone(), first.clone()).unwrap());
        assert!(!store.insert(Operational, key.clone(), second.clone()).unwrap());
        assert_eq!(store.read(Operational, &key).unwrap(), Some(first));
        // partitions are separate
        assert!(store.insert(Configuration, key, second).unwrap());
    }

    #[test]
    fn test_conflicts_are_retried() {
        let store = MemoryStore::new();
        let key = RecordKey::PathId(3);
        store.inject(Fault::conflict(StoreOp::Put, key.clone(), MAX_RETRIES));
        let record = Record::PathId(PathIdRecord::allocated(None));
        assert!(store.put(Operational, key.clone(), record).is_ok());
    }

    #[test]
    fn test_conflicts_surface_after_retries() {
        let store = MemoryStore::new();
        let key = RecordKey::PathId(3);
        store.inject(Fault::conflict(StoreOp::Put, key.clone(), MAX_RETRIES + 1));
        let record = Record::PathId(PathIdRecord::allocated(None));
        assert_eq!(store.put(Operational, key.clone(), record.clone()), Err(StoreError::Conflict(key.clone())));
        // the fault is used up
        assert!(store.put(Operational, key, record).is_ok());
    }
}
