//! # Path-ID allocator
//!
//! Path ids are drawn from a 12-bit primary space `[1, 4095]` by default. The symmetric id of a
//! primary id lives in a disjoint upper range at a fixed offset (`max + 1`), so [`IdSpace::reverse_of`]
//! is an involution. Availability is held in the operational partition of the store; an absent
//! record means the id is free. Every allocate and free runs under the path-id lock.

use crate::model::PathId;
use crate::store::{DataStore, Partition, PathIdRecord, PathIdState, Record, RecordKey, StoreError};
use log::*;
use parking_lot::{Mutex, MutexGuard};
use rand::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathIdError {
    #[error("No free path id left")]
    Exhausted,
    #[error("Path id {0} is not available")]
    Unavailable(PathId),
    #[error("Path id {0} is outside of the id space")]
    OutOfRange(PathId),
    #[error("Path id {0} is not allocated")]
    NotAllocated(PathId),
    #[error("Timed out waiting for the path-id lock")]
    LockTimeout,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Largest primary id whose symmetric id still fits in a [`PathId`].
pub const MAX_PRIMARY_ID: PathId = (PathId::MAX - 1) / 2;

/// Range of primary path ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSpace {
    pub min: PathId,
    pub max: PathId,
}

impl Default for IdSpace {
    fn default() -> Self {
        Self { min: 1, max: 4095 }
    }
}

impl IdSpace {
    /// Panics if the range is empty or `max` exceeds [`MAX_PRIMARY_ID`].
    pub fn new(min: PathId, max: PathId) -> Self {
        assert!(min <= max, "empty path id space");
        assert!(max <= MAX_PRIMARY_ID, "path id {} leaves no room for symmetric ids", max);
        Self { min, max }
    }

    pub fn size(&self) -> u32 {
        self.max - self.min + 1
    }

    fn symmetric_offset(&self) -> PathId {
        self.max + 1
    }

    pub fn is_primary(&self, id: PathId) -> bool {
        id >= self.min && id <= self.max
    }

    pub fn is_symmetric(&self, id: PathId) -> bool {
        id >= self.min + self.symmetric_offset() && id <= self.max + self.symmetric_offset()
    }

    /// The id paired with `id`: the symmetric id of a primary, or the primary of a symmetric id.
    pub fn reverse_of(&self, id: PathId) -> PathId {
        if id <= self.max {
            id + self.symmetric_offset()
        } else {
            id - self.symmetric_offset()
        }
    }
}

#[derive(Debug)]
struct Cursor {
    rng: StdRng,
    position: u32,
}

/// Allocates and retires path ids.
pub struct PathIdAllocator {
    store: Arc<dyn DataStore>,
    space: IdSpace,
    step_bound: u32,
    lock_wait: Duration,
    cursor: Mutex<Cursor>,
}

impl PathIdAllocator {
    pub fn new(store: Arc<dyn DataStore>, space: IdSpace, step_bound: u32, lock_wait: Duration) -> Self {
        Self::with_rng(store, space, step_bound, lock_wait, StdRng::from_entropy())
    }

    /// Allocator with a deterministic cursor.
    pub fn with_seed(
        store: Arc<dyn DataStore>,
        space: IdSpace,
        step_bound: u32,
        lock_wait: Duration,
        seed: u64,
    ) -> Self {
        Self::with_rng(store, space, step_bound, lock_wait, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        store: Arc<dyn DataStore>,
        space: IdSpace,
        step_bound: u32,
        lock_wait: Duration,
        mut rng: StdRng,
    ) -> Self {
        let position = rng.gen_range(0, space.size());
        Self {
            store,
            space,
            step_bound: step_bound.max(1),
            lock_wait,
            cursor: Mutex::new(Cursor { rng, position }),
        }
    }

    pub fn space(&self) -> IdSpace {
        self.space
    }

    pub fn reverse_of(&self, id: PathId) -> PathId {
        self.space.reverse_of(id)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Cursor>, PathIdError> {
        self.cursor.try_lock_for(self.lock_wait).ok_or_else(|| {
            warn!("Path-id lock not acquired within {:?}", self.lock_wait);
            PathIdError::LockTimeout
        })
    }

    fn read_record(&self, id: PathId) -> Result<Option<PathIdRecord>, PathIdError> {
        let key = RecordKey::PathId(id);
        match self.store.read(Partition::Operational, &key)? {
            Some(Record::PathId(record)) => Ok(Some(record)),
            Some(_) => Err(StoreError::UnexpectedRecord(key).into()),
            None => Ok(None),
        }
    }

    fn write_record(&self, id: PathId, record: PathIdRecord) -> Result<(), PathIdError> {
        self.store.put(Partition::Operational, RecordKey::PathId(id), Record::PathId(record))?;
        Ok(())
    }

    /// An id is free if it has no record, or its record says so.
    pub fn is_free(&self, id: PathId) -> Result<bool, PathIdError> {
        Ok(match self.read_record(id)? {
            Some(record) => record.state == PathIdState::Free,
            None => true,
        })
    }

    /// Allocate an id, scanning from a randomized cursor.
    pub fn allocate_id(&self) -> Result<PathId, PathIdError> {
        let mut guard = self.lock()?;
        let cursor = &mut *guard;
        let size = self.space.size();
        for _ in 0..size {
            let step = u64::from(cursor.rng.gen_range(0, self.step_bound)) + 1;
            cursor.position = ((u64::from(cursor.position) + step) % u64::from(size)) as u32;
            let id = self.space.min + cursor.position;
            if self.is_free(id)? {
                self.write_record(id, PathIdRecord::allocated(None))?;
                debug!("Allocated path id {}", id);
                return Ok(id);
            }
        }
        warn!("Path id space exhausted after {} attempts", size);
        Err(PathIdError::Exhausted)
    }

    /// Reserve a specific primary id.
    pub fn allocate_specific_id(&self, id: PathId) -> Result<PathId, PathIdError> {
        let _guard = self.lock()?;
        if !self.space.is_primary(id) {
            return Err(PathIdError::OutOfRange(id));
        }
        if !self.is_free(id)? {
            return Err(PathIdError::Unavailable(id));
        }
        self.write_record(id, PathIdRecord::allocated(None))?;
        debug!("Allocated requested path id {}", id);
        Ok(id)
    }

    /// Reserve the symmetric id of an allocated primary id and record the pairing on both.
    pub fn allocate_symmetric_id(&self, primary: PathId) -> Result<PathId, PathIdError> {
        let _guard = self.lock()?;
        match self.read_record(primary)? {
            Some(record) if record.state == PathIdState::Allocated => {}
            _ => return Err(PathIdError::NotAllocated(primary)),
        }
        let symmetric = self.space.reverse_of(primary);
        if !self.is_free(symmetric)? {
            return Err(PathIdError::Unavailable(symmetric));
        }
        self.write_record(symmetric, PathIdRecord::allocated(Some(primary)))?;
        if let Err(e) = self.write_record(primary, PathIdRecord::allocated(Some(symmetric))) {
            if let Err(undo) = self.store.delete(Partition::Operational, &RecordKey::PathId(symmetric)) {
                error!("Cannot release symmetric path id {}: {}", symmetric, undo);
            }
            return Err(e);
        }
        debug!("Allocated symmetric path id {} for {}", symmetric, primary);
        Ok(symmetric)
    }

    /// Retire an id together with its recorded pair.
    pub fn free_id(&self, id: PathId) -> Result<(), PathIdError> {
        let _guard = self.lock()?;
        let pair = self.read_record(id)?.and_then(|r| r.pair);
        self.store.delete(Partition::Operational, &RecordKey::PathId(id))?;
        if let Some(pair) = pair {
            self.store.delete(Partition::Operational, &RecordKey::PathId(pair))?;
            debug!("Freed path ids {} and {}", id, pair);
        } else {
            debug!("Freed path id {}", id);
        }
        Ok(())
    }

    /// Retire a symmetric id only, detaching it from its primary.
    pub fn release_symmetric_id(&self, symmetric: PathId) -> Result<(), PathIdError> {
        let _guard = self.lock()?;
        let primary = self.space.reverse_of(symmetric);
        self.store.delete(Partition::Operational, &RecordKey::PathId(symmetric))?;
        if let Some(record) = self.read_record(primary)? {
            if record.pair == Some(symmetric) {
                self.write_record(primary, PathIdRecord { pair: None, ..record })?;
            }
        }
        debug!("Released symmetric path id {}", symmetric);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{Fault, MemoryStore, StoreOp};
    use std::collections::HashSet;
    use std::thread;

    const WAIT: Duration = Duration::from_millis(2000);

    fn allocator(space: IdSpace, step: u32) -> (Arc<MemoryStore>, PathIdAllocator) {
        let store = Arc::new(MemoryStore::new());
        let alloc = PathIdAllocator::with_seed(store.clone(), space, step, WAIT, 42);
        (store, alloc)
    }

    #[test]
    fn test_reverse_of_is_involution() {
        let space = IdSpace::default();
        for id in &[1, 2, 100, 4095] {
            let rev = space.reverse_of(*id);
            assert!(space.is_symmetric(rev));
            assert!(!space.is_primary(rev));
            assert_eq!(space.reverse_of(rev), *id);
        }
        assert_eq!(space.reverse_of(1), 4097);
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let (_, alloc) = allocator(IdSpace::new(1, 4), 1);
        let mut ids = HashSet::new();
        for _ in 0..4 {
            ids.insert(alloc.allocate_id().unwrap());
        }
        assert_eq!(ids.len(), 4);
        assert_eq!(alloc.allocate_id(), Err(PathIdError::Exhausted));

        alloc.free_id(3).unwrap();
        assert!(alloc.is_free(3).unwrap());
        assert_eq!(alloc.allocate_id(), Ok(3));
    }

    #[test]
    fn test_widest_space_does_not_overflow() {
        let space = IdSpace::new(1, MAX_PRIMARY_ID);
        assert_eq!(space.reverse_of(MAX_PRIMARY_ID), PathId::MAX);
        assert_eq!(space.reverse_of(PathId::MAX), MAX_PRIMARY_ID);

        let (_, alloc) = allocator(space, u32::MAX);
        let id = alloc.allocate_id().unwrap();
        let sym = alloc.allocate_symmetric_id(id).unwrap();
        assert!(space.is_symmetric(sym));
        assert_eq!(alloc.reverse_of(sym), id);
    }

    #[test]
    #[should_panic]
    fn test_space_without_room_for_symmetric_ids() {
        IdSpace::new(1, PathId::MAX);
    }

    #[test]
    fn test_allocate_specific() {
        let (_, alloc) = allocator(IdSpace::default(), 8);
        assert_eq!(alloc.allocate_specific_id(17), Ok(17));
        assert_eq!(alloc.allocate_specific_id(17), Err(PathIdError::Unavailable(17)));
        assert_eq!(alloc.allocate_specific_id(5000), Err(PathIdError::OutOfRange(5000)));
    }

    #[test]
    fn test_symmetric_pairing() {
        let (store, alloc) = allocator(IdSpace::default(), 8);
        let id = alloc.allocate_id().unwrap();
        let sym = alloc.allocate_symmetric_id(id).unwrap();
        assert_eq!(alloc.reverse_of(id), sym);
        assert_eq!(alloc.reverse_of(sym), id);
        assert!(!alloc.is_free(sym).unwrap());
        assert_eq!(alloc.allocate_symmetric_id(id), Err(PathIdError::Unavailable(sym)));

        // freeing the primary retires the pair
        alloc.free_id(id).unwrap();
        assert!(alloc.is_free(id).unwrap());
        assert!(alloc.is_free(sym).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_freeing_either_side_retires_the_pair() {
        let (store, alloc) = allocator(IdSpace::new(7, 7), 1);
        let id = alloc.allocate_id().unwrap();
        let sym = alloc.allocate_symmetric_id(id).unwrap();
        alloc.free_id(sym).unwrap();
        assert!(alloc.is_free(id).unwrap());
        assert!(store.is_empty());

        // the pair is handed out again and nothing else frees it
        assert_eq!(alloc.allocate_id(), Ok(id));
        assert_eq!(alloc.allocate_symmetric_id(id), Ok(sym));
        assert!(!alloc.is_free(id).unwrap());
        assert!(!alloc.is_free(sym).unwrap());
    }

    #[test]
    fn test_symmetric_requires_allocated_primary() {
        let (_, alloc) = allocator(IdSpace::default(), 8);
        assert_eq!(alloc.allocate_symmetric_id(12), Err(PathIdError::NotAllocated(12)));
    }

    #[test]
    fn test_release_symmetric_keeps_primary() {
        let (_, alloc) = allocator(IdSpace::default(), 8);
        let id = alloc.allocate_id().unwrap();
        let sym = alloc.allocate_symmetric_id(id).unwrap();
        alloc.release_symmetric_id(sym).unwrap();
        assert!(alloc.is_free(sym).unwrap());
        assert!(!alloc.is_free(id).unwrap());
        // and the primary can be paired again
        assert_eq!(alloc.allocate_symmetric_id(id), Ok(sym));
    }

    #[test]
    fn test_explicit_free_predicate() {
        let (store, alloc) = allocator(IdSpace::default(), 8);
        store
            .put(
                Partition::Operational,
                RecordKey::PathId(9),
                Record::PathId(PathIdRecord { state: PathIdState::Free, pair: None }),
            )
            .unwrap();
        assert!(alloc.is_free(9).unwrap());
        store
            .put(Partition::Operational, RecordKey::PathId(9), Record::PathId(PathIdRecord::allocated(None)))
            .unwrap();
        assert!(!alloc.is_free(9).unwrap());
        assert!(alloc.is_free(10).unwrap());
    }

    #[test]
    fn test_store_conflict_surfaces() {
        let (store, alloc) = allocator(IdSpace::default(), 8);
        store.inject(Fault::conflict_any(StoreOp::Put, 4));
        assert!(matches!(alloc.allocate_id(), Err(PathIdError::Store(StoreError::Conflict(_)))));
    }

    #[test]
    fn test_lock_timeout() {
        let store = Arc::new(MemoryStore::new());
        let alloc = PathIdAllocator::with_seed(store, IdSpace::default(), 8, Duration::from_millis(10), 1);
        let _held = alloc.cursor.lock();
        assert_eq!(alloc.allocate_id(), Err(PathIdError::LockTimeout));
        assert_eq!(alloc.free_id(1), Err(PathIdError::LockTimeout));
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let store = Arc::new(MemoryStore::new());
        let alloc = Arc::new(PathIdAllocator::new(store, IdSpace::default(), 16, WAIT));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = alloc.clone();
                thread::spawn(move || (0..50).map(|_| alloc.allocate_id().unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "id {} handed out twice", id);
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn test_concurrent_allocate_and_free() {
        let store = Arc::new(MemoryStore::new());
        let alloc = Arc::new(PathIdAllocator::new(store, IdSpace::new(1, 512), 4, WAIT));
        let held = Arc::new(Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let alloc = alloc.clone();
                let held = held.clone();
                thread::spawn(move || {
                    for round in 0..100 {
                        let id = alloc.allocate_id().unwrap();
                        assert!(held.lock().insert(id), "id {} handed out twice", id);
                        if round % 2 == 0 {
                            held.lock().remove(&id);
                            alloc.free_id(id).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(held.lock().len(), 200);
    }
}
