use super::state::StateCoordinator;
use crate::model::PathId;
use crate::pathid::PathIdAllocator;
use crate::store::{read_rendered_path, DataStore, Partition, Record, RecordKey, StoreError};
use log::*;

/// Undo action for one completed side effect of a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    FreePathId(PathId),
    ReleaseSymmetricId(PathId),
    DeleteRenderedPath(String),
    Unregister { key: RecordKey, path: String },
    /// Drop the symmetric back-reference from a forward path.
    ClearSymmetricRef(String),
}

/// Side effects collaborators needed to undo a render.
pub(crate) struct SagaParts<'a> {
    pub allocator: &'a PathIdAllocator,
    pub store: &'a dyn DataStore,
    pub state: &'a StateCoordinator,
}

/// Records the side effects of a render so they can be rolled back in reverse order.
#[derive(Debug, Default)]
pub(crate) struct Saga {
    label: String,
    steps: Vec<Compensation>,
}

impl Saga {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), steps: Vec::new() }
    }

    pub fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    #[cfg(test)]
    pub fn steps(&self) -> &[Compensation] {
        &self.steps
    }

    /// The render succeeded, nothing will be undone.
    pub fn commit(self) {
        trace!("{} committed after {} steps", self.label, self.steps.len());
    }

    /// Undo every recorded step, newest first. Failures are logged and do not stop the rollback.
    pub fn compensate(self, parts: &SagaParts<'_>) {
        info!("Rolling back {} ({} steps)", self.label, self.steps.len());
        for step in self.steps.into_iter().rev() {
            if let Err(e) = Self::undo(parts, &step) {
                error!("{}: compensation {:?} failed: {}", self.label, step, e);
            }
        }
    }

    fn undo(parts: &SagaParts<'_>, step: &Compensation) -> Result<(), String> {
        match step {
            Compensation::FreePathId(id) => parts.allocator.free_id(*id).map_err(|e| e.to_string()),
            Compensation::ReleaseSymmetricId(id) => parts.allocator.release_symmetric_id(*id).map_err(|e| e.to_string()),
            Compensation::DeleteRenderedPath(name) => parts
                .store
                .delete(Partition::Operational, &RecordKey::RenderedPath(name.clone()))
                .map_err(|e| e.to_string()),
            Compensation::Unregister { key, path } => parts.state.remove_path(key, path).map_err(|e| e.to_string()),
            Compensation::ClearSymmetricRef(name) => clear_symmetric_ref(parts.store, name).map_err(|e| e.to_string()),
        }
    }
}

fn clear_symmetric_ref(store: &dyn DataStore, name: &str) -> Result<(), StoreError> {
    if let Some(mut rsp) = read_rendered_path(store, name)? {
        if rsp.symmetric_path_id.take().is_some() {
            store.put(Partition::Operational, RecordKey::RenderedPath(name.to_string()), Record::RenderedPath(rsp))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pathid::IdSpace;
    use crate::store::{Fault, MemoryStore, StoreOp};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_compensation_runs_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let allocator = PathIdAllocator::with_seed(store.clone(), IdSpace::default(), 16, Duration::from_secs(2), 1);
        let state = StateCoordinator::new(store.clone());
        let parts = SagaParts { allocator: &allocator, store: store.as_ref(), state: &state };

        let id = allocator.allocate_id().unwrap();
        let key = RecordKey::ForwarderState("s1".to_string());
        state.add_path(&key, "p").unwrap();

        let mut saga = Saga::new("render p");
        saga.push(Compensation::FreePathId(id));
        saga.push(Compensation::DeleteRenderedPath("p".to_string()));
        saga.push(Compensation::Unregister { key, path: "p".to_string() });
        assert_eq!(saga.steps().len(), 3);
        saga.compensate(&parts);
        assert!(store.is_empty());
    }

    #[test]
    fn test_failing_step_does_not_stop_rollback() {
        let store = Arc::new(MemoryStore::new());
        let allocator = PathIdAllocator::with_seed(store.clone(), IdSpace::default(), 16, Duration::from_secs(2), 1);
        let state = StateCoordinator::new(store.clone());
        let parts = SagaParts { allocator: &allocator, store: store.as_ref(), state: &state };

        let id = allocator.allocate_id().unwrap();
        store.inject(Fault::unavailable(StoreOp::Delete, RecordKey::RenderedPath("p".to_string())));
        let mut saga = Saga::new("render p");
        saga.push(Compensation::FreePathId(id));
        saga.push(Compensation::DeleteRenderedPath("p".to_string()));
        saga.compensate(&parts);
        assert!(allocator.is_free(id).unwrap());
    }
}
