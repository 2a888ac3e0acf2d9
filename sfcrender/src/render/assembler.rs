use super::hops::{build_hops, MAX_HOPS};
use super::reverse::{is_symmetric, reverse_path, toggle_reverse_name};
use super::saga::{Compensation, Saga, SagaParts};
use super::state::StateCoordinator;
use crate::config::RendererConfig;
use crate::inventory::{Inventory, InventorySnapshot};
use crate::model::{
    Chain, Hop, HopOverride, HopTarget, PathId, PathSpec, RenderedServicePath, MAX_SERVICE_INDEX,
};
use crate::pathid::PathIdAllocator;
use crate::scheduler::{self, HopPin, ScheduleRequest, SchedulerContext, SchedulerKind, TopologyNeed};
use crate::store::{read_rendered_path, DataStore, Partition, Record, RecordKey};
use crate::topology::TopologyGraph;
use crate::Error;
use log::*;
use std::sync::Arc;

/// Request to render a path spec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateRequest {
    pub path_spec: String,
    /// Name of the new path. Derived from the path spec and the path id if absent.
    pub name: Option<String>,
    /// Replaces the hop overrides of the path spec.
    pub overrides: Option<Vec<HopOverride>>,
}

impl CreateRequest {
    pub fn new(path_spec: impl Into<String>) -> Self {
        Self { path_spec: path_spec.into(), ..Default::default() }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Vec<HopOverride>) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// Outcome of a successful render.
#[derive(Debug)]
pub struct RenderedPaths {
    pub forward: String,
    /// The reverse path, if the chain is symmetric and its rendering succeeded.
    pub reverse: Option<String>,
    /// Why the reverse path of a symmetric chain is missing.
    pub reverse_error: Option<Error>,
}

/// Renders path specs into rendered service paths and keeps their dependent state in sync.
pub struct RspRenderer {
    inventory: Arc<dyn Inventory>,
    store: Arc<dyn DataStore>,
    allocator: PathIdAllocator,
    scheduling: SchedulerContext,
    state: StateCoordinator,
    config: RendererConfig,
}

impl std::fmt::Debug for RspRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RspRenderer").field("config", &self.config).finish()
    }
}

impl RspRenderer {
    pub fn new(inventory: Arc<dyn Inventory>, store: Arc<dyn DataStore>, config: RendererConfig) -> Result<Self, Error> {
        config.validate()?;
        let allocator =
            PathIdAllocator::new(store.clone(), config.id_space(), config.path_id_step_bound, config.lock_wait());
        Ok(Self {
            scheduling: SchedulerContext::from_config(&config),
            state: StateCoordinator::new(store.clone()),
            inventory,
            store,
            allocator,
            config,
        })
    }

    /// Seed the random sources of the allocator and the schedulers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.allocator = PathIdAllocator::with_seed(
            self.store.clone(),
            self.config.id_space(),
            self.config.path_id_step_bound,
            self.config.lock_wait(),
            seed,
        );
        self.scheduling = SchedulerContext::from_config(&self.config).with_seed(seed);
        self
    }

    /// Replace the scheduler state, e.g. to plug in a capacity expander.
    pub fn with_scheduler_context(mut self, ctx: SchedulerContext) -> Self {
        self.scheduling = ctx;
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn allocator(&self) -> &PathIdAllocator {
        &self.allocator
    }

    pub fn scheduler_context(&self) -> &SchedulerContext {
        &self.scheduling
    }

    pub fn state(&self) -> &StateCoordinator {
        &self.state
    }

    fn saga_parts(&self) -> SagaParts<'_> {
        SagaParts { allocator: &self.allocator, store: self.store.as_ref(), state: &self.state }
    }

    /// Render a path spec. On success the forward path (and the reverse path of a symmetric
    /// chain) is persisted together with its dependent state. On failure nothing is left behind.
    pub fn create_rendered_path(&self, request: &CreateRequest) -> Result<RenderedPaths, Error> {
        info!("Rendering path spec {}", request.path_spec);

        // validate
        let path_spec = self
            .inventory
            .path_spec(&request.path_spec)?
            .ok_or_else(|| Error::PathSpecNotFound(request.path_spec.clone()))?;
        let chain = self.inventory.chain(&path_spec.chain)?.ok_or_else(|| Error::ChainNotFound {
            path_spec: path_spec.name.clone(),
            chain: path_spec.chain.clone(),
        })?;
        if chain.is_empty() {
            return Err(Error::EmptyChain(chain.name));
        }
        if chain.len() > MAX_HOPS {
            return Err(Error::ChainTooLong(chain.len()));
        }
        if let Some(name) = &request.name {
            if read_rendered_path(self.store.as_ref(), name)?.is_some() {
                return Err(Error::RenderedPathExists(name.clone()));
            }
        }
        let snapshot = InventorySnapshot::load(self.inventory.as_ref())?;
        let overrides = request.overrides.as_ref().unwrap_or(&path_spec.hops);
        let pins = resolve_pins(&chain, overrides, &snapshot)?;
        let pinned: Vec<&HopTarget> = pins.iter().flatten().map(|p| &p.target).collect();
        self.check_one_chain_only(&chain, &snapshot, &pinned)?;

        // schedule
        let kind =
            SchedulerKind::from_config(path_spec.scheduler.as_deref().or_else(|| self.config.scheduler.as_deref()));
        let strategy = scheduler::create(kind);
        let topology = match strategy.topology() {
            TopologyNeed::None => None,
            TopologyNeed::Unweighted => Some(TopologyGraph::build(&snapshot)),
            TopologyNeed::Weighted => Some(TopologyGraph::build_weighted(&snapshot)),
        };
        let schedule_request =
            ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: topology.as_ref() };
        let targets = strategy.schedule(&self.scheduling, &schedule_request)?;
        debug!("{} scheduler placed {} on {:?}", kind, chain.name, targets);
        self.check_one_chain_only(&chain, &snapshot, &targets.iter().collect::<Vec<_>>())?;

        // build hops
        let hops = build_hops(&snapshot, &targets, &pins)?;

        // allocate, persist, register
        let rsp = self.commit_forward(request, &path_spec, &chain, hops)?;
        info!("Rendered {} with path id {}", rsp.name, rsp.path_id);

        let mut result = RenderedPaths { forward: rsp.name.clone(), reverse: None, reverse_error: None };
        if is_symmetric(&path_spec, &chain, &snapshot) {
            match self.commit_reverse(&rsp) {
                Ok(reverse) => {
                    info!("Rendered reverse path {} with path id {}", reverse.name, reverse.path_id);
                    result.reverse = Some(reverse.name);
                }
                Err(e) => {
                    error!("Cannot render the reverse of {}, keeping the forward path: {}", rsp.name, e);
                    result.reverse_error = Some(e);
                }
            }
        }
        Ok(result)
    }

    fn commit_forward(
        &self,
        request: &CreateRequest,
        path_spec: &PathSpec,
        chain: &Chain,
        hops: Vec<Hop>,
    ) -> Result<RenderedServicePath, Error> {
        let path_id = self.allocator.allocate_id()?;
        let mut saga = Saga::new(format!("rendering of {}", path_spec.name));
        saga.push(Compensation::FreePathId(path_id));

        let rsp = RenderedServicePath {
            name: request.name.clone().unwrap_or_else(|| format!("{}-Path-{}", path_spec.name, path_id)),
            path_id,
            starting_index: MAX_SERVICE_INDEX,
            symmetric_path_id: None,
            transport: path_spec.transport,
            encapsulation: path_spec.encapsulation,
            path_spec: path_spec.name.clone(),
            chain: chain.name.clone(),
            reverse: false,
            hops,
        };
        match self.persist(&rsp, &mut saga) {
            Ok(()) => {
                saga.commit();
                Ok(rsp)
            }
            Err(e) => {
                saga.compensate(&self.saga_parts());
                Err(e)
            }
        }
    }

    fn commit_reverse(&self, forward: &RenderedServicePath) -> Result<RenderedServicePath, Error> {
        let symmetric_id = self.allocator.allocate_symmetric_id(forward.path_id)?;
        let mut saga = Saga::new(format!("rendering of {}", toggle_reverse_name(&forward.name)));
        saga.push(Compensation::ReleaseSymmetricId(symmetric_id));

        let reverse = reverse_path(forward, symmetric_id);
        let outcome = self.persist(&reverse, &mut saga).and_then(|_| {
            saga.push(Compensation::ClearSymmetricRef(forward.name.clone()));
            self.link_symmetric(&forward.name, symmetric_id)
        });
        match outcome {
            Ok(()) => {
                saga.commit();
                Ok(reverse)
            }
            Err(e) => {
                saga.compensate(&self.saga_parts());
                Err(e)
            }
        }
    }

    /// Write the path record, then its dependent state. The record is only written if the name
    /// is still unused, so concurrent requests for one name cannot both succeed.
    fn persist(&self, rsp: &RenderedServicePath, saga: &mut Saga) -> Result<(), Error> {
        let written = self.store.insert(
            Partition::Operational,
            RecordKey::RenderedPath(rsp.name.clone()),
            Record::RenderedPath(rsp.clone()),
        )?;
        if !written {
            debug!("Rendered path {} was created concurrently", rsp.name);
            return Err(Error::RenderedPathExists(rsp.name.clone()));
        }
        saga.push(Compensation::DeleteRenderedPath(rsp.name.clone()));

        let registered = self.state.register(rsp);
        let (written, failure) = match registered {
            Ok(written) => (written, None),
            Err((written, e)) => (written, Some(e)),
        };
        for key in written {
            saga.push(Compensation::Unregister { key, path: rsp.name.clone() });
        }
        match failure {
            None => Ok(()),
            Some(source) => Err(Error::PartialStateWriteFailure { path: rsp.name.clone(), source }),
        }
    }

    /// Record the symmetric id on the forward path.
    fn link_symmetric(&self, forward: &str, symmetric_id: PathId) -> Result<(), Error> {
        let mut rsp = read_rendered_path(self.store.as_ref(), forward)?
            .ok_or_else(|| Error::RenderedPathNotFound(forward.to_string()))?;
        rsp.symmetric_path_id = Some(symmetric_id);
        self.store.put(Partition::Operational, RecordKey::RenderedPath(forward.to_string()), Record::RenderedPath(rsp))?;
        Ok(())
    }

    /// Fail if a one-chain-only function among `targets` is used by a path of another chain.
    fn check_one_chain_only(&self, chain: &Chain, snapshot: &InventorySnapshot, targets: &[&HopTarget]) -> Result<(), Error> {
        for target in targets {
            let function = match target.function().and_then(|f| snapshot.function(f)) {
                Some(f) if f.one_chain_only => f,
                _ => continue,
            };
            let mut used_by = Vec::new();
            for path in self.state.paths_of_function(&function.name)? {
                match read_rendered_path(self.store.as_ref(), &path)? {
                    Some(rsp) if rsp.chain == chain.name => {}
                    Some(_) => used_by.push(path),
                    None => debug!("Function {} lists missing path {}", function.name, path),
                }
            }
            if !used_by.is_empty() {
                warn!("{} is restricted to one chain but used by {:?}", function.name, used_by);
                return Err(Error::OneChainOnlyViolation { function: function.name.clone(), used_by });
            }
        }
        Ok(())
    }

    /// Delete a rendered path together with its symmetric partner, their dependent state and
    /// their path ids. Deleting a missing path succeeds.
    pub fn delete_rendered_path(&self, name: &str) -> Result<(), Error> {
        let rsp = match read_rendered_path(self.store.as_ref(), name)? {
            Some(rsp) => rsp,
            None => {
                debug!("Rendered path {} does not exist, nothing to delete", name);
                return Ok(());
            }
        };
        let partner = match rsp.symmetric_path_id {
            Some(id) => read_rendered_path(self.store.as_ref(), &toggle_reverse_name(&rsp.name))?
                .filter(|p| p.path_id == id),
            None => None,
        };

        for path in std::iter::once(&rsp).chain(partner.iter()) {
            self.state.unregister(path)?;
            self.store.delete(Partition::Operational, &RecordKey::RenderedPath(path.name.clone()))?;
        }
        // retires the recorded symmetric pair in the same locked step
        self.allocator.free_id(rsp.path_id)?;
        match &partner {
            Some(p) => info!("Deleted rendered paths {} and {}", rsp.name, p.name),
            None => info!("Deleted rendered path {}", rsp.name),
        }
        Ok(())
    }

    /// Delete every path steering through a function instance. Returns the names found
    /// registered under it.
    pub fn delete_paths_of_function(&self, function: &str) -> Result<Vec<String>, Error> {
        let paths: Vec<String> = self.state.paths_of_function(function)?.into_iter().collect();
        info!("Function {} removed, deleting {} paths", function, paths.len());
        for path in &paths {
            self.delete_rendered_path(path)?;
        }
        Ok(paths)
    }

    /// Delete every path placed on a function group. Returns the names found registered under it.
    pub fn delete_paths_of_group(&self, group: &str) -> Result<Vec<String>, Error> {
        let paths: Vec<String> = self.state.paths_of_group(group)?.into_iter().collect();
        info!("Group {} removed, deleting {} paths", group, paths.len());
        for path in &paths {
            self.delete_rendered_path(path)?;
        }
        Ok(paths)
    }

    /// Delete every path traversing a forwarder. Returns the names found registered under it.
    pub fn delete_paths_of_forwarder(&self, forwarder: &str) -> Result<Vec<String>, Error> {
        let paths: Vec<String> = self.state.paths_of_forwarder(forwarder)?.into_iter().collect();
        info!("Forwarder {} removed, deleting {} paths", forwarder, paths.len());
        for path in &paths {
            self.delete_rendered_path(path)?;
        }
        Ok(paths)
    }

    pub fn rendered_path(&self, name: &str) -> Result<Option<RenderedServicePath>, Error> {
        Ok(read_rendered_path(self.store.as_ref(), name)?)
    }

    /// First hop of a rendered path, where classifiers steer traffic into it.
    pub fn first_hop(&self, name: &str) -> Result<Option<Hop>, Error> {
        Ok(self.rendered_path(name)?.and_then(|rsp| rsp.first_hop().cloned()))
    }
}

/// Turn hop overrides into one optional pin per chain entry. Overrides past the end of the chain
/// are ignored; a pinned function or group must exist.
fn resolve_pins(
    chain: &Chain,
    overrides: &[HopOverride],
    snapshot: &InventorySnapshot,
) -> Result<Vec<Option<HopPin>>, Error> {
    let mut pins: Vec<Option<HopPin>> = vec![None; chain.len()];
    for hop in overrides {
        let entry = match chain.entries.get(hop.hop_number) {
            Some(entry) => entry,
            None => {
                warn!("Override of hop {} is outside chain {}, ignored", hop.hop_number, chain.name);
                continue;
            }
        };
        let target = match (&hop.function, &hop.group) {
            (Some(function), _) => {
                if snapshot.function(function).is_none() {
                    warn!("Pinned function {} of hop {} does not exist", function, hop.hop_number);
                    return Err(Error::NoFeasiblePlacement {
                        entry: entry.name.clone(),
                        function_type: entry.function_type.clone(),
                    });
                }
                HopTarget::Function(function.clone())
            }
            (None, Some(group)) => {
                if snapshot.group_anchor(group).is_none() {
                    warn!("Pinned group {} of hop {} has no existing member", group, hop.hop_number);
                    return Err(Error::NoFeasiblePlacement {
                        entry: entry.name.clone(),
                        function_type: entry.function_type.clone(),
                    });
                }
                HopTarget::Group(group.clone())
            }
            (None, None) => {
                warn!("Override of hop {} names neither a function nor a group, ignored", hop.hop_number);
                continue;
            }
        };
        pins[hop.hop_number] = Some(HopPin { target, forwarder: hop.forwarder.clone() });
    }
    Ok(pins)
}
