//! # Scheduler strategies
//!
//! A scheduler places one function instance (or function group) on every entry of a chain. The
//! strategies share the [`Scheduler`] trait and are selected through the closed [`SchedulerKind`]
//! enum with [`create`]. Hops pinned by the path spec are used verbatim; only the remaining
//! entries are placed. A scheduler either places the whole chain or fails.
//!
//! State that outlives a single request (round-robin cursors, random source, capacity expander)
//! lives in an explicit [`SchedulerContext`] owned by the renderer.

mod load_balance;
mod load_path_aware;
mod random;
mod round_robin;
mod shortest_path;
mod two_level;

pub use load_balance::LoadBalanceScheduler;
pub use load_path_aware::{LoadPathAwareScheduler, DISTANCE_THRESHOLD};
pub use random::RandomScheduler;
pub use round_robin::RoundRobinScheduler;
pub use shortest_path::ShortestPathScheduler;
pub use two_level::TwoLevelScheduler;

use crate::config::RendererConfig;
use crate::inventory::InventorySnapshot;
use crate::model::{Chain, ChainEntry, FunctionType, HopTarget};
use crate::topology::{shortest_path_length, weighted_shortest_path_cost, TopologyGraph};
use log::*;
use parking_lot::{Mutex, MutexGuard};
use petgraph::graph::NodeIndex;
use rand::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("No feasible placement for chain entry {entry} of type {function_type}")]
    NoFeasiblePlacement { entry: String, function_type: FunctionType },
    #[error("{0} placements exceed the enumeration limit")]
    SearchSpaceTooLarge(usize),
    #[error("Timed out waiting for the round-robin lock")]
    LockTimeout,
}

impl SchedulerError {
    fn infeasible(entry: &ChainEntry) -> Self {
        SchedulerError::NoFeasiblePlacement {
            entry: entry.name.clone(),
            function_type: entry.function_type.clone(),
        }
    }
}

/// The closed set of scheduling strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    RoundRobin,
    Random,
    LoadBalance,
    ShortestPath,
    WeightedShortestPath,
    LoadPathAware,
    TwoLevelOptimization,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 7] = [
        SchedulerKind::RoundRobin,
        SchedulerKind::Random,
        SchedulerKind::LoadBalance,
        SchedulerKind::ShortestPath,
        SchedulerKind::WeightedShortestPath,
        SchedulerKind::LoadPathAware,
        SchedulerKind::TwoLevelOptimization,
    ];

    /// Resolve the configured scheduler type. Missing or unknown values select `Random`.
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            None => SchedulerKind::Random,
            Some(s) => s.parse().unwrap_or_else(|_| {
                warn!("Unknown scheduler type {:?}, using random", s);
                SchedulerKind::Random
            }),
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerKind::RoundRobin => "round-robin",
            SchedulerKind::Random => "random",
            SchedulerKind::LoadBalance => "load-balance",
            SchedulerKind::ShortestPath => "shortest-path",
            SchedulerKind::WeightedShortestPath => "weighted-shortest-path",
            SchedulerKind::LoadPathAware => "load-path-aware",
            SchedulerKind::TwoLevelOptimization => "two-level-optimization",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        SchedulerKind::ALL
            .iter()
            .find(|k| k.to_string() == normalized)
            .copied()
            .ok_or_else(|| format!("unknown scheduler type {}", s))
    }
}

/// Topology a scheduler needs to have built before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyNeed {
    None,
    Unweighted,
    Weighted,
}

/// External collaborator asked for new instances when every candidate is under pressure.
pub trait CapacityExpander: Send + Sync {
    fn request_instance(&self, function_type: &FunctionType) -> Result<(), String>;
}

/// Process-wide scheduler state.
pub struct SchedulerContext {
    cursors: Mutex<HashMap<FunctionType, usize>>,
    rng: Mutex<StdRng>,
    lock_wait: Duration,
    pressure_threshold: f64,
    max_combinations: usize,
    expander: Option<Arc<dyn CapacityExpander>>,
}

impl SchedulerContext {
    pub fn new(lock_wait: Duration) -> Self {
        let defaults = RendererConfig::default();
        Self {
            cursors: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_entropy()),
            lock_wait,
            pressure_threshold: defaults.pressure_threshold,
            max_combinations: defaults.max_combinations,
            expander: None,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(config.lock_wait())
            .with_pressure_threshold(config.pressure_threshold)
            .with_max_combinations(config.max_combinations)
    }

    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn CapacityExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_pressure_threshold(mut self, threshold: f64) -> Self {
        self.pressure_threshold = threshold;
        self
    }

    pub fn with_max_combinations(mut self, max: usize) -> Self {
        self.max_combinations = max;
        self
    }

    /// Lock the round-robin cursor table, waiting at most the configured lock wait.
    pub(crate) fn lock_cursors(&self) -> Result<MutexGuard<'_, HashMap<FunctionType, usize>>, SchedulerError> {
        self.cursors.try_lock_for(self.lock_wait).ok_or_else(|| {
            warn!("Round-robin lock not acquired within {:?}", self.lock_wait);
            SchedulerError::LockTimeout
        })
    }

    /// Current round-robin cursor of a type.
    pub fn cursor(&self, function_type: &FunctionType) -> Option<usize> {
        self.cursors.lock().get(function_type).copied()
    }

    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut self.rng.lock())
    }

    pub(crate) fn pressure_threshold(&self) -> f64 {
        self.pressure_threshold
    }

    pub(crate) fn max_combinations(&self) -> usize {
        self.max_combinations
    }

    pub(crate) fn expander(&self) -> Option<&Arc<dyn CapacityExpander>> {
        self.expander.as_ref()
    }
}

/// Explicit placement of one hop, from the path spec or the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopPin {
    pub target: HopTarget,
    pub forwarder: Option<String>,
}

/// Everything a scheduler looks at for one request.
pub struct ScheduleRequest<'a> {
    pub chain: &'a Chain,
    /// One slot per chain entry.
    pub pins: &'a [Option<HopPin>],
    pub snapshot: &'a InventorySnapshot,
    pub topology: Option<&'a TopologyGraph>,
}

impl<'a> ScheduleRequest<'a> {
    pub fn pin(&self, idx: usize) -> Option<&HopPin> {
        self.pins.get(idx).and_then(|p| p.as_ref())
    }

    /// Topology node standing for a hop target. Groups are represented by their first existing
    /// member.
    pub fn node_of(&self, target: &HopTarget) -> Option<NodeIndex> {
        let topo = self.topology?;
        match target {
            HopTarget::Function(name) => topo.function_node(name),
            HopTarget::Group(name) => topo.function_node(&self.snapshot.group_anchor(name)?.name),
        }
    }
}

/// A placement strategy.
pub trait Scheduler: Send + Sync {
    fn kind(&self) -> SchedulerKind;

    fn topology(&self) -> TopologyNeed {
        TopologyNeed::None
    }

    /// Place every entry of the chain.
    fn schedule(&self, ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError>;
}

/// Instantiate the strategy for `kind`.
pub fn create(kind: SchedulerKind) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::RoundRobin => Box::new(RoundRobinScheduler),
        SchedulerKind::Random => Box::new(RandomScheduler),
        SchedulerKind::LoadBalance => Box::new(LoadBalanceScheduler),
        SchedulerKind::ShortestPath => Box::new(ShortestPathScheduler::unweighted()),
        SchedulerKind::WeightedShortestPath => Box::new(ShortestPathScheduler::weighted()),
        SchedulerKind::LoadPathAware => Box::new(LoadPathAwareScheduler),
        SchedulerKind::TwoLevelOptimization => Box::new(TwoLevelScheduler),
    }
}

/// Walk the chain in order. Pinned entries are taken verbatim, group entries become group
/// targets, and every other entry is placed by `place`, which gets the entry and the target of
/// the previous hop.
pub(crate) fn place_each<F>(request: &ScheduleRequest<'_>, mut place: F) -> Result<Vec<HopTarget>, SchedulerError>
where
    F: FnMut(&ChainEntry, Option<&HopTarget>) -> Result<Option<String>, SchedulerError>,
{
    let mut result: Vec<HopTarget> = Vec::with_capacity(request.chain.len());
    for (idx, entry) in request.chain.entries.iter().enumerate() {
        let target = if let Some(pin) = request.pin(idx) {
            pin.target.clone()
        } else if let Some(group) = &entry.group {
            match request.snapshot.group_anchor(group) {
                Some(_) => HopTarget::Group(group.clone()),
                None => {
                    debug!("Group {} of entry {} has no existing member", group, entry.name);
                    return Err(SchedulerError::infeasible(entry));
                }
            }
        } else {
            match place(entry, result.last())? {
                Some(name) => HopTarget::Function(name),
                None => {
                    debug!("No instance of type {} for entry {}", entry.function_type, entry.name);
                    return Err(SchedulerError::infeasible(entry));
                }
            }
        };
        trace!("Entry {} placed on {}", entry.name, target);
        result.push(target);
    }
    Ok(result)
}

/// Distance between two nodes, by hop count or by weight.
pub(crate) fn distance(topo: &TopologyGraph, weighted: bool, a: NodeIndex, b: NodeIndex) -> Option<u64> {
    if weighted {
        weighted_shortest_path_cost(topo, a, b)
    } else {
        shortest_path_length(topo, a, b).map(|d| d as u64)
    }
}

/// CPU utilization used to rank candidates. Missing samples rank last.
pub(crate) fn cpu_of(snapshot: &InventorySnapshot, function: &str) -> f64 {
    snapshot.load_sample(function).map(|l| l.cpu).unwrap_or(f64::INFINITY)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Chain;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in SchedulerKind::ALL.iter() {
            assert_eq!(kind.to_string().parse::<SchedulerKind>(), Ok(*kind));
            assert_eq!(create(*kind).kind(), *kind);
        }
        assert_eq!("Load_Balance".parse::<SchedulerKind>(), Ok(SchedulerKind::LoadBalance));
    }

    #[test]
    fn test_unknown_kind_defaults_to_random() {
        assert_eq!(SchedulerKind::from_config(None), SchedulerKind::Random);
        assert_eq!(SchedulerKind::from_config(Some("nope")), SchedulerKind::Random);
    }

    #[test]
    fn test_pins_are_kept_verbatim() {
        let snapshot = fixtures::line();
        let chain = Chain::new("c", &["firewall", "dpi"]);
        let pins = vec![None, Some(HopPin { target: HopTarget::Function("dpi-3".to_string()), forwarder: None })];
        let ctx = SchedulerContext::new(Duration::from_secs(2)).with_seed(1);
        for kind in SchedulerKind::ALL.iter() {
            let scheduler = create(*kind);
            let topo = fixtures::topology(scheduler.topology() == TopologyNeed::Weighted);
            let request = ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: Some(&topo) };
            let result = scheduler.schedule(&ctx, &request).unwrap();
            assert_eq!(result.len(), 2);
            assert_eq!(result[1], HopTarget::Function("dpi-3".to_string()), "{} ignored the pin", kind);
        }
    }

    #[test]
    fn test_missing_type_fails_every_strategy() {
        let snapshot = fixtures::line();
        let chain = Chain::new("c", &["firewall", "wan-optimizer"]);
        let pins = vec![None, None];
        let ctx = SchedulerContext::new(Duration::from_secs(2)).with_seed(1);
        for kind in SchedulerKind::ALL.iter() {
            let scheduler = create(*kind);
            let topo = fixtures::topology(scheduler.topology() == TopologyNeed::Weighted);
            let request = ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: Some(&topo) };
            assert_eq!(
                scheduler.schedule(&ctx, &request),
                Err(SchedulerError::NoFeasiblePlacement {
                    entry: "wan-optimizer".to_string(),
                    function_type: "wan-optimizer".into(),
                }),
                "{} placed a missing type",
                kind
            );
        }
    }
}
