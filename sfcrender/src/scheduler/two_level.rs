//! Two-level optimization.
//!
//! The first level looks at the resource pressure of every required type and asks the capacity
//! expander for another instance when all instances of a type are saturated. The second level
//! enumerates every combination of candidate instances and picks the one with the largest
//! minimum headroom, preferring combinations whose forwarder sequence does not backtrack.

use super::{HopPin, ScheduleRequest, Scheduler, SchedulerContext, SchedulerError, SchedulerKind, TopologyNeed};
use crate::inventory::InventorySnapshot;
use crate::model::{ChainEntry, HopTarget};
use itertools::Itertools;
use log::*;

/// Headroom assumed for instances without a load sample.
const UNKNOWN_HEADROOM: f64 = 100.0;

pub struct TwoLevelScheduler;

impl TwoLevelScheduler {
    /// Ask for more capacity for every type whose instances are all above the pressure threshold.
    fn relieve_pressure(ctx: &SchedulerContext, request: &ScheduleRequest<'_>) {
        let expander = match ctx.expander() {
            Some(e) => e,
            None => return,
        };
        let mut requested = Vec::new();
        for (idx, entry) in request.chain.entries.iter().enumerate() {
            if request.pin(idx).is_some() || entry.group.is_some() || requested.contains(&&entry.function_type) {
                continue;
            }
            let candidates = request.snapshot.existing_candidates(&entry.function_type);
            let saturated = !candidates.is_empty()
                && candidates.iter().all(|c| {
                    request
                        .snapshot
                        .load_sample(&c.name)
                        .map(|l| l.cpu.max(l.memory) >= ctx.pressure_threshold())
                        .unwrap_or(false)
                });
            if saturated {
                info!("All instances of {} are above {}%, requesting capacity", entry.function_type, ctx.pressure_threshold());
                if let Err(e) = expander.request_instance(&entry.function_type) {
                    warn!("Capacity request for {} failed: {}", entry.function_type, e);
                }
                requested.push(&entry.function_type);
            }
        }
    }

    fn options(request: &ScheduleRequest<'_>, idx: usize, entry: &ChainEntry) -> Result<Vec<HopTarget>, SchedulerError> {
        if let Some(HopPin { target, .. }) = request.pin(idx) {
            return Ok(vec![target.clone()]);
        }
        if let Some(group) = &entry.group {
            return match request.snapshot.group_anchor(group) {
                Some(_) => Ok(vec![HopTarget::Group(group.clone())]),
                None => Err(SchedulerError::infeasible(entry)),
            };
        }
        let options: Vec<HopTarget> = request
            .snapshot
            .existing_candidates(&entry.function_type)
            .into_iter()
            .filter(|c| request.topology.map(|t| t.is_attached(&c.name)).unwrap_or(true))
            .map(|c| HopTarget::Function(c.name.clone()))
            .collect();
        if options.is_empty() {
            debug!("No attached instance of type {} for entry {}", entry.function_type, entry.name);
            return Err(SchedulerError::infeasible(entry));
        }
        Ok(options)
    }

    /// Topology index of the forwarder serving a hop.
    fn forwarder_index(request: &ScheduleRequest<'_>, idx: usize, target: &HopTarget) -> Option<usize> {
        let topo = request.topology?;
        let pinned = request.pin(idx).and_then(|p| p.forwarder.as_deref());
        let forwarder = match pinned {
            Some(name) => name.to_string(),
            None => {
                let function = match target {
                    HopTarget::Function(name) => name.clone(),
                    HopTarget::Group(group) => request.snapshot.group_anchor(group)?.name.clone(),
                };
                request.snapshot.hosting_forwarder(&function)?.name.clone()
            }
        };
        topo.forwarder_node(&forwarder).map(|n| n.index())
    }
}

/// Whether the sequence never changes direction. Hops without a known forwarder are skipped.
pub(crate) fn is_monotonic(indices: &[Option<usize>]) -> bool {
    let known: Vec<usize> = indices.iter().flatten().copied().collect();
    let ascending = known.windows(2).all(|w| w[0] <= w[1]);
    let descending = known.windows(2).all(|w| w[0] >= w[1]);
    ascending || descending
}

/// Smallest headroom over the hops of a placement.
pub(crate) fn min_headroom(snapshot: &InventorySnapshot, targets: &[&HopTarget]) -> f64 {
    targets
        .iter()
        .map(|t| {
            let function = match t {
                HopTarget::Function(name) => Some(name.as_str()),
                HopTarget::Group(group) => snapshot.group_anchor(group).map(|a| a.name.as_str()),
            };
            function.and_then(|f| snapshot.load_sample(f)).map(|l| l.headroom()).unwrap_or(UNKNOWN_HEADROOM)
        })
        .fold(UNKNOWN_HEADROOM, f64::min)
}

impl Scheduler for TwoLevelScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::TwoLevelOptimization
    }

    fn topology(&self) -> TopologyNeed {
        TopologyNeed::Unweighted
    }

    fn schedule(&self, ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError> {
        if request.chain.is_empty() {
            return Ok(Vec::new());
        }
        Self::relieve_pressure(ctx, request);

        let options = request
            .chain
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| Self::options(request, idx, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let combinations = options
            .iter()
            .try_fold(1usize, |acc, o| acc.checked_mul(o.len()))
            .unwrap_or(usize::MAX);
        if combinations > ctx.max_combinations() {
            warn!("{} placements for chain {} exceed the limit of {}", combinations, request.chain.name, ctx.max_combinations());
            return Err(SchedulerError::SearchSpaceTooLarge(combinations));
        }
        debug!("Evaluating {} placements for chain {}", combinations, request.chain.name);

        let positions: Vec<Vec<Option<usize>>> = options
            .iter()
            .enumerate()
            .map(|(idx, opts)| opts.iter().map(|t| Self::forwarder_index(request, idx, t)).collect())
            .collect();

        let mut best_monotonic: Option<(f64, Vec<usize>)> = None;
        let mut best_any: Option<(f64, Vec<usize>)> = None;
        for combination in options.iter().map(|o| 0..o.len()).multi_cartesian_product() {
            let targets: Vec<&HopTarget> = combination.iter().enumerate().map(|(i, c)| &options[i][*c]).collect();
            let score = min_headroom(request.snapshot, &targets);
            let indices: Vec<Option<usize>> = combination.iter().enumerate().map(|(i, c)| positions[i][*c]).collect();

            let slot = if is_monotonic(&indices) { &mut best_monotonic } else { &mut best_any };
            if slot.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                *slot = Some((score, combination));
            }
        }

        // a backtracking placement is only used when nothing else exists
        let (score, combination) = best_monotonic.or(best_any).ok_or_else(|| {
            let last = &request.chain.entries[request.chain.len() - 1];
            SchedulerError::infeasible(last)
        })?;
        trace!("Chain {} placed with minimum headroom {}", request.chain.name, score);
        Ok(combination.into_iter().enumerate().map(|(i, c)| options[i][c].clone()).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Chain, Forwarder, FunctionInstance, FunctionType, LoadSample};
    use crate::scheduler::{fixtures, CapacityExpander};
    use crate::topology::TopologyGraph;
    use assert_approx_eq::assert_approx_eq;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingExpander {
        requests: Mutex<Vec<FunctionType>>,
    }

    impl CapacityExpander for RecordingExpander {
        fn request_instance(&self, function_type: &FunctionType) -> Result<(), String> {
            self.requests.lock().push(function_type.clone());
            Ok(())
        }
    }

    fn f(name: &str) -> HopTarget {
        HopTarget::Function(name.to_string())
    }

    #[test]
    fn test_maximizes_minimum_headroom() {
        let snapshot = fixtures::line();
        let topo = fixtures::topology(false);
        let chain = fixtures::chain(&["firewall", "dpi", "nat"]);
        let pins = vec![None, None, None];
        let request = ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: Some(&topo) };
        let ctx = SchedulerContext::new(Duration::from_secs(2));
        let placed = TwoLevelScheduler.schedule(&ctx, &request).unwrap();
        assert_eq!(placed, vec![f("fw-2"), f("dpi-1"), f("nat-1")]);
        let refs: Vec<&HopTarget> = placed.iter().collect();
        assert_approx_eq!(min_headroom(&snapshot, &refs), 60.0);
    }

    #[test]
    fn test_prefers_monotonic_placement() {
        let snapshot = InventorySnapshot::from_parts(
            vec![
                FunctionInstance::new("x-1", "x").attached_to("a"),
                FunctionInstance::new("y-1", "y").attached_to("c"),
                FunctionInstance::new("y-2", "y").attached_to("b"),
                FunctionInstance::new("z-1", "z").attached_to("b"),
            ],
            vec![
                Forwarder::new("a").with_link("b", None),
                Forwarder::new("b").with_link("c", None),
                Forwarder::new("c"),
            ],
            vec![],
            vec![
                ("x-1".to_string(), LoadSample::new(10.0, 0.0)),
                ("y-1".to_string(), LoadSample::new(10.0, 0.0)),
                ("y-2".to_string(), LoadSample::new(50.0, 0.0)),
                ("z-1".to_string(), LoadSample::new(10.0, 0.0)),
            ],
        );
        let topo = TopologyGraph::build(&snapshot);
        let chain = Chain::new("c", &["x", "y", "z"]);
        let pins = vec![None, None, None];
        let request = ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: Some(&topo) };
        let ctx = SchedulerContext::new(Duration::from_secs(2));
        // a -> c -> b has more headroom but goes back
        assert_eq!(TwoLevelScheduler.schedule(&ctx, &request).unwrap(), vec![f("x-1"), f("y-2"), f("z-1")]);
    }

    #[test]
    fn test_monotonic_sequences() {
        assert!(is_monotonic(&[Some(1), Some(2), Some(2)]));
        assert!(is_monotonic(&[Some(4), Some(4), Some(3)]));
        assert!(is_monotonic(&[Some(1), None, Some(3)]));
        assert!(!is_monotonic(&[Some(1), Some(4), Some(3)]));
        assert!(is_monotonic(&[]));
    }

    #[test]
    fn test_search_space_limit() {
        let snapshot = fixtures::line();
        let topo = fixtures::topology(false);
        let chain = fixtures::chain(&["firewall", "dpi"]);
        let pins = vec![None, None];
        let request = ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: Some(&topo) };
        let ctx = SchedulerContext::new(Duration::from_secs(2)).with_max_combinations(3);
        assert_eq!(TwoLevelScheduler.schedule(&ctx, &request), Err(SchedulerError::SearchSpaceTooLarge(6)));
    }

    #[test]
    fn test_requests_capacity_for_saturated_types() {
        let snapshot = fixtures::line();
        let topo = fixtures::topology(false);
        let chain = fixtures::chain(&["firewall", "dpi", "nat"]);
        let pins = vec![None, None, None];
        let request = ScheduleRequest { chain: &chain, pins: &pins, snapshot: &snapshot, topology: Some(&topo) };

        let expander = Arc::new(RecordingExpander::default());
        let ctx = SchedulerContext::new(Duration::from_secs(2)).with_expander(expander.clone());
        TwoLevelScheduler.schedule(&ctx, &request).unwrap();
        assert!(expander.requests.lock().is_empty());

        // every dpi instance is at 40% or more, one firewall is at 20%
        let ctx = SchedulerContext::new(Duration::from_secs(2))
            .with_expander(expander.clone())
            .with_pressure_threshold(30.0);
        TwoLevelScheduler.schedule(&ctx, &request).unwrap();
        assert_eq!(*expander.requests.lock(), vec![FunctionType::from("dpi")]);
    }
}
