use super::load_balance::lowest_cpu;
use super::{
    cpu_of, distance, place_each, ScheduleRequest, Scheduler, SchedulerContext, SchedulerError, SchedulerKind,
    TopologyNeed,
};
use crate::model::{ChainEntry, HopTarget};
use log::*;

/// Candidates at most this many hops away from the previous hop are ranked by load only.
pub const DISTANCE_THRESHOLD: u64 = 3;

/// Load balancing restricted to the neighbourhood of the previous hop.
pub struct LoadPathAwareScheduler;

impl LoadPathAwareScheduler {
    fn next_hop(request: &ScheduleRequest<'_>, entry: &ChainEntry, previous: &HopTarget) -> Option<String> {
        let topo = request.topology?;
        let from = request.node_of(previous)?;
        let snapshot = request.snapshot;

        let reachable: Vec<(&str, u64)> = snapshot
            .existing_candidates(&entry.function_type)
            .into_iter()
            .filter_map(|c| {
                let to = topo.function_node(&c.name)?;
                distance(topo, false, from, to).map(|d| (c.name.as_str(), d))
            })
            .collect();

        let near: Vec<&str> = reachable.iter().filter(|(_, d)| *d <= DISTANCE_THRESHOLD).map(|(n, _)| *n).collect();
        if !near.is_empty() {
            return lowest_cpu(snapshot, &near);
        }

        debug!("No {} within {} hops of {}, taking the nearest", entry.function_type, DISTANCE_THRESHOLD, previous);
        let mut best: Option<(&str, u64, f64)> = None;
        for (name, d) in reachable {
            let cpu = cpu_of(snapshot, name);
            let better = match best {
                None => true,
                Some((_, best_d, best_cpu)) => d < best_d || (d == best_d && cpu < best_cpu),
            };
            if better {
                best = Some((name, d, cpu));
            }
        }
        best.map(|(name, _, _)| name.to_string())
    }
}

impl Scheduler for LoadPathAwareScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::LoadPathAware
    }

    fn topology(&self) -> TopologyNeed {
        TopologyNeed::Unweighted
    }

    fn schedule(&self, _ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError> {
        place_each(request, |entry, previous| {
            let placed = match previous.filter(|p| request.node_of(p).is_some()) {
                Some(previous) => Self::next_hop(request, entry, previous),
                None => {
                    let candidates: Vec<&str> = request
                        .snapshot
                        .existing_candidates(&entry.function_type)
                        .into_iter()
                        .map(|f| f.name.as_str())
                        .collect();
                    lowest_cpu(request.snapshot, &candidates)
                }
            };
            Ok(placed)
        })
    }
}
