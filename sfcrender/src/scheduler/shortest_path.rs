use super::{
    distance, place_each, ScheduleRequest, Scheduler, SchedulerContext, SchedulerError, SchedulerKind,
    TopologyNeed,
};
use crate::model::{ChainEntry, HopTarget};
use log::*;
use rand::seq::SliceRandom;

/// Places every hop on the candidate closest to the previous hop. The first hop is picked at
/// random among the instances attached to a forwarder.
pub struct ShortestPathScheduler {
    weighted: bool,
}

impl ShortestPathScheduler {
    /// Distances are hop counts.
    pub fn unweighted() -> Self {
        Self { weighted: false }
    }

    /// Distances are the sums of edge weights.
    pub fn weighted() -> Self {
        Self { weighted: true }
    }

    fn first_hop(&self, ctx: &SchedulerContext, request: &ScheduleRequest<'_>, entry: &ChainEntry) -> Option<String> {
        let topo = request.topology?;
        let reachable: Vec<&str> = request
            .snapshot
            .existing_candidates(&entry.function_type)
            .into_iter()
            .map(|f| f.name.as_str())
            .filter(|n| topo.is_attached(n))
            .collect();
        ctx.with_rng(|rng| reachable.choose(rng).map(|n| n.to_string()))
    }

    fn closest(&self, request: &ScheduleRequest<'_>, entry: &ChainEntry, previous: &HopTarget) -> Option<String> {
        let topo = request.topology?;
        let from = request.node_of(previous)?;
        let mut best: Option<(&str, u64)> = None;
        for candidate in request.snapshot.existing_candidates(&entry.function_type) {
            let to = match topo.function_node(&candidate.name) {
                Some(to) => to,
                None => continue,
            };
            match distance(topo, self.weighted, from, to) {
                Some(d) => {
                    trace!("Distance {} -> {} is {}", previous, candidate.name, d);
                    if best.map(|(_, b)| d < b).unwrap_or(true) {
                        best = Some((&candidate.name, d));
                    }
                }
                None => debug!("{} cannot reach {}, skipped", previous, candidate.name),
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}

impl Scheduler for ShortestPathScheduler {
    fn kind(&self) -> SchedulerKind {
        if self.weighted {
            SchedulerKind::WeightedShortestPath
        } else {
            SchedulerKind::ShortestPath
        }
    }

    fn topology(&self) -> TopologyNeed {
        if self.weighted {
            TopologyNeed::Weighted
        } else {
            TopologyNeed::Unweighted
        }
    }

    fn schedule(&self, ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError> {
        place_each(request, |entry, previous| {
            // a previous hop outside of the topology gives no reference point
            let placed = match previous.filter(|p| request.node_of(p).is_some()) {
                Some(previous) => self.closest(request, entry, previous),
                None => self.first_hop(ctx, request, entry),
            };
            Ok(placed)
        })
    }
}
