use super::{cpu_of, place_each, ScheduleRequest, Scheduler, SchedulerContext, SchedulerError, SchedulerKind};
use crate::inventory::InventorySnapshot;
use crate::model::HopTarget;

/// Picks the instance with the lowest CPU utilization.
pub struct LoadBalanceScheduler;

impl Scheduler for LoadBalanceScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::LoadBalance
    }

    fn schedule(&self, _ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError> {
        place_each(request, |entry, _| {
            let candidates: Vec<&str> = request
                .snapshot
                .existing_candidates(&entry.function_type)
                .into_iter()
                .map(|f| f.name.as_str())
                .collect();
            Ok(lowest_cpu(request.snapshot, &candidates))
        })
    }
}

/// The candidate with the lowest CPU sample. The first candidate wins ties and is also the
/// fallback when no candidate has a sample.
pub(crate) fn lowest_cpu(snapshot: &InventorySnapshot, candidates: &[&str]) -> Option<String> {
    let mut iter = candidates.iter();
    let mut best = *iter.next()?;
    let mut best_cpu = cpu_of(snapshot, best);
    for candidate in iter {
        let cpu = cpu_of(snapshot, candidate);
        if cpu < best_cpu {
            best = *candidate;
            best_cpu = cpu;
        }
    }
    Some(best.to_string())
}
