use super::{place_each, ScheduleRequest, Scheduler, SchedulerContext, SchedulerError, SchedulerKind};
use crate::model::HopTarget;
use log::*;
use rand::Rng;

/// Picks a random registered instance, probing forward past names that no longer exist.
pub struct RandomScheduler;

impl Scheduler for RandomScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Random
    }

    fn schedule(&self, ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError> {
        place_each(request, |entry, _| {
            let candidates = request.snapshot.candidates(&entry.function_type);
            if candidates.is_empty() {
                return Ok(None);
            }
            let start = ctx.with_rng(|rng| rng.gen_range(0, candidates.len()));
            for probe in 0..candidates.len() {
                let name = &candidates[(start + probe) % candidates.len()];
                if request.snapshot.function(name).is_some() {
                    return Ok(Some(name.clone()));
                }
                debug!("Skipping stale instance {} of type {}", name, entry.function_type);
            }
            Ok(None)
        })
    }
}
