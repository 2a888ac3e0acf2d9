use super::{place_each, ScheduleRequest, Scheduler, SchedulerContext, SchedulerError, SchedulerKind};
use crate::model::HopTarget;
use log::*;

/// Cycles through the instances of every type with a cursor shared by all requests.
pub struct RoundRobinScheduler;

impl Scheduler for RoundRobinScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::RoundRobin
    }

    fn schedule(&self, ctx: &SchedulerContext, request: &ScheduleRequest<'_>) -> Result<Vec<HopTarget>, SchedulerError> {
        // held for the whole chain, released on every exit path
        let mut cursors = ctx.lock_cursors()?;
        place_each(request, |entry, _| {
            let candidates = request.snapshot.existing_candidates(&entry.function_type);
            if candidates.is_empty() {
                return Ok(None);
            }
            let cursor = cursors.entry(entry.function_type.clone()).or_insert(0);
            // the instance list may have shrunk since the last call
            if *cursor >= candidates.len() {
                *cursor %= candidates.len();
            }
            let selected = candidates[*cursor].name.clone();
            *cursor = (*cursor + 1) % candidates.len();
            trace!("Round-robin picked {} for {}, next cursor {}", selected, entry.function_type, cursor);
            Ok(Some(selected))
        })
    }
}
