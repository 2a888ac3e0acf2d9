//! Bounded retry of optimistic-concurrency conflicts.

use super::StoreError;
use log::*;

/// Number of retries after the first conflicting attempt.
pub const MAX_RETRIES: usize = 3;

/// Run `attempt` until it succeeds, fails with something other than a conflict, or conflicted
/// `1 + MAX_RETRIES` times.
pub fn with_retries<T, F>(mut attempt: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut retries = 0;
    loop {
        match attempt() {
            Err(StoreError::Conflict(key)) if retries < MAX_RETRIES => {
                retries += 1;
                debug!("Conflict on {:?}, retry {}/{}", key, retries, MAX_RETRIES);
            }
            Err(StoreError::Conflict(key)) => {
                warn!("Conflict on {:?} persisted after {} retries", key, MAX_RETRIES);
                return Err(StoreError::Conflict(key));
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::RecordKey;

    #[test]
    fn test_conflicts_within_budget_are_absorbed() {
        let mut calls = 0;
        let result = with_retries(|| {
            calls += 1;
            if calls <= MAX_RETRIES {
                Err(StoreError::Conflict(RecordKey::PathId(1)))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(MAX_RETRIES + 1));
    }

    #[test]
    fn test_conflicts_beyond_budget_surface() {
        let mut calls = 0;
        let result: Result<(), _> = with_retries(|| {
            calls += 1;
            Err(StoreError::Conflict(RecordKey::PathId(1)))
        });
        assert_eq!(result, Err(StoreError::Conflict(RecordKey::PathId(1))));
        assert_eq!(calls, MAX_RETRIES + 1);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_retries(|| {
            calls += 1;
            Err(StoreError::Unavailable("down".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
