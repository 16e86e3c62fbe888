use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

impl Engine {
    /// Expire every HOLD whose deadline is strictly before `now`, as one
    /// committed batch. Returns how many reservations changed.
    ///
    /// Never takes a resource lock: HOLD→EXPIRED only releases capacity. Row
    /// locks are taken in ascending id order and the lapse predicate is
    /// re-checked under each one, so a confirm or cancel that got there first wins.
    /// Calling it again with the same `now` changes nothing.
    pub async fn sweep_expired_holds(&self, now: Ms) -> Result<usize, EngineError> {
        let started = Instant::now();
        let _commit = self.enter_commit().await;

        let mut candidates: Vec<Ulid> = self
            .store
            .reservations_where(|r| r.is_lapsed_hold(now))
            .into_iter()
            .map(|r| r.id)
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }
        candidates.sort();

        let mut guards = Vec::with_capacity(candidates.len());
        let mut ids = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(lock) = self.store.row_lock(&id) else {
                continue;
            };
            let guard = lock.lock_owned().await;
            let still_lapsed = self
                .store
                .get_reservation(&id)
                .is_some_and(|r| r.is_lapsed_hold(now));
            if still_lapsed {
                ids.push(id);
                guards.push(guard);
            } else {
                debug!("sweep: {id} changed before its row lock was taken");
            }
        }
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        self.persist_row_event(&Event::HoldsExpired { ids }).await?;
        drop(guards);

        metrics::counter!(observability::HOLDS_EXPIRED_TOTAL).increment(count as u64);
        metrics::histogram!(observability::SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        info!("expired {count} lapsed holds");
        Ok(count)
    }
}
