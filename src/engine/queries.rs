//! Display reads. These never feed a write decision, so they take at most a
//! resource read lock and may observe state a concurrent writer is about to change.

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    fn info_for(&self, rs: &ResourceState, now: Ms) -> ResourceInfo {
        let usage = self.usage(rs, None, now);
        ResourceInfo {
            id: rs.id,
            name: rs.name.clone(),
            description: rs.description.clone(),
            capacity: rs.capacity,
            active: rs.active,
            schedule: rs.schedule,
            created_at: rs.created_at,
            hold_count: usage.hold_count(),
            confirmed_count: usage.confirmed_count(),
            available_capacity: usage.available_capacity(rs.capacity),
        }
    }

    /// Resource detail with its derived counts at `now`.
    pub async fn resource_info(&self, id: Ulid, now: Ms) -> Result<ResourceInfo, EngineError> {
        let rs = self.store.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(self.info_for(&guard, now))
    }

    pub async fn hold_count(&self, id: Ulid, now: Ms) -> Result<u64, EngineError> {
        Ok(self.resource_info(id, now).await?.hold_count)
    }

    pub async fn confirmed_count(&self, id: Ulid, now: Ms) -> Result<u64, EngineError> {
        Ok(self.resource_info(id, now).await?.confirmed_count)
    }

    pub async fn available_capacity(&self, id: Ulid, now: Ms) -> Result<i64, EngineError> {
        Ok(self.resource_info(id, now).await?.available_capacity)
    }

    /// Resources matching `filter`, ordered by schedule start (unscheduled last).
    pub async fn list_resources(&self, filter: ResourceFilter, now: Ms) -> Vec<ResourceInfo> {
        let mut out = Vec::new();
        for id in self.store.resource_ids() {
            let Some(rs) = self.store.get_resource(&id) else {
                continue;
            };
            let guard = rs.read().await;
            if filter.matches(&guard) {
                out.push(self.info_for(&guard, now));
            }
        }
        out.sort_by_key(|info| {
            (
                info.schedule.is_none(),
                info.schedule.map(|s| s.start),
                info.created_at,
                info.id,
            )
        });
        out
    }

    pub fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store.get_reservation(&id).ok_or(EngineError::NotFound(id))
    }

    /// Every reservation placed against a resource, oldest first.
    pub async fn reservations_for_resource(
        &self,
        resource_id: Ulid,
    ) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(self.store.reservations_of(&guard.reservation_ids))
    }

    /// A principal's own reservations, newest first.
    pub fn reservations_for_principal(&self, principal_id: Ulid) -> Vec<Reservation> {
        let mut rows = self
            .store
            .reservations_where(|r| r.principal_id == principal_id);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}
