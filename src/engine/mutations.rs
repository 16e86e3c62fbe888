use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

fn validate_spec(spec: &ResourceSpec) -> Result<(), EngineError> {
    if spec.capacity == 0 {
        return Err(EngineError::InvalidArgument("capacity must be at least 1"));
    }
    if let Some(ref n) = spec.name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("resource name too long"));
    }
    if let Some(ref d) = spec.description
        && d.len() > MAX_DESCRIPTION_LEN
    {
        return Err(EngineError::LimitExceeded("resource description too long"));
    }
    if let Some(schedule) = spec.schedule
        && schedule.start >= schedule.end
    {
        return Err(EngineError::InvalidArgument("schedule must start before it ends"));
    }
    Ok(())
}

fn validate_quantity(quantity: u32) -> Result<(), EngineError> {
    if quantity == 0 {
        return Err(EngineError::InvalidArgument("quantity must be at least 1"));
    }
    if quantity > MAX_HOLD_QUANTITY {
        return Err(EngineError::LimitExceeded("quantity too large"));
    }
    Ok(())
}

fn resource_updated(id: Ulid, spec: ResourceSpec) -> Event {
    Event::ResourceUpdated {
        id,
        name: spec.name,
        description: spec.description,
        capacity: spec.capacity,
        active: spec.active,
        schedule: spec.schedule,
    }
}

impl Engine {
    // ── Resource administration ──────────────────────────────

    pub async fn create_resource(
        &self,
        id: Ulid,
        spec: ResourceSpec,
        now: Ms,
    ) -> Result<(), EngineError> {
        validate_spec(&spec)?;
        let _commit = self.enter_commit().await;
        if self.store.resource_count() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }

        let event = Event::ResourceCreated {
            id,
            name: spec.name.clone(),
            description: spec.description.clone(),
            capacity: spec.capacity,
            active: spec.active,
            schedule: spec.schedule,
            created_at: now,
        };

        // Publish the resource write-locked so nothing can reserve against it
        // before its creation is durable.
        let rs = Arc::new(RwLock::new(ResourceState::new(id, spec, now)));
        let guard = rs.clone().write_owned().await;
        if !self.store.insert_resource_if_absent(id, rs) {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Err(e) = self.wal_append(&event).await {
            self.store.remove_resource(&id);
            return Err(e);
        }
        drop(guard);

        info!("created resource {id}");
        Ok(())
    }

    /// Replace a resource's editable attributes. Capacity may shrink below what
    /// is already held or confirmed; existing reservations are kept and later
    /// confirms fail until usage drops back under capacity.
    pub async fn update_resource(
        &self,
        id: Ulid,
        spec: ResourceSpec,
        now: Ms,
    ) -> Result<(), EngineError> {
        validate_spec(&spec)?;
        let _commit = self.enter_commit().await;
        let mut guard = self.lock_resource(&id).await?;

        let in_use = self.usage(&guard, None, now).in_use();
        if u64::from(spec.capacity) < in_use {
            warn!(
                "resource {id}: capacity set to {} below current usage {in_use}",
                spec.capacity
            );
        }

        let event = resource_updated(id, spec);
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Convenience over `update_resource` for flipping only the active flag.
    pub async fn set_resource_active(&self, id: Ulid, active: bool) -> Result<(), EngineError> {
        let _commit = self.enter_commit().await;
        let mut guard = self.lock_resource(&id).await?;
        let mut spec = guard.spec();
        spec.active = active;
        let event = resource_updated(id, spec);
        self.persist_and_apply(&mut guard, &event).await?;
        info!("resource {id} active={active}");
        Ok(())
    }

    /// Delete a resource and its finished reservations. Refused while any
    /// reservation is still a HOLD or CONFIRMED.
    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        let _commit = self.enter_commit().await;
        let mut guard = self.lock_resource(&id).await?;

        self.store.prune_settled(&mut guard);
        if !guard.live_ids.is_empty() {
            return Err(EngineError::ResourceInUse(id));
        }

        let event = Event::ResourceDeleted { id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.store.remove_resource(&id);
        info!("deleted resource {id}");
        Ok(())
    }

    // ── Reservation protocol ─────────────────────────────────

    /// Soft-reserve `quantity` units of a resource until `now + hold_ttl`.
    ///
    /// Holds the resource's write lock across the capacity check and the
    /// commit, so concurrent holds on one resource are serialized.
    pub async fn create_hold(
        &self,
        resource_id: Ulid,
        principal_id: Ulid,
        quantity: u32,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let result = self.place_hold(resource_id, principal_id, quantity, now).await;
        observability::record_op("create_hold", &result);
        result
    }

    async fn place_hold(
        &self,
        resource_id: Ulid,
        principal_id: Ulid,
        quantity: u32,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        validate_quantity(quantity)?;
        let _commit = self.enter_commit().await;
        let mut guard = self.lock_resource(&resource_id).await?;

        if !guard.active {
            return Err(EngineError::ResourceInactive(resource_id));
        }
        // Only live rows count toward the limit; settled ones are history.
        self.store.prune_settled(&mut guard);
        if guard.live_ids.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        let available = self.usage(&guard, None, now).available_capacity(guard.capacity);
        if available < i64::from(quantity) {
            return Err(EngineError::InsufficientCapacity {
                available,
                requested: quantity,
            });
        }

        let expires_at = now
            .checked_add(self.hold_ttl())
            .ok_or(EngineError::InvalidArgument("hold deadline out of range"))?;
        let id = Ulid::new();
        let event = Event::HoldPlaced {
            id,
            resource_id,
            principal_id,
            quantity,
            expires_at,
            created_at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("hold {id}: {quantity} on {resource_id} until {expires_at}");

        Ok(Reservation {
            id,
            resource_id,
            principal_id,
            status: ReservationStatus::Hold,
            quantity,
            expires_at: Some(expires_at),
            created_at: now,
        })
    }

    /// Turn a live HOLD into a permanent reservation.
    ///
    /// A hold found lapsed at `now` is marked EXPIRED (and that is committed)
    /// before `ReservationExpired` is returned.
    pub async fn confirm(
        &self,
        reservation_id: Ulid,
        principal_id: Ulid,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let result = self.confirm_hold(reservation_id, principal_id, now).await;
        observability::record_op("confirm", &result);
        result
    }

    async fn confirm_hold(
        &self,
        reservation_id: Ulid,
        principal_id: Ulid,
        now: Ms,
    ) -> Result<Reservation, EngineError> {
        let _commit = self.enter_commit().await;
        let _row = self.lock_row(&reservation_id).await?;
        let row = self
            .store
            .get_reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        if row.principal_id != principal_id {
            return Err(EngineError::Unauthorized {
                reservation_id,
                principal_id,
            });
        }
        let confirmed = row.transition(ReservationStatus::Confirmed)?;

        if row.is_lapsed_hold(now) {
            let event = Event::HoldsExpired {
                ids: vec![reservation_id],
            };
            self.persist_row_event(&event).await?;
            metrics::counter!(observability::HOLDS_EXPIRED_TOTAL).increment(1);
            debug!("hold {reservation_id} lapsed before confirm");
            return Err(EngineError::ReservationExpired(reservation_id));
        }

        // Row lock first, then resource: the fixed order shared with every other path.
        let mut guard = self.lock_resource(&row.resource_id).await?;
        if !guard.active {
            return Err(EngineError::ResourceInactive(row.resource_id));
        }
        self.store.prune_settled(&mut guard);
        let available = self
            .usage(&guard, Some(reservation_id), now)
            .available_capacity(guard.capacity);
        if available < i64::from(row.quantity) {
            return Err(EngineError::InsufficientCapacity {
                available,
                requested: row.quantity,
            });
        }

        let event = Event::HoldConfirmed {
            id: reservation_id,
            resource_id: row.resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!("confirmed {reservation_id}");
        Ok(confirmed)
    }

    /// Cancel a HOLD or CONFIRMED reservation, releasing its capacity.
    ///
    /// Takes only the row lock: releasing capacity can never break the
    /// capacity invariant for a concurrent reader.
    pub async fn cancel(
        &self,
        reservation_id: Ulid,
        principal_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let result = self.cancel_reservation(reservation_id, principal_id).await;
        observability::record_op("cancel", &result);
        result
    }

    async fn cancel_reservation(
        &self,
        reservation_id: Ulid,
        principal_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let _commit = self.enter_commit().await;
        let _row = self.lock_row(&reservation_id).await?;
        let row = self
            .store
            .get_reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        if row.principal_id != principal_id {
            return Err(EngineError::Unauthorized {
                reservation_id,
                principal_id,
            });
        }
        let cancelled = row.transition(ReservationStatus::Cancelled)?;

        let event = Event::ReservationCancelled {
            id: reservation_id,
            resource_id: row.resource_id,
        };
        self.persist_row_event(&event).await?;
        debug!("cancelled {reservation_id} ({} from {})", row.quantity, row.status);
        Ok(cancelled)
    }
}
