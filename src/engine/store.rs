use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::model::*;

use super::SharedResourceState;

/// Exclusive lock on one reservation row. Held across the whole read-decide-commit
/// sequence of an operation on that reservation.
pub type RowLock = Arc<Mutex<()>>;

/// Committed state plus the locks that guard it.
///
/// Reservation rows live in their own table rather than inside the resource so
/// that row-level writers (cancel, sweep) never need the resource lock, and so
/// that a resource-lock holder can read rows without waiting on row locks.
/// Map entries are only borrowed for a copy or an in-place write and are never
/// held across an `.await`.
pub struct InMemoryStore {
    resources: DashMap<Ulid, SharedResourceState>,
    reservations: DashMap<Ulid, Reservation>,
    row_locks: DashMap<Ulid, RowLock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            reservations: DashMap::new(),
            row_locks: DashMap::new(),
        }
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn insert_resource(&self, id: Ulid, state: SharedResourceState) {
        self.resources.insert(id, state);
    }

    /// Insert unless the id is taken. Returns false if it was.
    pub fn insert_resource_if_absent(&self, id: Ulid, state: SharedResourceState) -> bool {
        match self.resources.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(state);
                true
            }
        }
    }

    pub fn remove_resource(&self, id: &Ulid) -> Option<(Ulid, SharedResourceState)> {
        self.resources.remove(id)
    }

    pub fn resource_ids(&self) -> Vec<Ulid> {
        self.resources.iter().map(|e| *e.key()).collect()
    }

    // ── Reservations ─────────────────────────────────────────

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Copy of the committed row.
    pub fn get_reservation(&self, id: &Ulid) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    /// Copies of the committed rows for `ids`, skipping ids that are gone.
    pub fn reservations_of(&self, ids: &[Ulid]) -> Vec<Reservation> {
        ids.iter().filter_map(|id| self.get_reservation(id)).collect()
    }

    /// Copies of every committed row matching `pred`.
    pub fn reservations_where(&self, pred: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Drop settled ids from `rs.live_ids`. Caller holds the write lock.
    pub fn prune_settled(&self, rs: &mut ResourceState) {
        rs.live_ids.retain(|id| {
            self.reservations
                .get(id)
                .is_some_and(|row| !row.status.is_terminal())
        });
    }

    pub fn row_lock(&self, id: &Ulid) -> Option<RowLock> {
        self.row_locks.get(id).map(|e| e.value().clone())
    }

    fn insert_reservation(&self, reservation: Reservation) {
        self.row_locks
            .entry(reservation.id)
            .or_insert_with(|| Arc::new(Mutex::new(())));
        self.reservations.insert(reservation.id, reservation);
    }

    fn set_status(&self, id: &Ulid, status: ReservationStatus) {
        if let Some(mut row) = self.reservations.get_mut(id) {
            row.status = status;
            row.expires_at = None;
        }
    }

    fn remove_reservation(&self, id: &Ulid) {
        self.reservations.remove(id);
        self.row_locks.remove(id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event that only touches reservation rows.
    pub fn apply_row_event(&self, event: &Event) {
        match event {
            Event::HoldConfirmed { id, .. } => self.set_status(id, ReservationStatus::Confirmed),
            Event::ReservationCancelled { id, .. } => {
                self.set_status(id, ReservationStatus::Cancelled)
            }
            Event::HoldsExpired { ids } => {
                for id in ids {
                    self.set_status(id, ReservationStatus::Expired);
                }
            }
            _ => {}
        }
    }

    /// Apply an event scoped to one resource (caller holds its write lock).
    pub fn apply_resource_event(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::HoldPlaced {
                id,
                resource_id,
                principal_id,
                quantity,
                expires_at,
                created_at,
            } => {
                self.insert_reservation(Reservation {
                    id: *id,
                    resource_id: *resource_id,
                    principal_id: *principal_id,
                    status: ReservationStatus::Hold,
                    quantity: *quantity,
                    expires_at: Some(*expires_at),
                    created_at: *created_at,
                });
                rs.reservation_ids.push(*id);
                rs.live_ids.push(*id);
            }
            Event::ResourceUpdated {
                name,
                description,
                capacity,
                active,
                schedule,
                ..
            } => rs.apply_spec(ResourceSpec {
                name: name.clone(),
                description: description.clone(),
                capacity: *capacity,
                active: *active,
                schedule: *schedule,
            }),
            Event::ResourceDeleted { .. } => {
                rs.live_ids.clear();
                for id in rs.reservation_ids.drain(..) {
                    self.remove_reservation(&id);
                }
            }
            Event::HoldConfirmed { .. }
            | Event::ReservationCancelled { .. }
            | Event::HoldsExpired { .. } => self.apply_row_event(event),
            // Handled at the map level.
            Event::ResourceCreated { .. } => {}
        }
    }
}
