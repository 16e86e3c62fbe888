use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Hold,
    Confirmed,
    Cancelled,
    Expired,
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReservationStatus::Hold => "HOLD",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// A committed reservation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub principal_id: Ulid,
    pub status: ReservationStatus,
    pub quantity: u32,
    /// Only set while the reservation is a HOLD.
    pub expires_at: Option<Ms>,
    pub created_at: Ms,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: u32,
    pub active: bool,
    /// When the resource itself takes place (e.g. the event's time window).
    pub schedule: Option<Span>,
    pub created_at: Ms,
    /// Every reservation placed against this resource, oldest first.
    pub reservation_ids: Vec<Ulid>,
    /// Reservations that were HOLD or CONFIRMED at the last prune. A superset
    /// of the live rows: settled ids leave only under the write lock.
    pub live_ids: Vec<Ulid>,
}

impl ResourceState {
    pub fn new(id: Ulid, spec: ResourceSpec, created_at: Ms) -> Self {
        Self {
            id,
            name: spec.name,
            description: spec.description,
            capacity: spec.capacity,
            active: spec.active,
            schedule: spec.schedule,
            created_at,
            reservation_ids: Vec::new(),
            live_ids: Vec::new(),
        }
    }

    pub fn apply_spec(&mut self, spec: ResourceSpec) {
        self.name = spec.name;
        self.description = spec.description;
        self.capacity = spec.capacity;
        self.active = spec.active;
        self.schedule = spec.schedule;
    }

    pub fn spec(&self) -> ResourceSpec {
        ResourceSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            capacity: self.capacity,
            active: self.active,
            schedule: self.schedule,
        }
    }
}

/// Administrator-editable attributes of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: u32,
    pub active: bool,
    pub schedule: Option<Span>,
}

impl ResourceSpec {
    /// An active, unnamed resource with the given capacity.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            name: None,
            description: None,
            capacity,
            active: true,
            schedule: None,
        }
    }
}

/// One committed mutation. Flat, no nesting: this is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        name: Option<String>,
        description: Option<String>,
        capacity: u32,
        active: bool,
        schedule: Option<Span>,
        created_at: Ms,
    },
    ResourceUpdated {
        id: Ulid,
        name: Option<String>,
        description: Option<String>,
        capacity: u32,
        active: bool,
        schedule: Option<Span>,
    },
    ResourceDeleted {
        id: Ulid,
    },
    HoldPlaced {
        id: Ulid,
        resource_id: Ulid,
        principal_id: Ulid,
        quantity: u32,
        expires_at: Ms,
        created_at: Ms,
    },
    HoldConfirmed {
        id: Ulid,
        resource_id: Ulid,
    },
    ReservationCancelled {
        id: Ulid,
        resource_id: Ulid,
    },
    /// One sweep batch (or a single expiry detected by confirm).
    HoldsExpired {
        ids: Vec<Ulid>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: u32,
    pub active: bool,
    pub schedule: Option<Span>,
    pub created_at: Ms,
    pub hold_count: u64,
    pub confirmed_count: u64,
    /// Negative when an administrator shrank capacity below current usage.
    pub available_capacity: i64,
}

/// Listing filter for resources. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub active: Option<bool>,
    /// Only scheduled resources starting at or after this instant.
    pub starts_after: Option<Ms>,
    /// Only scheduled resources ending at or before this instant.
    pub ends_before: Option<Ms>,
}

impl ResourceFilter {
    pub fn matches(&self, rs: &ResourceState) -> bool {
        if let Some(active) = self.active
            && rs.active != active
        {
            return false;
        }
        if self.starts_after.is_none() && self.ends_before.is_none() {
            return true;
        }
        let Some(schedule) = rs.schedule else {
            return false;
        };
        self.starts_after.is_none_or(|t| schedule.start >= t)
            && self.ends_before.is_none_or(|t| schedule.end <= t)
    }
}
