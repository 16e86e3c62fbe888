use ulid::Ulid;

use crate::model::*;

/// Quantity committed against one resource at a given instant.
///
/// A tally is only safe to act on while the caller holds the resource's write
/// lock across tally, decision and commit. Outside it, the numbers are for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Sum of quantities of HOLDs that have not lapsed.
    pub held: u64,
    /// Sum of quantities of CONFIRMED reservations.
    pub confirmed: u64,
}

impl Usage {
    pub fn tally<'a>(reservations: impl IntoIterator<Item = &'a Reservation>, now: Ms) -> Self {
        let mut usage = Usage::default();
        for r in reservations {
            match r.status {
                ReservationStatus::Confirmed => usage.confirmed += u64::from(r.quantity),
                ReservationStatus::Hold if r.is_active_hold(now) => {
                    usage.held += u64::from(r.quantity)
                }
                _ => {}
            }
        }
        usage
    }

    /// Tally everything except `skip`. A hold being confirmed must not compete
    /// against its own quantity.
    pub fn tally_excluding<'a>(
        reservations: impl IntoIterator<Item = &'a Reservation>,
        skip: Ulid,
        now: Ms,
    ) -> Self {
        Self::tally(reservations.into_iter().filter(|r| r.id != skip), now)
    }

    pub fn hold_count(&self) -> u64 {
        self.held
    }

    pub fn confirmed_count(&self) -> u64 {
        self.confirmed
    }

    pub fn in_use(&self) -> u64 {
        self.held + self.confirmed
    }

    /// `capacity - held - confirmed`. Negative after a capacity shrink below usage.
    pub fn available_capacity(&self, capacity: u32) -> i64 {
        i64::from(capacity) - self.in_use() as i64
    }
}
