//! Reservation lifecycle: which status changes are legal, and when a hold lapses.
//!
//! ```text
//! HOLD ──► CONFIRMED ──► CANCELLED
//!   │ └──────────────────► CANCELLED
//!   └──► EXPIRED
//! ```
//!
//! Nothing here touches storage; the engine applies a validated transition
//! while holding the locks the transition requires.

use crate::model::*;

use super::EngineError;

/// A hold lapses strictly after its deadline. `expires_at == now` is still live.
///
/// Every path that asks "is this hold expired?" (the ledger, confirm and the
/// sweeper) goes through this function.
pub fn hold_lapsed(expires_at: Ms, now: Ms) -> bool {
    expires_at < now
}

impl ReservationStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Expired)
    }

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Hold, Confirmed) | (Hold, Cancelled) | (Hold, Expired) | (Confirmed, Cancelled)
        )
    }
}

impl Reservation {
    /// True for a HOLD whose deadline has passed at `now`.
    pub fn is_lapsed_hold(&self, now: Ms) -> bool {
        self.status == ReservationStatus::Hold
            && self.expires_at.is_some_and(|at| hold_lapsed(at, now))
    }

    /// True for a HOLD that still consumes capacity at `now`.
    pub fn is_active_hold(&self, now: Ms) -> bool {
        self.status == ReservationStatus::Hold && !self.is_lapsed_hold(now)
    }

    /// Validate and build the row this reservation becomes after moving to `next`.
    /// Every status reachable from HOLD carries no deadline.
    pub fn transition(&self, next: ReservationStatus) -> Result<Reservation, EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidState {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        Ok(Reservation {
            status: next,
            expires_at: None,
            ..self.clone()
        })
    }
}
