use thiserror::Error;
use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("insufficient capacity: available {available}, requested {requested}")]
    InsufficientCapacity { available: i64, requested: u32 },
    #[error("resource {0} is not active")]
    ResourceInactive(Ulid),
    #[error("reservation {0} has expired")]
    ReservationExpired(Ulid),
    #[error("reservation {id} cannot move from {from} to {to}")]
    InvalidState {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    #[error("principal {principal_id} does not own reservation {reservation_id}")]
    Unauthorized {
        reservation_id: Ulid,
        principal_id: Ulid,
    },
    #[error("resource {0} still has held or confirmed reservations")]
    ResourceInUse(Ulid),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Stable caller-facing code, one per error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InsufficientCapacity { .. } => "insufficient_capacity",
            EngineError::ResourceInactive(_) => "resource_inactive",
            EngineError::ReservationExpired(_) => "reservation_expired",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::Unauthorized { .. } => "unauthorized",
            EngineError::ResourceInUse(_) => "resource_in_use",
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "storage_error",
        }
    }
}
