use common::{ResourceType, TripId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row does not describe a valid booking record. `trip_id` is
    /// the key exactly as stored, which may itself be the corrupt part.
    #[error("Corrupt booking record for trip '{trip_id}': {reason}")]
    Corrupt { trip_id: String, reason: String },
}

/// Errors returned by `book` and `cancel`.
///
/// Only [`BookingError::TransientFault`] is worth retrying. The other variants
/// describe the record's state and will not change on a repeat call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingError {
    /// The call failed before reaching a decision (injected fault, timeout,
    /// store unavailable).
    #[error("{resource} service transient fault: {reason}")]
    TransientFault {
        resource: ResourceType,
        reason: String,
    },

    /// The booking was cancelled earlier and must not be resurrected.
    #[error("{resource} booking for trip {trip_id} has already been cancelled")]
    AlreadyCancelled {
        resource: ResourceType,
        trip_id: TripId,
    },

    /// Cancel was called for a trip that was never booked.
    #[error("No {resource} booking exists for trip {trip_id}")]
    NotFound {
        resource: ResourceType,
        trip_id: TripId,
    },
}

impl BookingError {
    /// Returns true if repeating the call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::TransientFault { .. })
    }

    /// Returns the resource type the error came from.
    pub fn resource(&self) -> ResourceType {
        match self {
            BookingError::TransientFault { resource, .. }
            | BookingError::AlreadyCancelled { resource, .. }
            | BookingError::NotFound { resource, .. } => *resource,
        }
    }

    /// Builds a transient fault for a resource.
    pub fn transient(resource: ResourceType, reason: impl Into<String>) -> Self {
        BookingError::TransientFault {
            resource,
            reason: reason.into(),
        }
    }
}

/// A fault-injection rate outside `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Fault rate {0} is outside [0.0, 1.0]")]
pub struct FaultRateError(pub f64);
