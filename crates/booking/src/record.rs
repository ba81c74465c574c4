//! Booking records and the confirmations returned to callers.

use chrono::{DateTime, Utc};
use common::{Payload, ResourceType, TripId};
use serde::{Deserialize, Serialize};

/// Status of a booking record.
///
/// ```text
/// Booked ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

impl BookingStatus {
    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "booked" => Some(BookingStatus::Booked),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a record, carrying the timestamps valid for it.
///
/// A cancelled record without `booked_at` is a tombstone: the trip was
/// cancelled before any booking reached this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BookingState {
    Booked {
        booked_at: DateTime<Utc>,
    },
    Cancelled {
        booked_at: Option<DateTime<Utc>>,
        cancelled_at: DateTime<Utc>,
    },
}

impl BookingState {
    pub fn status(&self) -> BookingStatus {
        match self {
            BookingState::Booked { .. } => BookingStatus::Booked,
            BookingState::Cancelled { .. } => BookingStatus::Cancelled,
        }
    }
}

/// A single resource booking for one trip.
///
/// Records are created once per trip and never deleted, so the store doubles as
/// an audit trail of what each service was asked to hold and release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub trip_id: TripId,
    pub resource: ResourceType,
    pub payload: Payload,
    #[serde(flatten)]
    pub state: BookingState,
}

impl BookingRecord {
    /// Creates a freshly booked record.
    pub fn booked(
        trip_id: TripId,
        resource: ResourceType,
        payload: Payload,
        booked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            trip_id,
            resource,
            payload,
            state: BookingState::Booked { booked_at },
        }
    }

    /// Creates a cancelled record for a trip that was never booked.
    pub fn tombstone(trip_id: TripId, resource: ResourceType, cancelled_at: DateTime<Utc>) -> Self {
        Self {
            trip_id,
            resource,
            payload: Payload::new(),
            state: BookingState::Cancelled {
                booked_at: None,
                cancelled_at,
            },
        }
    }

    /// Returns this record moved to `cancelled`.
    ///
    /// An already-cancelled record is returned unchanged.
    pub fn cancel(self, cancelled_at: DateTime<Utc>) -> Self {
        let state = match self.state {
            BookingState::Booked { booked_at } => BookingState::Cancelled {
                booked_at: Some(booked_at),
                cancelled_at,
            },
            cancelled @ BookingState::Cancelled { .. } => cancelled,
        };
        Self { state, ..self }
    }

    pub fn status(&self) -> BookingStatus {
        self.state.status()
    }

    pub fn booked_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            BookingState::Booked { booked_at } => Some(booked_at),
            BookingState::Cancelled { booked_at, .. } => booked_at,
        }
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            BookingState::Booked { .. } => None,
            BookingState::Cancelled { cancelled_at, .. } => Some(cancelled_at),
        }
    }

    /// Returns true for a cancelled record that was never booked.
    pub fn is_tombstone(&self) -> bool {
        matches!(
            self.state,
            BookingState::Cancelled {
                booked_at: None,
                ..
            }
        )
    }
}

/// Result of a successful `book` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
}

impl BookingConfirmation {
    /// Builds the confirmation for a record that is currently booked.
    pub fn from_record(record: &BookingRecord) -> Option<Self> {
        match record.state {
            BookingState::Booked { booked_at } => Some(Self {
                status: BookingStatus::Booked,
                booked_at,
            }),
            BookingState::Cancelled { .. } => None,
        }
    }
}

/// Result of a successful `cancel` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationConfirmation {
    pub status: BookingStatus,
    pub cancelled_at: DateTime<Utc>,
}

impl CancellationConfirmation {
    /// Builds the confirmation for a record that is currently cancelled.
    pub fn from_record(record: &BookingRecord) -> Option<Self> {
        record.cancelled_at().map(|cancelled_at| Self {
            status: BookingStatus::Cancelled,
            cancelled_at,
        })
    }
}
