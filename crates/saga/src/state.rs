//! Saga state machine.

use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// The state of a trip saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Start ──► BookingInFlight ──┬──► Booked
///                             └──► CompensatingInFlight ──┬──► Cancelled
///                                                         └──► CancelFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Saga has been created but no booking call has been issued.
    #[default]
    Start,

    /// Booking calls are in flight on all three branches.
    BookingInFlight,

    /// All three resources were booked (terminal state).
    Booked,

    /// A booking branch failed and cancellation calls are in flight.
    CompensatingInFlight,

    /// Every cancellation succeeded (terminal state).
    Cancelled,

    /// At least one cancellation could not be completed (terminal state).
    CancelFailed,
}

/// Coarse phase of a saga, as reported on its execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaPhase {
    Booking,
    Compensating,
    Done,
}

/// Final result of a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripResult {
    Booked,
    Cancelled,
    CancelFailed,
}

impl TripResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripResult::Booked => "Booked",
            TripResult::Cancelled => "Cancelled",
            TripResult::CancelFailed => "CancelFailed",
        }
    }
}

impl std::fmt::Display for TripResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SagaState {
    /// Start → BookingInFlight.
    pub fn begin_booking(self) -> Result<SagaState, SagaError> {
        match self {
            SagaState::Start => Ok(SagaState::BookingInFlight),
            state => Err(SagaError::InvalidTransition {
                state,
                event: "begin_booking",
            }),
        }
    }

    /// BookingInFlight → Booked, or → CompensatingInFlight if any branch failed.
    pub fn booking_settled(self, all_booked: bool) -> Result<SagaState, SagaError> {
        match self {
            SagaState::BookingInFlight if all_booked => Ok(SagaState::Booked),
            SagaState::BookingInFlight => Ok(SagaState::CompensatingInFlight),
            state => Err(SagaError::InvalidTransition {
                state,
                event: "booking_settled",
            }),
        }
    }

    /// CompensatingInFlight → Cancelled, or → CancelFailed if any branch failed.
    pub fn compensation_settled(self, all_cancelled: bool) -> Result<SagaState, SagaError> {
        match self {
            SagaState::CompensatingInFlight if all_cancelled => Ok(SagaState::Cancelled),
            SagaState::CompensatingInFlight => Ok(SagaState::CancelFailed),
            state => Err(SagaError::InvalidTransition {
                state,
                event: "compensation_settled",
            }),
        }
    }

    /// Returns the phase this state belongs to.
    pub fn phase(&self) -> SagaPhase {
        match self {
            SagaState::Start | SagaState::BookingInFlight => SagaPhase::Booking,
            SagaState::CompensatingInFlight => SagaPhase::Compensating,
            SagaState::Booked | SagaState::Cancelled | SagaState::CancelFailed => SagaPhase::Done,
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.phase() == SagaPhase::Done
    }

    /// Returns the result for a terminal state.
    pub fn result(&self) -> Option<TripResult> {
        match self {
            SagaState::Booked => Some(TripResult::Booked),
            SagaState::Cancelled => Some(TripResult::Cancelled),
            SagaState::CancelFailed => Some(TripResult::CancelFailed),
            _ => None,
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Start => "Start",
            SagaState::BookingInFlight => "BookingInFlight",
            SagaState::Booked => "Booked",
            SagaState::CompensatingInFlight => "CompensatingInFlight",
            SagaState::Cancelled => "Cancelled",
            SagaState::CancelFailed => "CancelFailed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
