//! Branch and trip outcomes.

use booking::{BookingConfirmation, BookingError, CancellationConfirmation};
use common::{PerResource, ResourceType};
use serde::{Deserialize, Serialize};

use crate::retry::{RetryError, Retried};
use crate::state::TripResult;

/// How one branch of a phase settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BranchOutcome<T> {
    /// The call succeeded, possibly after retries.
    Succeeded { result: T, attempts: u32 },
    /// The call failed with an error that retrying cannot fix.
    PermanentFailure { error: BookingError, attempts: u32 },
    /// Every attempt in the retry budget failed transiently.
    Exhausted { error: BookingError, attempts: u32 },
}

impl<T> BranchOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, BranchOutcome::Succeeded { .. })
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            BranchOutcome::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BookingError> {
        match self {
            BranchOutcome::Succeeded { .. } => None,
            BranchOutcome::PermanentFailure { error, .. } | BranchOutcome::Exhausted { error, .. } => {
                Some(error)
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            BranchOutcome::Succeeded { attempts, .. }
            | BranchOutcome::PermanentFailure { attempts, .. }
            | BranchOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BranchOutcome<U> {
        match self {
            BranchOutcome::Succeeded { result, attempts } => BranchOutcome::Succeeded {
                result: f(result),
                attempts,
            },
            BranchOutcome::PermanentFailure { error, attempts } => {
                BranchOutcome::PermanentFailure { error, attempts }
            }
            BranchOutcome::Exhausted { error, attempts } => {
                BranchOutcome::Exhausted { error, attempts }
            }
        }
    }
}

impl<T> From<Result<Retried<T>, RetryError<BookingError>>> for BranchOutcome<T> {
    fn from(result: Result<Retried<T>, RetryError<BookingError>>) -> Self {
        match result {
            Ok(Retried { value, attempts }) => BranchOutcome::Succeeded {
                result: value,
                attempts,
            },
            Err(RetryError::Permanent { attempts, error }) => {
                BranchOutcome::PermanentFailure { error, attempts }
            }
            Err(RetryError::Exhausted { attempts, error }) => {
                BranchOutcome::Exhausted { error, attempts }
            }
        }
    }
}

/// What a successful compensation call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompensationResult {
    /// The service confirmed the booking is cancelled.
    Cancelled(CancellationConfirmation),
    /// The service holds nothing for this trip.
    NothingToRelease,
}

impl CompensationResult {
    pub fn confirmation(&self) -> Option<&CancellationConfirmation> {
        match self {
            CompensationResult::Cancelled(confirmation) => Some(confirmation),
            CompensationResult::NothingToRelease => None,
        }
    }
}

/// Outcome of one booking branch.
pub type BookingOutcome = BranchOutcome<BookingConfirmation>;

/// Outcome of one compensation branch.
pub type CompensationOutcome = BranchOutcome<CompensationResult>;

/// Terminal outcome of a submitted trip.
///
/// `Cancelled` and `CancelFailed` carry every branch outcome of both phases,
/// which is what an operator needs to reconcile a `CancelFailed` trip by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum TripOutcome {
    Booked {
        bookings: PerResource<BookingConfirmation>,
    },
    Cancelled {
        booking: PerResource<BookingOutcome>,
        cancellations: PerResource<CompensationResult>,
    },
    CancelFailed {
        booking: PerResource<BookingOutcome>,
        cancellations: PerResource<CompensationOutcome>,
    },
}

impl TripOutcome {
    pub fn result(&self) -> TripResult {
        match self {
            TripOutcome::Booked { .. } => TripResult::Booked,
            TripOutcome::Cancelled { .. } => TripResult::Cancelled,
            TripOutcome::CancelFailed { .. } => TripResult::CancelFailed,
        }
    }

    /// Returns the booking errors that triggered compensation.
    pub fn booking_errors(&self) -> Vec<(ResourceType, &BookingError)> {
        match self {
            TripOutcome::Booked { .. } => Vec::new(),
            TripOutcome::Cancelled { booking, .. } | TripOutcome::CancelFailed { booking, .. } => {
                booking
                    .iter()
                    .filter_map(|(resource, outcome)| outcome.error().map(|e| (resource, e)))
                    .collect()
            }
        }
    }

    /// Returns the resources whose release could not be confirmed.
    pub fn unreleased(&self) -> Vec<ResourceType> {
        match self {
            TripOutcome::CancelFailed { cancellations, .. } => cancellations
                .iter()
                .filter(|(_, outcome)| !outcome.is_success())
                .map(|(resource, _)| resource)
                .collect(),
            _ => Vec::new(),
        }
    }
}
