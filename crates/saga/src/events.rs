//! Saga history events.

use chrono::{DateTime, Utc};
use common::{ResourceType, TripId};
use serde::{Deserialize, Serialize};

use crate::outcome::{BookingOutcome, CompensationOutcome};

/// Events recorded on a saga execution, in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// The saga was submitted and the booking phase began.
    SagaStarted(SagaStartedData),

    /// One booking branch settled.
    BookingBranchSettled(BookingBranchData),

    /// All three bookings succeeded.
    BookingSucceeded(PhaseSettledData),

    /// At least one booking branch failed; compensation begins.
    BookingFailed(PhaseSettledData),

    /// One compensation branch settled.
    CompensationBranchSettled(CompensationBranchData),

    /// Every booking was released.
    CompensationSucceeded(PhaseSettledData),

    /// At least one cancellation could not be completed.
    CompensationFailed(PhaseSettledData),
}

impl SagaEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::BookingBranchSettled(_) => "BookingBranchSettled",
            SagaEvent::BookingSucceeded(_) => "BookingSucceeded",
            SagaEvent::BookingFailed(_) => "BookingFailed",
            SagaEvent::CompensationBranchSettled(_) => "CompensationBranchSettled",
            SagaEvent::CompensationSucceeded(_) => "CompensationSucceeded",
            SagaEvent::CompensationFailed(_) => "CompensationFailed",
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub trip_id: TripId,
    pub started_at: DateTime<Utc>,
}

/// Data for BookingBranchSettled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingBranchData {
    pub resource: ResourceType,
    pub outcome: BookingOutcome,
    pub settled_at: DateTime<Utc>,
}

/// Data for CompensationBranchSettled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationBranchData {
    pub resource: ResourceType,
    pub outcome: CompensationOutcome,
    pub settled_at: DateTime<Utc>,
}

/// Data for the events that close a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSettledData {
    pub settled_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(trip_id: TripId) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            trip_id,
            started_at: Utc::now(),
        })
    }

    pub fn booking_branch_settled(resource: ResourceType, outcome: BookingOutcome) -> Self {
        SagaEvent::BookingBranchSettled(BookingBranchData {
            resource,
            outcome,
            settled_at: Utc::now(),
        })
    }

    pub fn booking_succeeded() -> Self {
        SagaEvent::BookingSucceeded(PhaseSettledData {
            settled_at: Utc::now(),
        })
    }

    pub fn booking_failed() -> Self {
        SagaEvent::BookingFailed(PhaseSettledData {
            settled_at: Utc::now(),
        })
    }

    pub fn compensation_branch_settled(
        resource: ResourceType,
        outcome: CompensationOutcome,
    ) -> Self {
        SagaEvent::CompensationBranchSettled(CompensationBranchData {
            resource,
            outcome,
            settled_at: Utc::now(),
        })
    }

    pub fn compensation_succeeded() -> Self {
        SagaEvent::CompensationSucceeded(PhaseSettledData {
            settled_at: Utc::now(),
        })
    }

    pub fn compensation_failed() -> Self {
        SagaEvent::CompensationFailed(PhaseSettledData {
            settled_at: Utc::now(),
        })
    }

    /// Returns when the event happened.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SagaEvent::SagaStarted(data) => data.started_at,
            SagaEvent::BookingBranchSettled(data) => data.settled_at,
            SagaEvent::CompensationBranchSettled(data) => data.settled_at,
            SagaEvent::BookingSucceeded(data)
            | SagaEvent::BookingFailed(data)
            | SagaEvent::CompensationSucceeded(data)
            | SagaEvent::CompensationFailed(data) => data.settled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{BranchOutcome, CompensationResult};
    use booking::BookingError;

    #[test]
    fn test_event_types() {
        let trip_id = TripId::parse("trip-1").unwrap();
        assert_eq!(SagaEvent::saga_started(trip_id).event_type(), "SagaStarted");
        assert_eq!(SagaEvent::booking_failed().event_type(), "BookingFailed");
        assert_eq!(
            SagaEvent::compensation_succeeded().event_type(),
            "CompensationSucceeded"
        );
    }

    #[test]
    fn test_serialization_roundtrip() {
        let event = SagaEvent::compensation_branch_settled(
            ResourceType::Car,
            BranchOutcome::Exhausted {
                error: BookingError::transient(ResourceType::Car, "failed to cancel booking"),
                attempts: 100,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CompensationBranchSettled");
        assert_eq!(json["data"]["resource"], "car");
        assert_eq!(json["data"]["outcome"]["outcome"], "exhausted");
        assert_eq!(json["data"]["outcome"]["error"]["kind"], "transient_fault");

        let back: SagaEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_nothing_to_release_serializes() {
        let event = SagaEvent::compensation_branch_settled(
            ResourceType::Hotel,
            BranchOutcome::Succeeded {
                result: CompensationResult::NothingToRelease,
                attempts: 1,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["outcome"]["result"]["kind"], "nothing_to_release");
    }
}
