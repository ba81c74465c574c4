//! Per-trip saga execution record.

use chrono::{DateTime, Utc};
use common::{PerResource, ResourceType, TripId};
use serde::Serialize;

use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::outcome::{BookingOutcome, BranchOutcome, CompensationOutcome, TripOutcome};
use crate::state::{SagaPhase, SagaState};

/// Everything known about one trip's saga.
///
/// The record only changes through [`SagaExecution::record`], which checks each
/// event against the state machine. A branch outcome, once recorded, is never
/// overwritten, and the state never moves backwards.
#[derive(Debug, Clone, Serialize)]
pub struct SagaExecution {
    trip_id: TripId,
    state: SagaState,
    booking: PerResource<Option<BookingOutcome>>,
    compensation: PerResource<Option<CompensationOutcome>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    history: Vec<SagaEvent>,
}

impl SagaExecution {
    /// Creates an execution in the `Start` state.
    pub fn new(trip_id: TripId) -> Self {
        Self {
            trip_id,
            state: SagaState::Start,
            booking: PerResource::default(),
            compensation: PerResource::default(),
            started_at: None,
            finished_at: None,
            history: Vec::new(),
        }
    }

    /// Applies an event, rejecting it if the current state does not allow it.
    pub fn record(&mut self, event: SagaEvent) -> Result<()> {
        let next = match &event {
            SagaEvent::SagaStarted(data) => {
                if data.trip_id != self.trip_id {
                    return Err(SagaError::OutcomeMismatch {
                        event: event.event_type(),
                    });
                }
                self.state.begin_booking()?
            }
            SagaEvent::BookingBranchSettled(data) => {
                self.expect_state(SagaState::BookingInFlight, &event)?;
                let slot = self.booking.get_mut(data.resource);
                if slot.is_some() {
                    return Err(SagaError::BranchAlreadySettled {
                        phase: SagaPhase::Booking,
                        resource: data.resource,
                    });
                }
                *slot = Some(data.outcome.clone());
                self.state
            }
            SagaEvent::BookingSucceeded(_) | SagaEvent::BookingFailed(_) => {
                self.expect_state(SagaState::BookingInFlight, &event)?;
                let all_booked = settled(&self.booking, SagaPhase::Booking)?;
                let claims_success = matches!(event, SagaEvent::BookingSucceeded(_));
                if all_booked != claims_success {
                    return Err(SagaError::OutcomeMismatch {
                        event: event.event_type(),
                    });
                }
                self.state.booking_settled(all_booked)?
            }
            SagaEvent::CompensationBranchSettled(data) => {
                self.expect_state(SagaState::CompensatingInFlight, &event)?;
                let slot = self.compensation.get_mut(data.resource);
                if slot.is_some() {
                    return Err(SagaError::BranchAlreadySettled {
                        phase: SagaPhase::Compensating,
                        resource: data.resource,
                    });
                }
                *slot = Some(data.outcome.clone());
                self.state
            }
            SagaEvent::CompensationSucceeded(_) | SagaEvent::CompensationFailed(_) => {
                self.expect_state(SagaState::CompensatingInFlight, &event)?;
                let all_cancelled = settled(&self.compensation, SagaPhase::Compensating)?;
                let claims_success = matches!(event, SagaEvent::CompensationSucceeded(_));
                if all_cancelled != claims_success {
                    return Err(SagaError::OutcomeMismatch {
                        event: event.event_type(),
                    });
                }
                self.state.compensation_settled(all_cancelled)?
            }
        };

        if matches!(event, SagaEvent::SagaStarted(_)) {
            self.started_at = Some(event.occurred_at());
        }
        if next.is_terminal() {
            self.finished_at = Some(event.occurred_at());
        }
        self.state = next;
        self.history.push(event);
        Ok(())
    }

    fn expect_state(&self, expected: SagaState, event: &SagaEvent) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SagaError::InvalidTransition {
                state: self.state,
                event: event.event_type(),
            })
        }
    }

    pub fn trip_id(&self) -> &TripId {
        &self.trip_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the booking outcome recorded for a resource, if it has settled.
    pub fn booking_outcome(&self, resource: ResourceType) -> Option<&BookingOutcome> {
        self.booking.get(resource).as_ref()
    }

    /// Returns the compensation outcome recorded for a resource, if it has settled.
    pub fn compensation_outcome(&self, resource: ResourceType) -> Option<&CompensationOutcome> {
        self.compensation.get(resource).as_ref()
    }

    /// Returns the events recorded so far, oldest first.
    pub fn history(&self) -> &[SagaEvent] {
        &self.history
    }

    /// Builds the terminal outcome. Returns `None` until the saga finishes.
    pub fn outcome(&self) -> Option<TripOutcome> {
        match self.state {
            SagaState::Booked => {
                let bookings = self
                    .booking
                    .clone()
                    .map(|_, outcome| outcome.and_then(|o| o.result().copied()))
                    .transpose()?;
                Some(TripOutcome::Booked { bookings })
            }
            SagaState::Cancelled => {
                let booking = self.booking.clone().transpose()?;
                let cancellations = self
                    .compensation
                    .clone()
                    .map(|_, outcome| outcome.and_then(|o| o.result().copied()))
                    .transpose()?;
                Some(TripOutcome::Cancelled {
                    booking,
                    cancellations,
                })
            }
            SagaState::CancelFailed => Some(TripOutcome::CancelFailed {
                booking: self.booking.clone().transpose()?,
                cancellations: self.compensation.clone().transpose()?,
            }),
            _ => None,
        }
    }
}

/// Returns whether every branch succeeded, or an error if one has not settled.
fn settled<T>(branches: &PerResource<Option<BranchOutcome<T>>>, phase: SagaPhase) -> Result<bool> {
    if !branches.all(Option::is_some) {
        return Err(SagaError::PhaseNotSettled { phase });
    }
    Ok(branches.all(|b| b.as_ref().is_some_and(|o| o.is_success())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CompensationResult;
    use crate::state::TripResult;
    use booking::{BookingConfirmation, BookingError, BookingStatus, CancellationConfirmation};

    fn trip_id() -> TripId {
        TripId::parse("trip-1").unwrap()
    }

    fn booked() -> BookingOutcome {
        BranchOutcome::Succeeded {
            result: BookingConfirmation {
                status: BookingStatus::Booked,
                booked_at: Utc::now(),
            },
            attempts: 1,
        }
    }

    fn failed(resource: ResourceType) -> BookingOutcome {
        BranchOutcome::Exhausted {
            error: BookingError::transient(resource, "failed to create booking"),
            attempts: 5,
        }
    }

    fn cancelled() -> CompensationOutcome {
        BranchOutcome::Succeeded {
            result: CompensationResult::Cancelled(CancellationConfirmation {
                status: BookingStatus::Cancelled,
                cancelled_at: Utc::now(),
            }),
            attempts: 1,
        }
    }

    fn started() -> SagaExecution {
        let mut execution = SagaExecution::new(trip_id());
        execution.record(SagaEvent::saga_started(trip_id())).unwrap();
        execution
    }

    fn settle_booking(execution: &mut SagaExecution, outcomes: [BookingOutcome; 3]) {
        for (resource, outcome) in ResourceType::ALL.into_iter().zip(outcomes) {
            execution
                .record(SagaEvent::booking_branch_settled(resource, outcome))
                .unwrap();
        }
    }

    #[test]
    fn test_happy_path_produces_booked_outcome() {
        let mut execution = started();
        assert_eq!(execution.state(), SagaState::BookingInFlight);
        assert!(execution.started_at().is_some());

        settle_booking(&mut execution, [booked(), booked(), booked()]);
        execution.record(SagaEvent::booking_succeeded()).unwrap();

        assert_eq!(execution.state(), SagaState::Booked);
        assert!(execution.finished_at().is_some());
        let outcome = execution.outcome().unwrap();
        assert_eq!(outcome.result(), TripResult::Booked);
        assert_eq!(execution.history().len(), 5);
    }

    #[test]
    fn test_compensation_path_produces_cancelled_outcome() {
        let mut execution = started();
        settle_booking(&mut execution, [booked(), failed(ResourceType::Flight), booked()]);
        execution.record(SagaEvent::booking_failed()).unwrap();
        assert_eq!(execution.state(), SagaState::CompensatingInFlight);
        assert!(execution.outcome().is_none());

        for resource in ResourceType::ALL {
            execution
                .record(SagaEvent::compensation_branch_settled(resource, cancelled()))
                .unwrap();
        }
        execution.record(SagaEvent::compensation_succeeded()).unwrap();

        let outcome = execution.outcome().unwrap();
        assert_eq!(outcome.result(), TripResult::Cancelled);
        assert_eq!(outcome.booking_errors()[0].0, ResourceType::Flight);
    }

    #[test]
    fn test_failed_compensation_produces_cancel_failed_outcome() {
        let mut execution = started();
        settle_booking(&mut execution, [failed(ResourceType::Hotel), booked(), booked()]);
        execution.record(SagaEvent::booking_failed()).unwrap();

        execution
            .record(SagaEvent::compensation_branch_settled(ResourceType::Hotel, cancelled()))
            .unwrap();
        execution
            .record(SagaEvent::compensation_branch_settled(ResourceType::Flight, cancelled()))
            .unwrap();
        execution
            .record(SagaEvent::compensation_branch_settled(
                ResourceType::Car,
                BranchOutcome::Exhausted {
                    error: BookingError::transient(ResourceType::Car, "down"),
                    attempts: 100,
                },
            ))
            .unwrap();
        execution.record(SagaEvent::compensation_failed()).unwrap();

        let outcome = execution.outcome().unwrap();
        assert_eq!(outcome.result(), TripResult::CancelFailed);
        assert_eq!(outcome.unreleased(), vec![ResourceType::Car]);
    }

    #[test]
    fn test_branch_outcome_cannot_be_overwritten() {
        let mut execution = started();
        execution
            .record(SagaEvent::booking_branch_settled(ResourceType::Car, booked()))
            .unwrap();

        let err = execution
            .record(SagaEvent::booking_branch_settled(
                ResourceType::Car,
                failed(ResourceType::Car),
            ))
            .unwrap_err();
        assert_eq!(
            err,
            SagaError::BranchAlreadySettled {
                phase: SagaPhase::Booking,
                resource: ResourceType::Car,
            }
        );
        assert!(execution.booking_outcome(ResourceType::Car).unwrap().is_success());
    }

    #[test]
    fn test_phase_cannot_close_early() {
        let mut execution = started();
        execution
            .record(SagaEvent::booking_branch_settled(ResourceType::Hotel, booked()))
            .unwrap();
        let err = execution.record(SagaEvent::booking_succeeded()).unwrap_err();
        assert_eq!(
            err,
            SagaError::PhaseNotSettled {
                phase: SagaPhase::Booking
            }
        );
        assert_eq!(execution.state(), SagaState::BookingInFlight);
    }

    #[test]
    fn test_closing_event_must_match_outcomes() {
        let mut execution = started();
        settle_booking(&mut execution, [booked(), failed(ResourceType::Flight), booked()]);
        let err = execution.record(SagaEvent::booking_succeeded()).unwrap_err();
        assert!(matches!(err, SagaError::OutcomeMismatch { .. }));
    }

    #[test]
    fn test_terminal_state_rejects_further_events() {
        let mut execution = started();
        settle_booking(&mut execution, [booked(), booked(), booked()]);
        execution.record(SagaEvent::booking_succeeded()).unwrap();

        let history_len = execution.history().len();
        assert!(execution.record(SagaEvent::saga_started(trip_id())).is_err());
        assert!(execution
            .record(SagaEvent::compensation_branch_settled(ResourceType::Car, cancelled()))
            .is_err());
        assert_eq!(execution.state(), SagaState::Booked);
        assert_eq!(execution.history().len(), history_len);
    }

    #[test]
    fn test_compensation_events_rejected_during_booking() {
        let mut execution = started();
        let err = execution
            .record(SagaEvent::compensation_branch_settled(ResourceType::Hotel, cancelled()))
            .unwrap_err();
        assert!(matches!(err, SagaError::InvalidTransition { .. }));
    }
}
