//! Trip saga orchestrator.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use booking::{BookingError, BookingService};
use common::{Payload, PerResource, ResourceType, TripId};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::execution::SagaExecution;
use crate::outcome::{
    BookingOutcome, BranchOutcome, CompensationOutcome, CompensationResult, TripOutcome,
};
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::state::TripResult;
use crate::trip::Trip;

/// Retry policies for the two phases.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaPolicies {
    pub booking: RetryPolicy,
    pub compensation: RetryPolicy,
}

impl Default for SagaPolicies {
    fn default() -> Self {
        Self {
            booking: RetryPolicy::booking(),
            compensation: RetryPolicy::compensation(),
        }
    }
}

impl SagaPolicies {
    /// Sets the first retry delay for both phases.
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.booking = self.booking.with_initial_interval(interval);
        self.compensation = self.compensation.with_initial_interval(interval);
        self
    }

    /// Sets the per-attempt deadline for both phases.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.booking = self.booking.with_attempt_timeout(timeout);
        self.compensation = self.compensation.with_attempt_timeout(timeout);
        self
    }
}

/// Orchestrates trip sagas across the hotel, flight and car services.
///
/// Each phase fans out one task per service and waits for all three to settle
/// before deciding what happens next. A failed branch never aborts its
/// siblings. When any booking branch fails, every service is asked to cancel,
/// including those whose booking failed, since a timed-out call may still have
/// created a record.
pub struct TripSagaOrchestrator<H, F, C> {
    hotel: Arc<H>,
    flight: Arc<F>,
    car: Arc<C>,
    policies: SagaPolicies,
    executions: Arc<RwLock<HashMap<TripId, SagaExecution>>>,
}

impl<H, F, C> Clone for TripSagaOrchestrator<H, F, C> {
    fn clone(&self) -> Self {
        Self {
            hotel: self.hotel.clone(),
            flight: self.flight.clone(),
            car: self.car.clone(),
            policies: self.policies.clone(),
            executions: self.executions.clone(),
        }
    }
}

impl<H, F, C> TripSagaOrchestrator<H, F, C>
where
    H: BookingService + 'static,
    F: BookingService + 'static,
    C: BookingService + 'static,
{
    /// Creates an orchestrator with the default retry policies.
    pub fn new(hotel: H, flight: F, car: C) -> Self {
        Self::with_policies(hotel, flight, car, SagaPolicies::default())
    }

    pub fn with_policies(hotel: H, flight: F, car: C, policies: SagaPolicies) -> Self {
        Self {
            hotel: Arc::new(hotel),
            flight: Arc::new(flight),
            car: Arc::new(car),
            policies,
            executions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn hotel(&self) -> &H {
        &self.hotel
    }

    pub fn flight(&self) -> &F {
        &self.flight
    }

    pub fn car(&self) -> &C {
        &self.car
    }

    pub fn policies(&self) -> &SagaPolicies {
        &self.policies
    }

    /// Returns a snapshot of a trip's saga execution.
    pub async fn get_execution(&self, trip_id: &TripId) -> Option<SagaExecution> {
        self.executions.read().await.get(trip_id).cloned()
    }

    /// Returns the number of trips submitted so far.
    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    /// Runs the saga for a trip to a terminal state.
    ///
    /// Remote failures never surface as errors here: they decide whether the
    /// outcome is `Booked`, `Cancelled` or `CancelFailed`. An error means the
    /// trip was already submitted, the execution record rejected an event, or
    /// the task driving the saga panicked.
    ///
    /// Once the trip is registered the saga runs on its own task. Dropping the
    /// returned future stops the wait, not the saga.
    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id))]
    pub async fn submit(&self, trip: Trip) -> Result<TripOutcome> {
        let trip_id = trip.id.clone();
        self.start(&trip_id).await?;
        metrics::counter!("saga_executions_total").increment(1);
        tracing::info!("saga started");

        let saga = self.clone();
        let task_trip_id = trip_id.clone();
        let payloads = trip.payloads();
        let handle = tokio::spawn(
            async move { saga.run(&task_trip_id, payloads).await }.in_current_span(),
        );

        match handle.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "saga task aborted");
                Err(SagaError::TaskAborted {
                    trip_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Drives a registered execution through booking and, if needed,
    /// compensation.
    async fn run(&self, trip_id: &TripId, payloads: PerResource<Payload>) -> Result<TripOutcome> {
        let saga_start = std::time::Instant::now();

        let (hotel, flight, car) = tokio::join!(
            self.book_branch(self.hotel.clone(), trip_id, payloads.hotel),
            self.book_branch(self.flight.clone(), trip_id, payloads.flight),
            self.book_branch(self.car.clone(), trip_id, payloads.car),
        );
        let booking = PerResource::new(hotel?, flight?, car?);

        let outcome = if booking.all(BranchOutcome::is_success) {
            tracing::info!("all bookings confirmed");
            self.finish(trip_id, SagaEvent::booking_succeeded()).await?
        } else {
            for (resource, outcome) in booking.iter() {
                if let Some(error) = outcome.error() {
                    tracing::warn!(%resource, %error, "booking branch failed");
                }
            }
            self.record(trip_id, SagaEvent::booking_failed()).await?;
            self.compensate(trip_id).await?
        };

        let result = outcome.result();
        metrics::counter!("saga_outcomes_total", "result" => result.as_str()).increment(1);
        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        match result {
            TripResult::CancelFailed => {
                tracing::error!(
                    unreleased = ?outcome.unreleased(),
                    duration,
                    "saga finished with unreleased bookings"
                );
            }
            _ => tracing::info!(%result, duration, "saga finished"),
        }

        Ok(outcome)
    }

    /// Registers a new execution, rejecting a trip that was already submitted.
    async fn start(&self, trip_id: &TripId) -> Result<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(trip_id) {
            tracing::warn!(%trip_id, "duplicate trip submission");
            return Err(SagaError::AlreadySubmitted(trip_id.clone()));
        }

        let mut execution = SagaExecution::new(trip_id.clone());
        execution.record(SagaEvent::saga_started(trip_id.clone()))?;
        executions.insert(trip_id.clone(), execution);
        Ok(())
    }

    /// Cancels on every service and waits for all three to settle.
    #[tracing::instrument(skip(self))]
    async fn compensate(&self, trip_id: &TripId) -> Result<TripOutcome> {
        tracing::info!("compensation started");
        let (hotel, flight, car) = tokio::join!(
            self.cancel_branch(self.hotel.clone(), trip_id),
            self.cancel_branch(self.flight.clone(), trip_id),
            self.cancel_branch(self.car.clone(), trip_id),
        );
        let compensation = PerResource::new(hotel?, flight?, car?);

        let event = if compensation.all(BranchOutcome::is_success) {
            SagaEvent::compensation_succeeded()
        } else {
            SagaEvent::compensation_failed()
        };
        self.finish(trip_id, event).await
    }

    async fn book_branch<S: BookingService + 'static>(
        &self,
        service: Arc<S>,
        trip_id: &TripId,
        payload: Payload,
    ) -> Result<BookingOutcome> {
        let resource = service.resource();
        let policy = self.policies.booking.clone();
        let task_trip_id = trip_id.clone();

        let handle = tokio::spawn(async move {
            let timeout = policy.attempt_timeout;
            let result = retry_with_policy(
                &policy,
                move |_| {
                    let service = service.clone();
                    let trip_id = task_trip_id.clone();
                    let payload = payload.clone();
                    async move {
                        with_timeout(resource, timeout, service.book(&trip_id, payload)).await
                    }
                },
                BookingError::is_transient,
            )
            .await;
            BranchOutcome::from(result)
        });

        let outcome = join_branch(resource, handle).await;
        self.record(
            trip_id,
            SagaEvent::booking_branch_settled(resource, outcome.clone()),
        )
        .await?;
        Ok(outcome)
    }

    async fn cancel_branch<S: BookingService + 'static>(
        &self,
        service: Arc<S>,
        trip_id: &TripId,
    ) -> Result<CompensationOutcome> {
        let resource = service.resource();
        let policy = self.policies.compensation.clone();
        let task_trip_id = trip_id.clone();

        let handle = tokio::spawn(async move {
            let timeout = policy.attempt_timeout;
            let result = retry_with_policy(
                &policy,
                move |_| {
                    let service = service.clone();
                    let trip_id = task_trip_id.clone();
                    async move {
                        match with_timeout(resource, timeout, service.cancel(&trip_id)).await {
                            Ok(confirmation) => Ok(CompensationResult::Cancelled(confirmation)),
                            Err(BookingError::NotFound { .. }) => {
                                Ok(CompensationResult::NothingToRelease)
                            }
                            Err(error) => Err(error),
                        }
                    }
                },
                BookingError::is_transient,
            )
            .await;
            BranchOutcome::from(result)
        });

        let outcome = join_branch(resource, handle).await;
        if !outcome.is_success() {
            tracing::error!(%resource, %trip_id, "compensation branch failed");
        }
        self.record(
            trip_id,
            SagaEvent::compensation_branch_settled(resource, outcome.clone()),
        )
        .await?;
        Ok(outcome)
    }

    async fn record(&self, trip_id: &TripId, event: SagaEvent) -> Result<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(trip_id)
            .ok_or_else(|| SagaError::ExecutionNotFound(trip_id.clone()))?;
        execution.record(event)
    }

    /// Records the phase-closing event and returns the terminal outcome.
    async fn finish(&self, trip_id: &TripId, event: SagaEvent) -> Result<TripOutcome> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(trip_id)
            .ok_or_else(|| SagaError::ExecutionNotFound(trip_id.clone()))?;
        execution.record(event)?;
        execution.outcome().ok_or(SagaError::PhaseNotSettled {
            phase: execution.state().phase(),
        })
    }
}

/// Runs one remote call under a deadline. Overrunning it is a transient fault.
async fn with_timeout<T>(
    resource: ResourceType,
    timeout: Duration,
    call: impl Future<Output = std::result::Result<T, BookingError>>,
) -> std::result::Result<T, BookingError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BookingError::transient(
            resource,
            format!("call timed out after {}ms", timeout.as_millis()),
        )),
    }
}

/// Waits for a branch task. A task that panicked settles as exhausted.
async fn join_branch<T>(
    resource: ResourceType,
    handle: JoinHandle<BranchOutcome<T>>,
) -> BranchOutcome<T> {
    match handle.await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(%resource, error = %err, "branch task aborted");
            BranchOutcome::Exhausted {
                error: BookingError::transient(resource, format!("branch task aborted: {err}")),
                attempts: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SagaState;
    use crate::trip::{CarRental, FlightItinerary, HotelStay};
    use booking::{
        FaultRates, InMemoryRecordStore, MissingRecordPolicy, Operation, ResourceBookingService,
    };

    type Service = ResourceBookingService<InMemoryRecordStore>;

    fn service(resource: ResourceType) -> Service {
        ResourceBookingService::new(resource, InMemoryRecordStore::new())
    }

    fn orchestrator(
        hotel: Service,
        flight: Service,
        car: Service,
    ) -> TripSagaOrchestrator<Service, Service, Service> {
        TripSagaOrchestrator::new(hotel, flight, car)
    }

    fn trip(id: &str) -> Trip {
        Trip {
            id: TripId::parse(id).unwrap(),
            hotel: HotelStay {
                hotel: "Inn".into(),
                check_in: "2021-07-07".into(),
                check_out: "2021-07-09".into(),
            },
            flight: FlightItinerary {
                depart: "Detroit".into(),
                depart_at: "2021-07-07T06:00:00".into(),
                arrive: "Frankfurt".into(),
                arrive_at: "2021-07-07T08:00:00".into(),
            },
            car: CarRental {
                rental: "Volvo".into(),
                rental_from: "2021-07-07".into(),
                rental_to: "2021-07-09".into(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path() {
        let saga = orchestrator(
            service(ResourceType::Hotel),
            service(ResourceType::Flight),
            service(ResourceType::Car),
        );

        let outcome = saga.submit(trip("trip-1")).await.unwrap();
        assert_eq!(outcome.result(), TripResult::Booked);

        let trip_id = TripId::parse("trip-1").unwrap();
        let record = saga.car().record(&trip_id).await.unwrap().unwrap();
        assert_eq!(record.payload["rental"], "Volvo");

        let execution = saga.get_execution(&trip_id).await.unwrap();
        assert_eq!(execution.state(), SagaState::Booked);
        assert_eq!(execution.history().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_booking_failure_cancels_everything() {
        let car = service(ResourceType::Car)
            .with_fault_rates(FaultRates::new(1.0, 0.0).unwrap())
            .unwrap();
        let saga = orchestrator(service(ResourceType::Hotel), service(ResourceType::Flight), car);

        let outcome = saga.submit(trip("trip-2")).await.unwrap();
        assert_eq!(outcome.result(), TripResult::Cancelled);

        let trip_id = TripId::parse("trip-2").unwrap();
        let execution = saga.get_execution(&trip_id).await.unwrap();
        assert_eq!(
            execution.booking_outcome(ResourceType::Car).unwrap().attempts(),
            5
        );
        for resource in ResourceType::ALL {
            assert!(execution.compensation_outcome(resource).unwrap().is_success());
        }

        let hotel = saga.hotel().record(&trip_id).await.unwrap().unwrap();
        assert_eq!(hotel.status(), booking::BookingStatus::Cancelled);
        let car = saga.car().record(&trip_id).await.unwrap().unwrap();
        assert!(car.is_tombstone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compensation_failure_escalates() {
        let flight = service(ResourceType::Flight)
            .with_fault_rates(FaultRates::new(1.0, 0.0).unwrap())
            .unwrap();
        let car = service(ResourceType::Car)
            .with_fault_rates(FaultRates::new(0.0, 1.0).unwrap())
            .unwrap();
        let saga = orchestrator(service(ResourceType::Hotel), flight, car);

        let outcome = saga.submit(trip("trip-3")).await.unwrap();
        assert_eq!(outcome.result(), TripResult::CancelFailed);
        assert_eq!(outcome.unreleased(), vec![ResourceType::Car]);

        let trip_id = TripId::parse("trip-3").unwrap();
        let execution = saga.get_execution(&trip_id).await.unwrap();
        assert_eq!(
            execution.compensation_outcome(ResourceType::Car).unwrap().attempts(),
            100
        );

        let hotel = saga.hotel().record(&trip_id).await.unwrap().unwrap();
        assert_eq!(hotel.status(), booking::BookingStatus::Cancelled);
        let flight = saga.flight().record(&trip_id).await.unwrap().unwrap();
        assert_eq!(flight.status(), booking::BookingStatus::Cancelled);
        let car = saga.car().record(&trip_id).await.unwrap().unwrap();
        assert_eq!(car.status(), booking::BookingStatus::Booked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_submit_still_reaches_terminal_state() {
        let flight = service(ResourceType::Flight)
            .with_fault_rates(FaultRates::new(1.0, 0.0).unwrap())
            .unwrap();
        let saga = orchestrator(service(ResourceType::Hotel), flight, service(ResourceType::Car));

        let waited =
            tokio::time::timeout(Duration::from_millis(500), saga.submit(trip("trip-6"))).await;
        assert!(waited.is_err());

        let trip_id = TripId::parse("trip-6").unwrap();
        tokio::time::sleep(Duration::from_secs(10_000)).await;

        let execution = saga.get_execution(&trip_id).await.unwrap();
        assert_eq!(execution.state(), SagaState::Cancelled);
        assert!(execution.outcome().is_some());
        let hotel = saga.hotel().record(&trip_id).await.unwrap().unwrap();
        assert_eq!(hotel.status(), booking::BookingStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_counts_as_released() {
        let flight = service(ResourceType::Flight)
            .with_fault_rates(FaultRates::new(1.0, 0.0).unwrap())
            .unwrap()
            .with_missing_record_policy(MissingRecordPolicy::NotFound);
        let saga = orchestrator(service(ResourceType::Hotel), flight, service(ResourceType::Car));

        let outcome = saga.submit(trip("trip-4")).await.unwrap();
        match outcome {
            TripOutcome::Cancelled { cancellations, .. } => {
                assert_eq!(cancellations.flight, CompensationResult::NothingToRelease);
                assert!(cancellations.hotel.confirmation().is_some());
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_is_rejected() {
        let saga = orchestrator(
            service(ResourceType::Hotel),
            service(ResourceType::Flight),
            service(ResourceType::Car),
        );
        saga.submit(trip("trip-5")).await.unwrap();

        saga.flight().faults().set_rate(Operation::Book, 1.0).unwrap();
        let err = saga.submit(trip("trip-5")).await.unwrap_err();
        assert!(matches!(err, SagaError::AlreadySubmitted(_)));

        let execution = saga.get_execution(&TripId::parse("trip-5").unwrap()).await.unwrap();
        assert_eq!(execution.state(), SagaState::Booked);
    }

    #[test]
    fn test_policies_builders_apply_to_both_phases() {
        let policies = SagaPolicies::default()
            .with_initial_interval(Duration::from_millis(5))
            .with_attempt_timeout(Duration::from_millis(20));
        assert_eq!(policies.booking.max_attempts, 5);
        assert_eq!(policies.compensation.max_attempts, 100);
        assert_eq!(policies.booking.initial_interval, Duration::from_millis(5));
        assert_eq!(policies.compensation.attempt_timeout, Duration::from_millis(20));
    }
}
