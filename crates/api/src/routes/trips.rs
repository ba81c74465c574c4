//! Trip submission and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use booking::{BookingRecord, RecordStore, ResourceBookingService};
use common::{PerResource, TripId};
use saga::{
    CarRental, FlightItinerary, HotelStay, SagaExecution, SagaPhase, Trip, TripOutcome,
    TripResult, TripSagaOrchestrator,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Booking service over a record store of type `S`.
pub type Service<S> = ResourceBookingService<S>;

/// Saga orchestrator whose three services share a store type.
pub type TripSaga<S> = TripSagaOrchestrator<Service<S>, Service<S>, Service<S>>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore> {
    pub saga: TripSaga<S>,
    /// Name of the record store backend, reported by the health check.
    pub store_kind: &'static str,
}

// -- Request types --

/// Body of `POST /trips`. A trip id is generated when none is given.
#[derive(Deserialize)]
pub struct TripRequest {
    pub id: Option<String>,
    pub hotel: HotelStay,
    pub flight: FlightItinerary,
    pub car: CarRental,
}

impl TripRequest {
    fn into_trip(self) -> Result<Trip, ApiError> {
        let id = match self.id {
            Some(raw) => TripId::parse(&raw)?,
            None => TripId::new(),
        };
        Ok(Trip {
            id,
            hotel: self.hotel,
            flight: self.flight,
            car: self.car,
        })
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct TripResponse {
    pub trip_id: TripId,
    #[serde(flatten)]
    pub outcome: TripOutcome,
}

#[derive(Serialize)]
pub struct ExecutionResponse {
    pub phase: SagaPhase,
    pub result: Option<TripResult>,
    #[serde(flatten)]
    pub execution: SagaExecution,
}

#[derive(Serialize)]
pub struct BookingsResponse {
    pub trip_id: TripId,
    pub bookings: PerResource<Option<BookingRecord>>,
}

// -- Handlers --

/// POST /trips: run the saga to a terminal state and return its outcome.
#[tracing::instrument(skip(state, req))]
pub async fn submit<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<TripRequest>,
) -> Result<Json<TripResponse>, ApiError> {
    let trip = req.into_trip()?;
    let trip_id = trip.id.clone();
    let outcome = state.saga.submit(trip).await?;
    Ok(Json(TripResponse { trip_id, outcome }))
}

/// GET /trips/{id}: the trip's saga execution, including its event history.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let trip_id = TripId::parse(&id)?;
    let execution = state
        .saga
        .get_execution(&trip_id)
        .await
        .ok_or(saga::SagaError::ExecutionNotFound(trip_id))?;

    Ok(Json(ExecutionResponse {
        phase: execution.state().phase(),
        result: execution.state().result(),
        execution,
    }))
}

/// GET /trips/{id}/bookings: each service's record for the trip.
#[tracing::instrument(skip(state))]
pub async fn bookings<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<BookingsResponse>, ApiError> {
    let trip_id = TripId::parse(&id)?;
    let (hotel, flight, car) = tokio::join!(
        state.saga.hotel().record(&trip_id),
        state.saga.flight().record(&trip_id),
        state.saga.car().record(&trip_id),
    );
    let bookings = PerResource::new(hotel?, flight?, car?);

    if bookings.all(Option::is_none) {
        return Err(ApiError::NotFound(format!("No bookings for trip {trip_id}")));
    }
    Ok(Json(BookingsResponse { trip_id, bookings }))
}
