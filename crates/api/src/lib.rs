//! HTTP API server with observability for the trip booking saga.
//!
//! Provides REST endpoints to submit trips and inspect their saga executions
//! and booking records, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking::{
    FaultRateError, InMemoryRecordStore, PostgresRecordStore, RecordStore, ResourceBookingService,
};
use common::ResourceType;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::TripSagaOrchestrator;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::trips::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/trips", post(routes::trips::submit::<S>))
        .route("/trips/{id}", get(routes::trips::get::<S>))
        .route("/trips/{id}/bookings", get(routes::trips::bookings::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the saga over one store per resource type, applying the configured
/// fault rates and retry timings.
pub fn create_state<S: RecordStore + Clone + 'static>(
    config: &Config,
    store_kind: &'static str,
    mut store_for: impl FnMut(ResourceType) -> S,
) -> Result<Arc<AppState<S>>, FaultRateError> {
    let mut service = |resource: ResourceType| {
        ResourceBookingService::new(resource, store_for(resource))
            .with_fault_rates(*config.fault_rates.get(resource))
    };

    let saga = TripSagaOrchestrator::with_policies(
        service(ResourceType::Hotel)?,
        service(ResourceType::Flight)?,
        service(ResourceType::Car)?,
        config.saga_policies(),
    );

    Ok(Arc::new(AppState { saga, store_kind }))
}

/// Creates application state backed by in-memory stores.
pub fn create_default_state(
    config: &Config,
) -> Result<Arc<AppState<InMemoryRecordStore>>, FaultRateError> {
    create_state(config, "memory", |_| InMemoryRecordStore::new())
}

/// Creates application state backed by PostgreSQL. Migrations must already
/// have been applied to `pool`.
pub fn create_postgres_state(
    config: &Config,
    pool: PgPool,
) -> Result<Arc<AppState<PostgresRecordStore>>, FaultRateError> {
    create_state(config, "postgres", |resource| {
        PostgresRecordStore::new(pool.clone(), resource)
    })
}
