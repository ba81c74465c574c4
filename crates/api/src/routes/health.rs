//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use booking::RecordStore;
use serde::Serialize;

use super::trips::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub trips: usize,
}

/// GET /health: liveness plus the store backend and number of trips seen.
pub async fn check<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store_kind,
        trips: state.saga.execution_count().await,
    })
}
