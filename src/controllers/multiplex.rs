use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::services::SeedingError;
use crate::store::StoreError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/multiplex/populate", post(populate))
        .route("/multiplex/status", get(status))
}

#[derive(Debug, Deserialize)]
struct PopulateQuery {
    batch: Option<u32>,
}

// POST /api/multiplex/populate - засев свободных мест после текущего максимума
async fn populate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PopulateQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let report = state.seeding.populate(params.batch).await.map_err(|e| {
        let status = match &e {
            SeedingError::InvalidBatch(_) | SeedingError::NumbersExhausted { .. } => {
                StatusCode::BAD_REQUEST
            }
            SeedingError::Store(StoreError::DuplicateKey(_)) => StatusCode::CONFLICT,
            SeedingError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if e.is_client_error() {
            tracing::debug!("populate rejected: {}", e);
        } else if status == StatusCode::CONFLICT {
            tracing::warn!("populate raced with a seat claim: {}", e);
        } else {
            tracing::error!("populate failed: {}", e);
        }
        (status, Json(json!({ "error": "Failed to populate sample data", "details": e.to_string() })))
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Sample data populated successfully",
            "seatsCreated": report.seats_created,
            "startSeatNo": report.start_seat_no,
            "endSeatNo": report.end_seat_no,
        })),
    ))
}

// GET /api/multiplex/status
async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let status = state.seeding.status().await.map_err(|e| {
        tracing::error!("status query failed: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Failed to get status", "details": e.to_string() })),
        )
    })?;
    Ok((StatusCode::OK, Json(status)))
}
