use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::{ReservationRequest, Seat};
use crate::outcome::{OutcomeKind, ReservationError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/book-seat", post(book_seat))
        .route("/seats/claim", post(claim_seat))
}

/* ---------- helpers ---------- */

type ApiError = (StatusCode, Json<Value>);

pub(crate) fn status_for(kind: OutcomeKind) -> StatusCode {
    match kind {
        OutcomeKind::Booked => StatusCode::OK,
        OutcomeKind::InvalidInput | OutcomeKind::AlreadyBooked => StatusCode::BAD_REQUEST,
        OutcomeKind::NotFound => StatusCode::NOT_FOUND,
        OutcomeKind::Conflict => StatusCode::CONFLICT,
        OutcomeKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn reject(err: ReservationError) -> ApiError {
    let kind = err.kind();
    (status_for(kind), Json(json!({ "error": err.to_string(), "kind": kind })))
}

// кривой JSON - это тоже некорректный ввод, а не 422 от axum
fn reject_body(rejection: JsonRejection) -> ApiError {
    tracing::debug!("rejected request body: {}", rejection.body_text());
    reject(ReservationError::InvalidInput(rejection.body_text()))
}

fn booked(seat: Seat) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "message": "Seat booked successfully", "seat": seat })),
    )
}

/* ---------- BOOKINGS ---------- */

// POST /api/book-seat - место должно существовать
async fn book_seat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(reject_body)?;
    let seat = state
        .coordinator
        .book_existing_seat(request)
        .await
        .map_err(reject)?;
    Ok(booked(seat))
}

// POST /api/seats/claim - отсутствующее место создаётся
async fn claim_seat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(reject_body)?;
    let seat = state
        .coordinator
        .find_or_create_and_book(request)
        .await
        .map_err(reject)?;
    Ok(booked(seat))
}
