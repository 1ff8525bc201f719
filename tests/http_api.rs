use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use seat_reservation::config::Config;
use seat_reservation::controllers;
use seat_reservation::models::SeatNo;
use seat_reservation::store::MemorySeatStore;
use seat_reservation::AppState;

async fn test_app() -> (Router, MemorySeatStore) {
    let config = Config::from_lookup(|key| match key {
        "STORE_BACKEND" => Some("memory".to_string()),
        "SEED_BATCH_SIZE" => Some("10".to_string()),
        _ => None,
    })
    .unwrap();

    let store = MemorySeatStore::new(Duration::from_millis(200));
    store.preload(SeatNo::parse("A1").unwrap(), None).await.unwrap();
    store.preload(SeatNo::parse("A2").unwrap(), Some("Jane Doe")).await.unwrap();

    let state = AppState::with_store(&config, Arc::new(store.clone()));
    (controllers::app(state), store)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn book_seat_returns_the_booked_record() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/book-seat",
        Some(json!({ "seatNo": "A1", "nameOfBooker": "John Doe" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Seat booked successfully");
    assert_eq!(body["seat"]["seatNo"], "A1");
    assert_eq!(body["seat"]["isBooked"], true);
    assert_eq!(body["seat"]["bookedBy"], "John Doe");
}

#[tokio::test]
async fn booked_seat_is_bad_request() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/book-seat",
        Some(json!({ "seatNo": "A2", "nameOfBooker": "John Doe" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Seat is already booked", "kind": "ALREADY_BOOKED" }));
}

#[tokio::test]
async fn unknown_seat_is_not_found() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/book-seat",
        Some(json!({ "seatNo": "Z99", "nameOfBooker": "John Doe" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Seat not found");
    assert_eq!(body["kind"], "NOT_FOUND");
}

#[tokio::test]
async fn missing_fields_are_invalid_input() {
    let (app, store) = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/book-seat",
        Some(json!({ "seatNo": "A1" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Both seatNo and nameOfBooker are required");
    assert_eq!(body["kind"], "INVALID_INPUT");
    assert_eq!(store.operation_count(), 0);
}

#[tokio::test]
async fn malformed_json_is_invalid_input() {
    let (app, _) = test_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/seats/claim")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"seatNo\": "))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["kind"], "INVALID_INPUT");
}

#[tokio::test]
async fn claim_creates_numeric_seat() {
    let (app, store) = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/seats/claim",
        Some(json!({ "seatNo": 9012, "nameOfBooker": "Jane Smith" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seat"]["seatNo"], "9012");
    assert!(store.get(&SeatNo::parse("9012").unwrap()).await.is_some());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/seats/claim",
        Some(json!({ "seatNo": "9012", "nameOfBooker": "Alice Johnson" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ALREADY_BOOKED");
}

#[tokio::test]
async fn populate_and_status_report_inventory() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::POST, "/api/multiplex/populate", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["seatsCreated"], 10);
    assert_eq!(body["startSeatNo"], 1);
    assert_eq!(body["endSeatNo"], 10);

    let (status, body) = send(&app, Method::POST, "/api/multiplex/populate?batch=5", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["startSeatNo"], 11);
    assert_eq!(body["endSeatNo"], 15);

    let (status, body) = send(&app, Method::GET, "/api/multiplex/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "totalSeats": 17, "lastSeatNo": 15 }));
}

#[tokio::test]
async fn populate_rejects_out_of_range_batch() {
    let (app, _) = test_app().await;
    let (status, _) = send(&app, Method::POST, "/api/multiplex/populate?batch=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn populate_after_largest_seat_number_is_bad_request() {
    let (app, store) = test_app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/seats/claim",
        Some(json!({ "seatNo": i64::MAX, "nameOfBooker": "Jane Smith" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, "/api/multiplex/populate?batch=3", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("exhausted"));
    assert_eq!(store.snapshot().await.len(), 3);
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}
