//! Симулятор одновременных звонков: несколько клиентов одновременно
//! пытаются забронировать одно и то же место через HTTP API.

use futures::future::join_all;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{ReservationRequest, SeatNoInput};

/// Какой протокол бронирования дёргать.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /book-seat` - место должно существовать.
    BookExisting,
    /// `POST /seats/claim` - место создаётся при отсутствии.
    Claim,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::BookExisting => "book-seat",
            Endpoint::Claim => "seats/claim",
        }
    }
}

/// Результат одного звонка.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedBooking {
    pub name_of_booker: String,
    pub success: bool,
    pub status: u16,
    pub message: String,
}

pub struct SimulatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl SimulatorClient {
    /// `base_url` указывает на префикс API, например `http://localhost:3000/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn book_seat(
        &self,
        seat_no: SeatNoInput,
        name_of_booker: &str,
        endpoint: Endpoint,
    ) -> Result<SimulatedBooking, reqwest::Error> {
        let request = ReservationRequest::new(seat_no, name_of_booker);
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, endpoint.path()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        // тело может быть не JSON (например, ответ прокси)
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get(if status.is_success() { "message" } else { "error" })
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown response"))
            .to_string();

        debug!(booker = %name_of_booker, status = status.as_u16(), "simulated call finished");
        Ok(SimulatedBooking {
            name_of_booker: name_of_booker.to_string(),
            success: status.is_success(),
            status: status.as_u16(),
            message,
        })
    }

    /// Запускает по одному звонку на каждое имя одновременно.
    /// Результаты возвращаются в порядке `names`.
    pub async fn race(
        &self,
        seat_no: &SeatNoInput,
        names: &[String],
        endpoint: Endpoint,
    ) -> Vec<Result<SimulatedBooking, reqwest::Error>> {
        let calls = names
            .iter()
            .map(|name| self.book_seat(seat_no.clone(), name, endpoint));
        let results = join_all(calls).await;

        let winners = results
            .iter()
            .filter(|r| matches!(r, Ok(b) if b.success))
            .count();
        if winners > 1 {
            warn!(winners, "more than one caller got the same seat");
        }
        results
    }
}

/// Номер места из аргумента командной строки: число, если парсится, иначе метка.
pub fn seat_no_from_arg(arg: &str) -> SeatNoInput {
    match arg.trim().parse::<i64>() {
        Ok(n) => SeatNoInput::from(n),
        Err(_) => SeatNoInput::from(arg),
    }
}
