//! outcome.rs
//!
//! Классификация результатов протоколов бронирования.
//!
//! Каждый вызов координатора возвращает ровно один [`OutcomeKind`]:
//! успешная бронь несёт снимок места, все остальные исходы описаны
//! вариантами [`ReservationError`].

use serde::Serialize;
use std::fmt;

use crate::models::{Seat, SeatNo};
use crate::store::StoreError;

pub type ReservationResult = Result<Seat, ReservationError>;

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    /// Ошибка клиента, транзакция не открывалась.
    #[error("{0}")]
    InvalidInput(String),

    /// Место не существует (только для протокола бронирования существующего места).
    #[error("Seat not found")]
    NotFound(SeatNo),

    /// Место уже занято: проигранная гонка или честно занятое место.
    #[error("Seat is already booked")]
    AlreadyBooked(SeatNo),

    /// Исчерпан бюджет повторов при конкурентном создании места.
    #[error("Seat {seat_no} is contended, gave up after {attempts} attempts")]
    Conflict { seat_no: SeatNo, attempts: u32 },

    /// Таймаут ожидания блокировки или сбой хранилища.
    #[error("Seat store unavailable")]
    StoreUnavailable(#[from] StoreError),
}

/// Закрытое множество исходов, которое видит транспортный слой.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Booked,
    AlreadyBooked,
    NotFound,
    InvalidInput,
    Conflict,
    StoreUnavailable,
}

impl OutcomeKind {
    pub fn classify(result: &ReservationResult) -> Self {
        match result {
            Ok(_) => OutcomeKind::Booked,
            Err(e) => e.kind(),
        }
    }

    /// Временные исходы: вызывающий может повторить весь вызов.
    pub fn is_transient(self) -> bool {
        matches!(self, OutcomeKind::Conflict | OutcomeKind::StoreUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Booked => "BOOKED",
            OutcomeKind::AlreadyBooked => "ALREADY_BOOKED",
            OutcomeKind::NotFound => "NOT_FOUND",
            OutcomeKind::InvalidInput => "INVALID_INPUT",
            OutcomeKind::Conflict => "CONFLICT",
            OutcomeKind::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReservationError {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ReservationError::InvalidInput(_) => OutcomeKind::InvalidInput,
            ReservationError::NotFound(_) => OutcomeKind::NotFound,
            ReservationError::AlreadyBooked(_) => OutcomeKind::AlreadyBooked,
            ReservationError::Conflict { .. } => OutcomeKind::Conflict,
            ReservationError::StoreUnavailable(_) => OutcomeKind::StoreUnavailable,
        }
    }
}
