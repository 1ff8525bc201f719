use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Максимальная длина нечислового номера места ("A1", "VIP-12").
pub const MAX_SEAT_LABEL_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: i64,
    pub seat_no: SeatNo,
    pub is_booked: bool,
    pub booked_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Канонический номер места.
///
/// Числовые номера нормализуются к десятичной записи без ведущих нулей,
/// поэтому `42`, `"042"` и `" 42 "` указывают на одно и то же место.
/// Уникальность и сравнение - побайтовые по канонической форме.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SeatNo(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatNoError {
    #[error("seatNo cannot be empty")]
    Empty,
    #[error("seatNo must be a positive number")]
    NotPositive,
    #[error("seatNo is out of range")]
    OutOfRange,
    #[error("seatNo may contain only letters, digits, '-' and '_' (max {MAX_SEAT_LABEL_LEN} chars)")]
    Malformed,
}

impl SeatNo {
    pub fn from_number(n: i64) -> Result<Self, SeatNoError> {
        if n <= 0 {
            return Err(SeatNoError::NotPositive);
        }
        Ok(SeatNo(n.to_string()))
    }

    pub fn parse(raw: &str) -> Result<Self, SeatNoError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(SeatNoError::Empty);
        }

        let digits = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            // числовой номер: должен влезать в i64 и быть > 0
            let n: i64 = s.parse().map_err(|_| SeatNoError::OutOfRange)?;
            return Self::from_number(n);
        }

        let well_formed = s.len() <= MAX_SEAT_LABEL_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !well_formed {
            return Err(SeatNoError::Malformed);
        }
        Ok(SeatNo(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Числовое значение, если номер числовой.
    pub fn as_number(&self) -> Option<i64> {
        if self.0.bytes().all(|b| b.is_ascii_digit()) {
            self.0.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for SeatNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Номер места в том виде, в котором его прислал клиент: число или строка.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeatNoInput {
    Number(serde_json::Number),
    Text(String),
}

impl SeatNoInput {
    pub fn to_seat_no(&self) -> Result<SeatNo, SeatNoError> {
        match self {
            SeatNoInput::Number(n) => match n.as_i64() {
                Some(n) => SeatNo::from_number(n),
                // дробные и слишком большие числа
                None if n.as_f64().is_some_and(|f| f <= 0.0) => Err(SeatNoError::NotPositive),
                None => Err(SeatNoError::OutOfRange),
            },
            SeatNoInput::Text(s) => SeatNo::parse(s),
        }
    }
}

impl From<i64> for SeatNoInput {
    fn from(n: i64) -> Self {
        SeatNoInput::Number(n.into())
    }
}

impl From<i32> for SeatNoInput {
    fn from(n: i32) -> Self {
        SeatNoInput::Number(n.into())
    }
}

impl From<&str> for SeatNoInput {
    fn from(s: &str) -> Self {
        SeatNoInput::Text(s.to_string())
    }
}

impl From<String> for SeatNoInput {
    fn from(s: String) -> Self {
        SeatNoInput::Text(s)
    }
}
