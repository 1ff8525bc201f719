use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use super::seat::{SeatNo, SeatNoInput};
use crate::outcome::ReservationError;

/// Максимальная длина имени бронирующего (колонка booked_by VARCHAR(255)).
pub const MAX_BOOKER_NAME_LEN: usize = 255;

const REQUIRED_MESSAGE: &str = "Both seatNo and nameOfBooker are required";

/// Запрос на бронирование места, как он приходит от транспорта.
///
/// Оба поля опциональны, чтобы "поле не передано" тоже классифицировалось
/// как некорректный ввод, а не как ошибка десериализации.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    #[validate(required(message = "Both seatNo and nameOfBooker are required"), custom(function = "validate_seat_no"))]
    pub seat_no: Option<SeatNoInput>,
    #[validate(required(message = "Both seatNo and nameOfBooker are required"), custom(function = "validate_booker_name"))]
    pub name_of_booker: Option<String>,
}

/// Проверенный запрос: канонический номер места и обрезанное имя.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBooking {
    pub seat_no: SeatNo,
    pub booker: String,
}

impl ReservationRequest {
    pub fn new(seat_no: impl Into<SeatNoInput>, name_of_booker: impl Into<String>) -> Self {
        Self {
            seat_no: Some(seat_no.into()),
            name_of_booker: Some(name_of_booker.into()),
        }
    }

    /// Валидация до любого обращения к хранилищу.
    pub fn into_valid(self) -> Result<ValidBooking, ReservationError> {
        self.validate()
            .map_err(|errors| ReservationError::InvalidInput(first_message(&errors)))?;

        let (Some(seat_no), Some(booker)) = (self.seat_no, self.name_of_booker) else {
            return Err(ReservationError::InvalidInput(REQUIRED_MESSAGE.to_string()));
        };
        let seat_no = seat_no
            .to_seat_no()
            .map_err(|e| ReservationError::InvalidInput(e.to_string()))?;

        Ok(ValidBooking {
            seat_no,
            booker: booker.trim().to_string(),
        })
    }
}

fn validate_seat_no(input: &SeatNoInput) -> Result<(), ValidationError> {
    input.to_seat_no().map(|_| ()).map_err(|e| {
        ValidationError::new("seat_no").with_message(Cow::Owned(e.to_string()))
    })
}

fn validate_booker_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("empty")
            .with_message(Cow::Borrowed("nameOfBooker cannot be empty")));
    }
    if trimmed.chars().count() > MAX_BOOKER_NAME_LEN {
        return Err(ValidationError::new("length")
            .with_message(Cow::Borrowed("nameOfBooker is too long")));
    }
    Ok(())
}

// seatNo проверяем первым, чтобы сообщение не зависело от порядка в HashMap
fn first_message(errors: &ValidationErrors) -> String {
    let fields = errors.field_errors();
    ["seat_no", "name_of_booker"]
        .iter()
        .filter_map(|field| fields.get(*field))
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "invalid reservation request".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_message(request: ReservationRequest) -> String {
        match request.into_valid() {
            Err(ReservationError::InvalidInput(msg)) => msg,
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn trims_booker_name_and_normalises_seat() {
        let valid = ReservationRequest::new("007", "  John Doe ").into_valid().unwrap();
        assert_eq!(valid.seat_no.as_str(), "7");
        assert_eq!(valid.booker, "John Doe");
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let missing_seat = ReservationRequest {
            seat_no: None,
            name_of_booker: Some("John Doe".into()),
        };
        assert_eq!(invalid_message(missing_seat), REQUIRED_MESSAGE);

        let missing_name = ReservationRequest {
            seat_no: Some("A1".into()),
            name_of_booker: None,
        };
        assert_eq!(invalid_message(missing_name), REQUIRED_MESSAGE);
    }

    #[test]
    fn whitespace_only_name_is_rejected() {
        let msg = invalid_message(ReservationRequest::new("A1", " \t "));
        assert_eq!(msg, "nameOfBooker cannot be empty");
    }

    #[test]
    fn overlong_name_is_rejected() {
        let msg = invalid_message(ReservationRequest::new("A1", "x".repeat(256)));
        assert_eq!(msg, "nameOfBooker is too long");
    }

    #[test]
    fn seat_errors_take_precedence() {
        let msg = invalid_message(ReservationRequest::new(0, ""));
        assert_eq!(msg, "seatNo must be a positive number");
    }

    #[test]
    fn deserializes_camel_case_body() {
        let req: ReservationRequest =
            serde_json::from_str(r#"{"seatNo": 55, "nameOfBooker": "Jane Smith"}"#).unwrap();
        assert_eq!(req, ReservationRequest::new(55, "Jane Smith"));

        let req: ReservationRequest = serde_json::from_str(r#"{"seatNo": "A1"}"#).unwrap();
        assert_eq!(req.name_of_booker, None);
    }
}
