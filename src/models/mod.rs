pub mod seat;
pub mod booking;

pub use seat::{Seat, SeatNo, SeatNoError, SeatNoInput};
pub use booking::{ReservationRequest, ValidBooking};
