//! reservation.rs
//!
//! Координатор бронирования мест.
//!
//! Реализует два протокола поверх [`SeatStore`]:
//! 1.  **Бронирование существующего места** (`book_existing_seat`): поиск с
//!     блокировкой, проверка занятости, обновление, commit. Не повторяется:
//!     проигранная гонка сразу даёт `ALREADY_BOOKED`.
//! 2.  **Найти-или-создать и забронировать** (`find_or_create_and_book`): то же,
//!     но отсутствующее место создаётся в той же транзакции. Если место
//!     параллельно создала другая транзакция (`DuplicateKey`), весь протокол
//!     повторяется в новой транзакции, но не больше `max_create_retries` раз.
//!
//! Блокировка, взятая при поиске, держится до commit/abort, поэтому вторая
//! транзакция не может увидеть "места нет" или "место свободно" для того же
//! номера, пока первая не завершится.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ReservationConfig;
use crate::models::{ReservationRequest, Seat, SeatNo, ValidBooking};
use crate::outcome::{OutcomeKind, ReservationError, ReservationResult};
use crate::store::{IsolationLevel, SeatStore, SeatTransaction, StoreError};

/// Точка расширения между шагами протокола.
///
/// Вызывается после поиска с блокировкой и до записи. В рабочей сборке не
/// устанавливается; тесты подставляют сюда задержку, чтобы расширить окно гонки.
#[async_trait]
pub trait ProtocolHook: Send + Sync {
    async fn after_locked_lookup(&self, seat_no: &SeatNo, found: Option<&Seat>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    BookExisting,
    FindOrCreate,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::BookExisting => "book_existing",
            Protocol::FindOrCreate => "find_or_create",
        }
    }
}

#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn SeatStore>,
    max_create_retries: u32,
    hook: Option<Arc<dyn ProtocolHook>>,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn SeatStore>, config: &ReservationConfig) -> Self {
        Self {
            store,
            max_create_retries: config.max_create_retries,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ProtocolHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Протокол A: место должно уже существовать.
    pub async fn book_existing_seat(&self, request: ReservationRequest) -> ReservationResult {
        let booking = validate(request)?;
        let result = self.run_book_existing(&booking).await;
        log_outcome(Protocol::BookExisting, &booking, 1, &result);
        result
    }

    /// Протокол B: отсутствующее место создаётся и сразу бронируется.
    pub async fn find_or_create_and_book(&self, request: ReservationRequest) -> ReservationResult {
        let booking = validate(request)?;
        let (result, attempts) = self.run_find_or_create(&booking).await;
        log_outcome(Protocol::FindOrCreate, &booking, attempts, &result);
        result
    }

    async fn run_book_existing(&self, booking: &ValidBooking) -> ReservationResult {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let result = self.book_existing_in(&mut *tx, booking).await;
        finish(tx, result).await
    }

    async fn run_find_or_create(&self, booking: &ValidBooking) -> (ReservationResult, u32) {
        let mut attempt: u32 = 1;
        loop {
            let mut tx = match self.store.begin(IsolationLevel::ReadCommitted).await {
                Ok(tx) => tx,
                Err(e) => return (Err(e.into()), attempt),
            };
            let result = self.find_or_create_in(&mut *tx, booking, attempt).await;

            match result {
                // место успели создать параллельно - начинаем заново
                Err(ReservationError::Conflict { .. }) if attempt <= self.max_create_retries => {
                    if let Err(e) = tx.abort().await {
                        warn!(seat_no = %booking.seat_no, error = %e, "Abort after creation race failed");
                    }
                    info!(seat_no = %booking.seat_no, attempt, "Seat was created concurrently, retrying");
                    attempt += 1;
                }
                result => return (finish(tx, result).await, attempt),
            }
        }
    }

    async fn book_existing_in(
        &self,
        tx: &mut dyn SeatTransaction,
        booking: &ValidBooking,
    ) -> ReservationResult {
        let found = tx.locked_find_by_seat_no(&booking.seat_no).await?;
        self.run_hook(&booking.seat_no, found.as_ref()).await;

        match found {
            None => Err(ReservationError::NotFound(booking.seat_no.clone())),
            Some(seat) if seat.is_booked => Err(ReservationError::AlreadyBooked(seat.seat_no)),
            Some(seat) => Ok(tx.update(&seat, true, Some(&booking.booker)).await?),
        }
    }

    async fn find_or_create_in(
        &self,
        tx: &mut dyn SeatTransaction,
        booking: &ValidBooking,
        attempt: u32,
    ) -> ReservationResult {
        let found = tx.locked_find_by_seat_no(&booking.seat_no).await?;
        self.run_hook(&booking.seat_no, found.as_ref()).await;

        let seat = match found {
            Some(seat) if seat.is_booked => {
                return Err(ReservationError::AlreadyBooked(seat.seat_no));
            }
            Some(seat) => seat,
            None => {
                debug!(seat_no = %booking.seat_no, "Seat not found, creating");
                tx.insert(&booking.seat_no).await.map_err(|e| match e {
                    StoreError::DuplicateKey(_) => ReservationError::Conflict {
                        seat_no: booking.seat_no.clone(),
                        attempts: attempt,
                    },
                    other => other.into(),
                })?
            }
        };

        Ok(tx.update(&seat, true, Some(&booking.booker)).await?)
    }

    async fn run_hook(&self, seat_no: &SeatNo, found: Option<&Seat>) {
        if let Some(hook) = &self.hook {
            hook.after_locked_lookup(seat_no, found).await;
        }
    }
}

fn validate(request: ReservationRequest) -> Result<ValidBooking, ReservationError> {
    request
        .into_valid()
        .inspect_err(|e| debug!(error = %e, "Rejected invalid reservation request"))
}

/// Завершает транзакцию: commit при успехе, abort при любом другом исходе.
async fn finish(tx: Box<dyn SeatTransaction>, result: ReservationResult) -> ReservationResult {
    match result {
        Ok(seat) => {
            tx.commit().await?;
            Ok(seat)
        }
        Err(e) => {
            if let Err(abort_err) = tx.abort().await {
                warn!(error = %abort_err, "Transaction abort failed");
            }
            Err(e)
        }
    }
}

fn log_outcome(protocol: Protocol, booking: &ValidBooking, attempts: u32, result: &ReservationResult) {
    let kind = OutcomeKind::classify(result);
    match result {
        Ok(seat) => info!(
            protocol = protocol.as_str(),
            seat_no = %seat.seat_no,
            booked_by = %booking.booker,
            attempts,
            "Seat booked"
        ),
        Err(ReservationError::StoreUnavailable(e)) => error!(
            protocol = protocol.as_str(),
            seat_no = %booking.seat_no,
            attempts,
            error = %e,
            "Reservation failed: store unavailable"
        ),
        Err(_) => info!(
            protocol = protocol.as_str(),
            seat_no = %booking.seat_no,
            attempts,
            outcome = %kind,
            "Reservation rejected"
        ),
    }
}
