//! Хранилище мест.
//!
//! Все чтения и записи, участвующие в бронировании, идут через
//! [`SeatTransaction`]: поиск с блокировкой, вставка и обновление.
//! Блокировка, взятая `locked_find_by_seat_no`, держится до `commit`/`abort`,
//! а незавершённая транзакция при `Drop` откатывается.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{Seat, SeatNo, SeatNoError};

pub mod memory;
pub mod postgres;

pub use memory::MemorySeatStore;
pub use postgres::PgSeatStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("lock wait exceeded {0:?}")]
    LockTimeout(Duration),

    #[error("seat {0} is not locked by this transaction")]
    NotLocked(SeatNo),

    #[error("cannot add {requested} seats after seat {last}: seat numbers exhausted")]
    SeatNumbersExhausted { last: i64, requested: i64 },

    #[error("invalid seat number: {0}")]
    InvalidSeatNo(#[from] SeatNoError),

    #[error("database error: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read committed + явные блокировки строк: этого достаточно для протоколов.
    #[default]
    ReadCommitted,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
        }
    }
}

/// Диапазон мест, созданных одним вызовом засева.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededRange {
    pub start: i64,
    pub end: i64,
}

impl SeededRange {
    /// Следующие `count` номеров после `last` (или начиная с 1).
    /// Номера не должны выйти за `i64::MAX`: проверяется до любой вставки.
    pub fn after(last: Option<i64>, count: i64) -> StoreResult<Self> {
        let last = last.unwrap_or(0);
        let exhausted = || StoreError::SeatNumbersExhausted { last, requested: count };
        let start = last.checked_add(1).ok_or_else(exhausted)?;
        let end = start.checked_add(count - 1).ok_or_else(exhausted)?;
        Ok(Self { start, end })
    }

    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn begin(&self, isolation: IsolationLevel) -> StoreResult<Box<dyn SeatTransaction>>;

    async fn count(&self) -> StoreResult<i64>;

    /// Наибольший числовой номер места.
    async fn last_numeric_seat_no(&self) -> StoreResult<Option<i64>>;

    /// Атомарно создаёт `count` свободных мест с номерами после текущего максимума
    /// (или начиная с 1). Конкурентные вызовы сериализуются.
    async fn append_seats(&self, count: i64) -> StoreResult<SeededRange>;

    async fn close(&self);
}

#[async_trait]
pub trait SeatTransaction: Send {
    /// Ищет место и берёт эксклюзивную блокировку ключа, даже если места ещё нет.
    /// Ждёт, пока блокировку держит другая транзакция, но не дольше lock timeout.
    async fn locked_find_by_seat_no(&mut self, seat_no: &SeatNo) -> StoreResult<Option<Seat>>;

    /// Создаёт свободное место. `DuplicateKey`, если номер уже занят.
    async fn insert(&mut self, seat_no: &SeatNo) -> StoreResult<Seat>;

    /// Обновляет место, заблокированное в этой же транзакции.
    async fn update(&mut self, seat: &Seat, is_booked: bool, booked_by: Option<&str>) -> StoreResult<Seat>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn abort(self: Box<Self>) -> StoreResult<()>;
}
