//! Хранилище мест в памяти.
//!
//! Повторяет семантику Postgres-хранилища: на каждый номер места заведён
//! свой асинхронный мьютекс (он же "строчная" и "gap" блокировка), записи
//! транзакции буферизуются и применяются только при `commit`. Используется
//! в тестах и для локального запуска без базы.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::{IsolationLevel, SeatStore, SeatTransaction, SeededRange, StoreError, StoreResult};
use crate::models::{Seat, SeatNo};

#[derive(Clone)]
pub struct MemorySeatStore {
    inner: Arc<Inner>,
}

struct Inner {
    /// Зафиксированные записи.
    seats: Mutex<BTreeMap<SeatNo, Seat>>,
    /// Таблица блокировок ключей. Запись живёт, пока ключ кто-то держит или ждёт.
    /// Синхронный мьютекс: его не держат через `.await`, и он нужен в `Drop`.
    key_locks: std::sync::Mutex<HashMap<SeatNo, Arc<Mutex<()>>>>,
    seeding: Mutex<()>,
    next_id: AtomicI64,
    lock_timeout: Duration,
    operations: AtomicU64,
}

impl Inner {
    fn count_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }
}

impl MemorySeatStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                seats: Mutex::new(BTreeMap::new()),
                key_locks: std::sync::Mutex::new(HashMap::new()),
                seeding: Mutex::new(()),
                next_id: AtomicI64::new(1),
                lock_timeout,
                operations: AtomicU64::new(0),
            }),
        }
    }

    /// Кладёт зафиксированную запись в обход протоколов (фикстуры, засев тестов).
    pub async fn preload(&self, seat_no: SeatNo, booked_by: Option<&str>) -> StoreResult<Seat> {
        let mut seats = self.inner.seats.lock().await;
        if seats.contains_key(&seat_no) {
            return Err(StoreError::DuplicateKey(format!("seat_no {seat_no} already exists")));
        }
        let now = Utc::now().naive_utc();
        let seat = Seat {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            seat_no: seat_no.clone(),
            is_booked: booked_by.is_some(),
            booked_by: booked_by.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        seats.insert(seat_no, seat.clone());
        Ok(seat)
    }

    /// Зафиксированное состояние места без блокировки.
    pub async fn get(&self, seat_no: &SeatNo) -> Option<Seat> {
        self.inner.seats.lock().await.get(seat_no).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Seat> {
        self.inner.seats.lock().await.values().cloned().collect()
    }

    /// Сколько операций хранилища было выполнено (begin, поиск, вставка, ...).
    pub fn operation_count(&self) -> u64 {
        self.inner.operations.load(Ordering::Relaxed)
    }

    fn transaction(&self) -> MemorySeatTransaction {
        MemorySeatTransaction {
            inner: self.inner.clone(),
            held: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn begin(&self, isolation: IsolationLevel) -> StoreResult<Box<dyn SeatTransaction>> {
        self.inner.count_operation();
        debug!(isolation = isolation.as_sql(), "Begin memory transaction");
        Ok(Box::new(self.transaction()))
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(self.inner.seats.lock().await.len() as i64)
    }

    async fn last_numeric_seat_no(&self) -> StoreResult<Option<i64>> {
        let seats = self.inner.seats.lock().await;
        Ok(seats.keys().filter_map(SeatNo::as_number).max())
    }

    async fn append_seats(&self, count: i64) -> StoreResult<SeededRange> {
        let _seeding = self.inner.seeding.lock().await;

        let range = SeededRange::after(self.last_numeric_seat_no().await?, count)?;

        // через обычную транзакцию: ключи блокируются так же, как в протоколах
        let mut tx = self.transaction();
        for n in range.start..=range.end {
            tx.insert(&SeatNo::from_number(n)?).await?;
        }
        Box::new(tx).commit().await?;

        info!(start = range.start, end = range.end, "Seeded seats");
        Ok(range)
    }

    async fn close(&self) {
        info!("Memory seat store closed");
    }
}

pub struct MemorySeatTransaction {
    inner: Arc<Inner>,
    /// Блокировки ключей, взятые этой транзакцией; отпускаются при Drop.
    held: HashMap<SeatNo, OwnedMutexGuard<()>>,
    writes: BTreeMap<SeatNo, Seat>,
}

impl MemorySeatTransaction {
    async fn lock_key(&mut self, seat_no: &SeatNo) -> StoreResult<()> {
        if self.held.contains_key(seat_no) {
            return Ok(());
        }

        let key_lock = {
            let mut locks = self.inner.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(seat_no.clone()).or_default().clone()
        };

        let timeout = self.inner.lock_timeout;
        let guard = tokio::time::timeout(timeout, key_lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(timeout))?;

        self.held.insert(seat_no.clone(), guard);
        Ok(())
    }

    /// Отпускает все ключи и вычищает из таблицы те, которые больше никто не ждёт.
    ///
    /// Счётчик ссылок проверяется под мьютексом таблицы: новый ожидающий
    /// клонирует `Arc` только под ним же, поэтому удалённый мьютекс никому
    /// не достанется.
    fn release_locks(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let mut locks = self.inner.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for (seat_no, guard) in self.held.drain() {
            drop(guard);
            if locks.get(&seat_no).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&seat_no);
            }
        }
    }

    // свои незафиксированные записи видны, чужие - нет
    async fn visible(&self, seat_no: &SeatNo) -> Option<Seat> {
        if let Some(seat) = self.writes.get(seat_no) {
            return Some(seat.clone());
        }
        self.inner.seats.lock().await.get(seat_no).cloned()
    }
}

#[async_trait]
impl SeatTransaction for MemorySeatTransaction {
    async fn locked_find_by_seat_no(&mut self, seat_no: &SeatNo) -> StoreResult<Option<Seat>> {
        self.inner.count_operation();
        self.lock_key(seat_no).await?;
        Ok(self.visible(seat_no).await)
    }

    async fn insert(&mut self, seat_no: &SeatNo) -> StoreResult<Seat> {
        self.inner.count_operation();
        // как уникальный индекс: ждём владельца ключа, потом проверяем дубликат
        self.lock_key(seat_no).await?;
        if self.visible(seat_no).await.is_some() {
            return Err(StoreError::DuplicateKey(format!("seat_no {seat_no} already exists")));
        }

        let now = Utc::now().naive_utc();
        let seat = Seat {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            seat_no: seat_no.clone(),
            is_booked: false,
            booked_by: None,
            created_at: now,
            updated_at: now,
        };
        self.writes.insert(seat_no.clone(), seat.clone());
        Ok(seat)
    }

    async fn update(&mut self, seat: &Seat, is_booked: bool, booked_by: Option<&str>) -> StoreResult<Seat> {
        self.inner.count_operation();
        if !self.held.contains_key(&seat.seat_no) {
            return Err(StoreError::NotLocked(seat.seat_no.clone()));
        }
        let Some(current) = self.visible(&seat.seat_no).await else {
            return Err(StoreError::NotLocked(seat.seat_no.clone()));
        };

        let updated = Seat {
            is_booked,
            booked_by: booked_by.map(str::to_string),
            updated_at: Utc::now().naive_utc(),
            ..current
        };
        self.writes.insert(updated.seat_no.clone(), updated.clone());
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.inner.count_operation();
        let writes = std::mem::take(&mut this.writes);
        {
            let mut seats = this.inner.seats.lock().await;
            seats.extend(writes);
        }
        // блокировки отпускаем только после применения записей
        this.release_locks();
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        this.inner.count_operation();
        this.writes.clear();
        this.release_locks();
        Ok(())
    }
}

// незавершённая транзакция = abort: буфер записей просто теряется
impl Drop for MemorySeatTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}
