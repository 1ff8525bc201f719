//! Хранилище мест поверх PostgreSQL.
//!
//! В Postgres нет gap-блокировок, поэтому отсутствующую строку блокируем
//! транзакционным advisory lock по хешу номера места, а существующую
//! дополнительно через `SELECT ... FOR UPDATE`. Ожидание любых блокировок
//! ограничено `lock_timeout`.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{IsolationLevel, SeatStore, SeatTransaction, SeededRange, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::database::Database;
use crate::models::{Seat, SeatNo};

/// Класс advisory-блокировки засева (двухключевая форма, не пересекается
/// с одноключевыми блокировками мест).
const SEEDING_LOCK_CLASS: i32 = 0x5345_4544;

const UNIQUE_VIOLATION: &str = "23505";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Clone)]
pub struct PgSeatStore {
    db: Database,
    lock_timeout: Duration,
}

impl PgSeatStore {
    pub fn new(db: Database, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Подключается к базе и прогоняет миграции.
    pub async fn connect(config: &DatabaseConfig, lock_timeout: Duration) -> StoreResult<Self> {
        let db = Database::new(config).await?;
        db.run_migrations().await?;
        Ok(Self::new(db, lock_timeout))
    }
}

/// Переводит ошибки Postgres в термины хранилища.
fn classify(err: sqlx::Error, lock_timeout: Duration) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::DuplicateKey(db_err.message().to_string()),
            Some(LOCK_NOT_AVAILABLE) | Some(DEADLOCK_DETECTED) => {
                return StoreError::LockTimeout(lock_timeout)
            }
            _ => {}
        }
    }
    StoreError::Unavailable(err)
}

#[async_trait]
impl SeatStore for PgSeatStore {
    async fn begin(&self, isolation: IsolationLevel) -> StoreResult<Box<dyn SeatTransaction>> {
        let mut tx = self.db.pool.begin().await?;

        // SET TRANSACTION должен идти первым оператором транзакции
        sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql()))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgSeatTransaction {
            tx,
            lock_timeout: self.lock_timeout,
        }))
    }

    async fn count(&self) -> StoreResult<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seats")
            .fetch_one(&self.db.pool)
            .await?;
        Ok(total)
    }

    async fn last_numeric_seat_no(&self) -> StoreResult<Option<i64>> {
        let last = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(seat_no::bigint) FROM seats WHERE seat_no ~ '^[0-9]+$'"
        )
        .fetch_one(&self.db.pool)
        .await?;
        Ok(last)
    }

    async fn append_seats(&self, count: i64) -> StoreResult<SeededRange> {
        let lock_timeout = self.lock_timeout;
        let mut tx = self.db.pool.begin().await?;

        // засевы выполняются строго по одному
        sqlx::query("SELECT pg_advisory_xact_lock($1, 0)")
            .bind(SEEDING_LOCK_CLASS)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, lock_timeout))?;

        let last = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(seat_no::bigint) FROM seats WHERE seat_no ~ '^[0-9]+$'"
        )
        .fetch_one(&mut *tx)
        .await?;

        // переполнение i64 проверяется до вставки, иначе generate_series уйдёт в минус
        let SeededRange { start, end } = SeededRange::after(last, count)?;

        sqlx::query(
            r#"
            INSERT INTO seats (seat_no, is_booked, booked_by)
            SELECT g::text, FALSE, NULL
            FROM generate_series($1::bigint, $2::bigint) AS g
            "#
        )
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, lock_timeout))?;

        tx.commit().await?;
        info!(start, end, "Seeded seats");
        Ok(SeededRange { start, end })
    }

    async fn close(&self) {
        self.db.close().await;
    }
}

pub struct PgSeatTransaction {
    tx: Transaction<'static, Postgres>,
    lock_timeout: Duration,
}

#[async_trait]
impl SeatTransaction for PgSeatTransaction {
    async fn locked_find_by_seat_no(&mut self, seat_no: &SeatNo) -> StoreResult<Option<Seat>> {
        let lock_timeout = self.lock_timeout;

        // "gap lock": блокирует и ещё не созданное место
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(seat_no)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify(e, lock_timeout))?;

        let seat = sqlx::query_as::<_, Seat>(
            r#"
            SELECT id, seat_no, is_booked, booked_by, created_at, updated_at
            FROM seats
            WHERE seat_no = $1
            FOR UPDATE
            "#
        )
        .bind(seat_no)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify(e, lock_timeout))?;

        debug!(%seat_no, found = seat.is_some(), "Locked seat lookup");
        Ok(seat)
    }

    async fn insert(&mut self, seat_no: &SeatNo) -> StoreResult<Seat> {
        let lock_timeout = self.lock_timeout;
        sqlx::query_as::<_, Seat>(
            r#"
            INSERT INTO seats (seat_no, is_booked, booked_by)
            VALUES ($1, FALSE, NULL)
            RETURNING id, seat_no, is_booked, booked_by, created_at, updated_at
            "#
        )
        .bind(seat_no)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| classify(e, lock_timeout))
    }

    async fn update(&mut self, seat: &Seat, is_booked: bool, booked_by: Option<&str>) -> StoreResult<Seat> {
        let lock_timeout = self.lock_timeout;
        let updated = sqlx::query_as::<_, Seat>(
            r#"
            UPDATE seats
            SET is_booked = $2, booked_by = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, seat_no, is_booked, booked_by, created_at, updated_at
            "#
        )
        .bind(seat.id)
        .bind(is_booked)
        .bind(booked_by)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| classify(e, lock_timeout))?;

        updated.ok_or_else(|| StoreError::NotLocked(seat.seat_no.clone()))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let lock_timeout = this.lock_timeout;
        this.tx.commit().await.map_err(|e| classify(e, lock_timeout))
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_reported_as_unavailable() {
        let err = classify(sqlx::Error::PoolTimedOut, Duration::from_millis(10));
        assert!(matches!(err, StoreError::Unavailable(sqlx::Error::PoolTimedOut)));
    }
}
