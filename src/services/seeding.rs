use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::store::{SeatStore, StoreError};

/// Верхняя граница одного засева.
pub const MAX_BATCH_SIZE: u32 = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum SeedingError {
    #[error("batch size must be between 1 and {MAX_BATCH_SIZE}, got {0}")]
    InvalidBatch(u32),
    #[error("cannot add {requested} seats after seat {last}: seat numbers exhausted")]
    NumbersExhausted { last: i64, requested: i64 },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SeedingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeatNumbersExhausted { last, requested } => {
                SeedingError::NumbersExhausted { last, requested }
            }
            other => SeedingError::Store(other),
        }
    }
}

impl SeedingError {
    /// Ошибка в запросе клиента, а не в хранилище.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SeedingError::InvalidBatch(_) | SeedingError::NumbersExhausted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulateReport {
    pub seats_created: i64,
    pub start_seat_no: i64,
    pub end_seat_no: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStatus {
    pub total_seats: i64,
    pub last_seat_no: Option<i64>,
}

/// Засев свободных мест с последовательными номерами и отчёт о наполнении зала.
#[derive(Clone)]
pub struct SeedingService {
    store: Arc<dyn SeatStore>,
    default_batch: u32,
}

impl SeedingService {
    pub fn new(store: Arc<dyn SeatStore>, default_batch: u32) -> Self {
        Self { store, default_batch }
    }

    pub async fn populate(&self, batch: Option<u32>) -> Result<PopulateReport, SeedingError> {
        let batch = batch.unwrap_or(self.default_batch);
        if batch == 0 || batch > MAX_BATCH_SIZE {
            return Err(SeedingError::InvalidBatch(batch));
        }

        let range = self.store.append_seats(i64::from(batch)).await?;
        info!(seats = range.len(), start = range.start, end = range.end, "Sample seats populated");

        Ok(PopulateReport {
            seats_created: range.len(),
            start_seat_no: range.start,
            end_seat_no: range.end,
        })
    }

    pub async fn status(&self) -> Result<InventoryStatus, StoreError> {
        Ok(InventoryStatus {
            total_seats: self.store.count().await?,
            last_seat_no: self.store.last_numeric_seat_no().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeatNo;
    use crate::store::MemorySeatStore;
    use std::time::Duration;

    fn service(default_batch: u32) -> SeedingService {
        SeedingService::new(Arc::new(MemorySeatStore::new(Duration::from_millis(100))), default_batch)
    }

    #[tokio::test]
    async fn first_populate_starts_at_one() {
        let seeding = service(5);
        let report = seeding.populate(None).await.unwrap();
        assert_eq!(
            report,
            PopulateReport { seats_created: 5, start_seat_no: 1, end_seat_no: 5 }
        );

        let report = seeding.populate(Some(3)).await.unwrap();
        assert_eq!(report.start_seat_no, 6);
        assert_eq!(report.end_seat_no, 8);

        let status = seeding.status().await.unwrap();
        assert_eq!(status, InventoryStatus { total_seats: 8, last_seat_no: Some(8) });
    }

    #[tokio::test]
    async fn empty_store_reports_no_last_seat() {
        let status = service(5).status().await.unwrap();
        assert_eq!(status, InventoryStatus { total_seats: 0, last_seat_no: None });
    }

    #[tokio::test]
    async fn populate_after_largest_seat_number_is_rejected() {
        let store = MemorySeatStore::new(Duration::from_millis(100));
        let seeding = SeedingService::new(Arc::new(store.clone()), 5);
        store.preload(SeatNo::from_number(i64::MAX).unwrap(), Some("Jane Smith")).await.unwrap();

        let err = seeding.populate(Some(3)).await.unwrap_err();
        assert!(matches!(
            err,
            SeedingError::NumbersExhausted { last: i64::MAX, requested: 3 }
        ));
        assert!(err.is_client_error());
        assert_eq!(seeding.status().await.unwrap().total_seats, 1);
    }

    #[tokio::test]
    async fn populate_may_fill_up_to_the_largest_seat_number() {
        let store = MemorySeatStore::new(Duration::from_millis(100));
        let seeding = SeedingService::new(Arc::new(store.clone()), 5);
        store.preload(SeatNo::from_number(i64::MAX - 2).unwrap(), None).await.unwrap();

        assert!(matches!(
            seeding.populate(Some(3)).await,
            Err(SeedingError::NumbersExhausted { .. })
        ));
        assert_eq!(seeding.status().await.unwrap().total_seats, 1);

        let report = seeding.populate(Some(2)).await.unwrap();
        assert_eq!(report.end_seat_no, i64::MAX);
        assert_eq!(seeding.status().await.unwrap().total_seats, 3);
    }

    #[tokio::test]
    async fn batch_size_is_bounded() {
        let seeding = service(5);
        assert!(matches!(seeding.populate(Some(0)).await, Err(SeedingError::InvalidBatch(0))));
        assert!(matches!(
            seeding.populate(Some(MAX_BATCH_SIZE + 1)).await,
            Err(SeedingError::InvalidBatch(_))
        ));
    }
}
