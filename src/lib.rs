pub mod config;
pub mod database;
pub mod models;
pub mod outcome;
pub mod store;
pub mod services;
pub mod controllers;
pub mod simulator;

use std::sync::Arc;
use tracing::{info, warn};

use config::{Config, StoreBackend};
use services::{ReservationCoordinator, SeedingService};
use store::{MemorySeatStore, PgSeatStore, SeatStore, StoreError};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SeatStore>,
    pub coordinator: ReservationCoordinator,
    pub seeding: SeedingService,
}

impl AppState {
    /// Открывает хранилище, выбранное в конфигурации.
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let lock_timeout = config.reservation.lock_timeout();
        let store: Arc<dyn SeatStore> = match config.store.backend {
            StoreBackend::Postgres => {
                let store = PgSeatStore::connect(&config.database, lock_timeout).await?;
                info!("Database connected");
                Arc::new(store)
            }
            StoreBackend::Memory => {
                warn!("Using in-memory seat store, seats are lost on restart");
                Arc::new(MemorySeatStore::new(lock_timeout))
            }
        };
        Ok(Self::with_store(&config, store))
    }

    pub fn with_store(config: &Config, store: Arc<dyn SeatStore>) -> Arc<Self> {
        let coordinator = ReservationCoordinator::new(store.clone(), &config.reservation);
        let seeding = SeedingService::new(store.clone(), config.seeding.batch_size);
        Arc::new(Self {
            store,
            coordinator,
            seeding,
        })
    }

    /// Закрывает хранилище; после этого состояние больше не используется.
    pub async fn shutdown(&self) {
        self.store.close().await;
    }
}
