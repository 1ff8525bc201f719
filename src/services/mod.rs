pub mod reservation;
pub mod seeding;

pub use reservation::{ProtocolHook, ReservationCoordinator};
pub use seeding::{InventoryStatus, PopulateReport, SeedingError, SeedingService};
