pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod sequence;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DocumentSeedInfo, SeedDataset, SeedResult, VerificationResult};
pub use sequence::{InMemoryNumberAllocator, NumberAllocator, SqlNumberAllocator};
