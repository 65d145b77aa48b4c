pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, FixtureError, JsonDocuments, SeedResult};
pub use repositories::RepositoryError;
pub use store::RecordStore;
