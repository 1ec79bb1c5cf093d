// Service exports
pub mod memory;
pub mod postgres;

pub use memory::InMemoryGeoIndex;
pub use postgres::{PostgresClient, PostgresError, StoredRole};
