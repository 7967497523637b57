//! Durable event store.
//!
//! Events wait here, serialized, until a send is acknowledged. The store
//! is SQLite behind a single executor thread:
//!
//! - [`EventStore`]: insert, bounded batch query, delete-through-id,
//!   retention sweep, full clear, legacy migration
//! - [`queries`]: the SQL, as free functions over a `Connection`
//! - [`legacy`]: the deprecated `growing3.db` format
//! - [`EventDatabaseLoader`] / [`DatabaseModule`]: registry wiring for the
//!   `(EventDatabase, EventDbResult)` stage

mod error;
mod formatter;
pub mod legacy;
mod loader;
pub mod migrations;
pub mod queries;
mod store;

#[cfg(test)]
mod tests;

pub use error::{DatabaseError, DatabaseResult};
pub use formatter::{PayloadFormatter, RegistryFormatter};
pub use legacy::LegacyEventStore;
pub use loader::{DatabaseFetcher, DatabaseModule, EventDatabaseLoader};
pub use queries::{PendingCount, EVENT_DATA_MAX_SIZE};
pub use store::{
    overdue_cutoff, EventStore, DEFAULT_VALIDITY_PERIOD_DAYS, LEGACY_MIGRATION_BUDGET,
};
