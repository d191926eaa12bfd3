//! Append-only, tenant-scoped event persistence.
//!
//! Each aggregate instance owns a stream keyed by `(tenant_id, aggregate_id)`
//! with 1-based, gapless sequence numbers. The in-memory store backs tests
//! and development; the Postgres store is the production backend and keeps
//! every tenant's events inside the tenant's own schema.

mod in_memory;
mod postgres;
mod store;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
