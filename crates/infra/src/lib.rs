//! Infrastructure layer: event persistence, dispatch, projections, sagas,
//! background jobs.
//!
//! Nothing in here makes business decisions. Domain crates stay pure; this
//! crate wires them to storage, the event bus and the workers that keep read
//! models and long-running processes up to date.

pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod numbering;
pub mod projections;
pub mod read_model;
pub mod runtime;
pub mod saga;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use numbering::{InMemoryNumberAllocator, NumberAllocator, NumberAllocatorError};
pub use read_model::{InMemoryTenantStore, TenantStore};
