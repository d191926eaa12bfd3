//! `ventora-events` — event/message mechanics shared by all domains.
//!
//! No business rules live here: only the contracts for events, envelopes,
//! buses, commands and sagas.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod saga;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{CommandHandler, execute};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use saga::{Saga, SagaAction};
pub use tenant::TenantScoped;
