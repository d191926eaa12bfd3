//! `ventora-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod document;
pub mod entity;
pub mod error;
pub mod id;
pub mod payment;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use document::{DocumentKind, DocumentNumber};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use payment::PaymentMethod;
pub use value_object::ValueObject;
