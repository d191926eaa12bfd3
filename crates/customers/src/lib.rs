//! `ventora-customers` — customer records and credit limits.

pub mod customer;

pub use customer::{Customer, CustomerCommand, CustomerEvent, CustomerId};
