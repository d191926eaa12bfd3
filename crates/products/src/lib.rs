//! `ventora-products` — product catalog.

pub mod product;

pub use product::{Product, ProductCommand, ProductEvent, ProductId};
