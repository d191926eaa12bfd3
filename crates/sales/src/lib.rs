//! `ventora-sales` — point-of-sale tickets.

pub mod sale;

pub use sale::{Sale, SaleCommand, SaleEvent, SaleId, SaleItem, SaleLine, SaleStatus};
