//! `ventora-inventory` — stores, stock movements, transfers and counts.
//!
//! Stock is event-sourced: every movement (receipt, issue, adjustment,
//! return) is an event on the store's stream. Per-store stock levels and the
//! movement ledger are read models built from those events.

pub mod count;
pub mod store;
pub mod transfer;

pub use count::{CountId, CountStatus, InventoryCount, InventoryCountCommand, InventoryCountEvent};
pub use store::{Store, StoreCommand, StoreEvent, StoreId, StoreKind};
pub use transfer::{
    StockTransfer, StockTransferCommand, StockTransferEvent, TransferId, TransferStatus,
};
