//! Read model builders.
//!
//! Projections consume envelopes off the bus and keep query-optimized
//! views. All of them are idempotent (safe under at-least-once delivery),
//! tenant-isolated and rebuildable from the event stream.

pub mod cursor_store;
mod gate;

pub mod cash_sessions;
pub mod catalog;
pub mod companies;
pub mod customers;
pub mod expenses;
pub mod invoices;
pub mod loans;
pub mod sales;
pub mod service_catalog;
pub mod stock;
pub mod users;

pub use cursor_store::{PostgresCursorStore, ProjectionCursorStore};
pub use gate::ProjectionError;

pub use cash_sessions::{CashSessionReadModel, CashSessionsProjection};
pub use catalog::{ProductCatalogProjection, ProductReadModel};
pub use companies::{CompanyDirectoryProjection, CompanyReadModel};
pub use customers::{CustomerDirectoryProjection, CustomerReadModel};
pub use expenses::{ExpenseReadModel, ExpenseReportProjection};
pub use invoices::{OpenInvoicesProjection, InvoiceReadModel};
pub use loans::{LoanBookProjection, LoanReadModel};
pub use sales::{SaleReadModel, SalesProjection};
pub use service_catalog::{ServiceCatalogProjection, ServiceReadModel};
pub use stock::{StockLevel, StockLevelsProjection, StockMovementRecord, StoreStockReadModel};
pub use users::{UserReadModel, UsersProjection};
