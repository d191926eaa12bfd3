//! `ventora-invoicing` — customer invoices and payments.

pub mod invoice;

pub use invoice::{Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, PaymentStatus};
