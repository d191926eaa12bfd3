//! `ventora-services` — billable service catalog (repairs, deliveries, ...).

pub mod service;

pub use service::{Service, ServiceCommand, ServiceEvent, ServiceId, DEFAULT_TAX_RATE_BPS};
