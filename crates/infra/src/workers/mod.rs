//! Background job handlers and schema provisioning.

pub mod provisioning;

pub use provisioning::{
    NoopSchemaProvisioner, SchemaProvisioner, subscription_sweep_handler,
    tenant_provisioning_handler,
};
