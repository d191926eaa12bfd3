//! `ventora-tenants` — tenant (company) lifecycle and billing plans.
//!
//! Each company is one tenant of the platform, isolated in its own database
//! schema. This crate owns registration, provisioning state, plan changes
//! and suspension; the actual schema creation is an infrastructure job.

pub mod company;
pub mod plan;

pub use company::{
    Company, CompanyCommand, CompanyEvent, CompanyId, CompanyStatus, ProvisioningStatus,
};
pub use plan::{Plan, PlanFeatures, PlanQuotas};

/// Schema name for a tenant, shared by provisioning and the event store.
pub fn schema_name_for(tenant_id: ventora_core::TenantId) -> String {
    company::Company::schema_name_for(tenant_id)
}
