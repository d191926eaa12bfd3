//! Billing plans, quotas and feature gates.

use serde::{Deserialize, Serialize};

/// Subscription plan tiers.
///
/// Prices are monthly, in XAF (no minor units). `Custom` plans are negotiated
/// and carry no fixed price here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Starter,
    Business,
    Enterprise,
    Custom,
}

/// Hard limits per plan. A limit of `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanQuotas {
    pub max_users: Option<u32>,
    pub max_stores: Option<u32>,
    pub max_products: Option<u32>,
    pub max_storage_mb: Option<u32>,
}

/// Feature gates per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub services: bool,
    pub multi_store: bool,
    pub loans: bool,
    pub advanced_analytics: bool,
    pub api_access: bool,
}

impl Plan {
    /// Monthly price in XAF. Custom plans are priced out of band.
    pub fn monthly_price_xaf(&self) -> Option<u64> {
        match self {
            Plan::Starter => Some(15_000),
            Plan::Business => Some(40_000),
            Plan::Enterprise => Some(60_000),
            Plan::Custom => None,
        }
    }

    pub fn quotas(&self) -> PlanQuotas {
        match self {
            Plan::Starter => PlanQuotas {
                max_users: Some(3),
                max_stores: Some(1),
                max_products: Some(500),
                max_storage_mb: Some(512),
            },
            Plan::Business => PlanQuotas {
                max_users: Some(10),
                max_stores: Some(3),
                max_products: Some(5_000),
                max_storage_mb: Some(2_048),
            },
            Plan::Enterprise => PlanQuotas {
                max_users: Some(50),
                max_stores: Some(10),
                max_products: Some(50_000),
                max_storage_mb: Some(10_240),
            },
            Plan::Custom => PlanQuotas {
                max_users: None,
                max_stores: None,
                max_products: None,
                max_storage_mb: None,
            },
        }
    }

    pub fn features(&self) -> PlanFeatures {
        match self {
            Plan::Starter => PlanFeatures {
                services: false,
                multi_store: false,
                loans: false,
                advanced_analytics: false,
                api_access: false,
            },
            Plan::Business => PlanFeatures {
                services: true,
                multi_store: true,
                loans: false,
                advanced_analytics: false,
                api_access: true,
            },
            Plan::Enterprise | Plan::Custom => PlanFeatures {
                services: true,
                multi_store: true,
                loans: true,
                advanced_analytics: true,
                api_access: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_is_single_store_without_services() {
        let f = Plan::Starter.features();
        assert!(!f.multi_store);
        assert!(!f.services);
        assert_eq!(Plan::Starter.quotas().max_stores, Some(1));
        assert_eq!(Plan::Starter.monthly_price_xaf(), Some(15_000));
    }

    #[test]
    fn loans_require_enterprise_or_custom() {
        assert!(!Plan::Starter.features().loans);
        assert!(!Plan::Business.features().loans);
        assert!(Plan::Enterprise.features().loans);
        assert!(Plan::Custom.features().loans);
    }

    #[test]
    fn custom_plans_are_unlimited_and_unpriced() {
        let q = Plan::Custom.quotas();
        assert_eq!(q.max_users, None);
        assert_eq!(q.max_products, None);
        assert_eq!(Plan::Custom.monthly_price_xaf(), None);
    }
}
