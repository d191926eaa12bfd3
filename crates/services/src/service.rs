//! Service aggregate.
//!
//! Rates are expressed in basis points to keep arithmetic integral. The
//! default VAT rate is 19.25% (1925 bps).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ventora_events::Event;

/// 19.25% VAT, in basis points.
pub const DEFAULT_TAX_RATE_BPS: u32 = 1_925;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub AggregateId);

impl ServiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub tenant_id: Option<TenantId>,
    pub reference: String,
    pub name: String,
    pub category: String,
    pub unit_price: u64,
    pub tax_rate_bps: u32,
    pub estimated_duration_minutes: Option<u32>,
    pub active: bool,
    pub version: u64,
    pub created: bool,
}

impl Service {
    pub fn empty(id: ServiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            reference: String::new(),
            name: String::new(),
            category: String::new(),
            unit_price: 0,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            estimated_duration_minutes: None,
            active: false,
            version: 0,
            created: false,
        }
    }

    /// Price including tax, rounded down to whole XAF.
    pub fn price_with_tax(&self) -> u64 {
        let tax = (self.unit_price as u128 * self.tax_rate_bps as u128) / 10_000;
        self.unit_price + tax as u64
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

impl AggregateRoot for Service {
    type Id = ServiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterService {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub reference: String,
    pub name: String,
    pub category: String,
    pub unit_price: u64,
    pub tax_rate_bps: u32,
    pub estimated_duration_minutes: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateService {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub name: String,
    pub category: String,
    pub estimated_duration_minutes: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetServicePricing {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub unit_price: u64,
    pub tax_rate_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateService {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactivateService {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceCommand {
    Register(RegisterService),
    Update(UpdateService),
    SetPricing(SetServicePricing),
    Deactivate(DeactivateService),
    Reactivate(ReactivateService),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistered {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub reference: String,
    pub name: String,
    pub category: String,
    pub unit_price: u64,
    pub tax_rate_bps: u32,
    pub estimated_duration_minutes: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUpdated {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub name: String,
    pub category: String,
    pub estimated_duration_minutes: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePricingSet {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub unit_price: u64,
    pub tax_rate_bps: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDeactivated {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReactivated {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceEvent {
    Registered(ServiceRegistered),
    Updated(ServiceUpdated),
    PricingSet(ServicePricingSet),
    Deactivated(ServiceDeactivated),
    Reactivated(ServiceReactivated),
}

impl Event for ServiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ServiceEvent::Registered(_) => "services.service.registered",
            ServiceEvent::Updated(_) => "services.service.updated",
            ServiceEvent::PricingSet(_) => "services.service.pricing_set",
            ServiceEvent::Deactivated(_) => "services.service.deactivated",
            ServiceEvent::Reactivated(_) => "services.service.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ServiceEvent::Registered(e) => e.occurred_at,
            ServiceEvent::Updated(e) => e.occurred_at,
            ServiceEvent::PricingSet(e) => e.occurred_at,
            ServiceEvent::Deactivated(e) => e.occurred_at,
            ServiceEvent::Reactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Service {
    type Command = ServiceCommand;
    type Event = ServiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ServiceEvent::Registered(e) => {
                self.id = e.service_id;
                self.tenant_id = Some(e.tenant_id);
                self.reference = e.reference.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit_price = e.unit_price;
                self.tax_rate_bps = e.tax_rate_bps;
                self.estimated_duration_minutes = e.estimated_duration_minutes;
                self.active = true;
                self.created = true;
            }
            ServiceEvent::Updated(e) => {
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.estimated_duration_minutes = e.estimated_duration_minutes;
            }
            ServiceEvent::PricingSet(e) => {
                self.unit_price = e.unit_price;
                self.tax_rate_bps = e.tax_rate_bps;
            }
            ServiceEvent::Deactivated(_) => {
                self.active = false;
            }
            ServiceEvent::Reactivated(_) => {
                self.active = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ServiceCommand::Register(cmd) => self.handle_register(cmd),
            ServiceCommand::Update(cmd) => self.handle_update(cmd),
            ServiceCommand::SetPricing(cmd) => self.handle_set_pricing(cmd),
            ServiceCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            ServiceCommand::Reactivate(cmd) => self.handle_reactivate(cmd),
        }
    }
}

fn validate_tax_rate(bps: u32) -> Result<(), DomainError> {
    // Sanity ceiling: 100%.
    if bps > 10_000 {
        return Err(DomainError::validation("tax rate cannot exceed 100%"));
    }
    Ok(())
}

impl Service {
    fn handle_register(&self, cmd: &RegisterService) -> Result<Vec<ServiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("service already registered"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("service reference cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("service name cannot be empty"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit price must be positive"));
        }
        validate_tax_rate(cmd.tax_rate_bps)?;

        Ok(vec![ServiceEvent::Registered(ServiceRegistered {
            tenant_id: cmd.tenant_id,
            service_id: cmd.service_id,
            reference: cmd.reference.trim().to_uppercase(),
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            unit_price: cmd.unit_price,
            tax_rate_bps: cmd.tax_rate_bps,
            estimated_duration_minutes: cmd.estimated_duration_minutes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateService) -> Result<Vec<ServiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("service name cannot be empty"));
        }

        Ok(vec![ServiceEvent::Updated(ServiceUpdated {
            tenant_id: cmd.tenant_id,
            service_id: cmd.service_id,
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            estimated_duration_minutes: cmd.estimated_duration_minutes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_pricing(&self, cmd: &SetServicePricing) -> Result<Vec<ServiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit price must be positive"));
        }
        validate_tax_rate(cmd.tax_rate_bps)?;

        Ok(vec![ServiceEvent::PricingSet(ServicePricingSet {
            tenant_id: cmd.tenant_id,
            service_id: cmd.service_id,
            unit_price: cmd.unit_price,
            tax_rate_bps: cmd.tax_rate_bps,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateService) -> Result<Vec<ServiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.active {
            return Err(DomainError::invariant("service already inactive"));
        }

        Ok(vec![ServiceEvent::Deactivated(ServiceDeactivated {
            tenant_id: cmd.tenant_id,
            service_id: cmd.service_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateService) -> Result<Vec<ServiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.active {
            return Err(DomainError::invariant("service already active"));
        }

        Ok(vec![ServiceEvent::Reactivated(ServiceReactivated {
            tenant_id: cmd.tenant_id,
            service_id: cmd.service_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_events::execute;

    fn registered(unit_price: u64, tax_rate_bps: u32) -> (Service, TenantId) {
        let tenant = TenantId::new();
        let id = ServiceId::new(AggregateId::new());
        let mut service = Service::empty(id);
        execute(
            &mut service,
            &ServiceCommand::Register(RegisterService {
                tenant_id: tenant,
                service_id: id,
                reference: "srv-rep".into(),
                name: "Réparation téléphone".into(),
                category: "Atelier".into(),
                unit_price,
                tax_rate_bps,
                estimated_duration_minutes: Some(45),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (service, tenant)
    }

    #[test]
    fn price_with_tax_uses_default_vat() {
        let (service, _) = registered(10_000, DEFAULT_TAX_RATE_BPS);
        // 10000 + 19.25% = 11925
        assert_eq!(service.price_with_tax(), 11_925);
    }

    #[test]
    fn price_with_tax_rounds_down() {
        let (service, _) = registered(999, DEFAULT_TAX_RATE_BPS);
        // 999 * 0.1925 = 192.3075, truncated to 192.
        assert_eq!(service.price_with_tax(), 999 + 192);
    }

    #[test]
    fn tax_rate_above_100_percent_is_rejected() {
        let id = ServiceId::new(AggregateId::new());
        let service = Service::empty(id);
        let err = service
            .handle(&ServiceCommand::Register(RegisterService {
                tenant_id: TenantId::new(),
                service_id: id,
                reference: "X".into(),
                name: "X".into(),
                category: String::new(),
                unit_price: 100,
                tax_rate_bps: 10_001,
                estimated_duration_minutes: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn pricing_can_be_revised() {
        let (mut service, tenant) = registered(10_000, DEFAULT_TAX_RATE_BPS);
        let id = service.id;
        execute(
            &mut service,
            &ServiceCommand::SetPricing(SetServicePricing {
                tenant_id: tenant,
                service_id: id,
                unit_price: 12_000,
                tax_rate_bps: 0,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(service.price_with_tax(), 12_000);
        assert_eq!(service.version, 2);
    }
}
