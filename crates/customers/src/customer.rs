//! Customer aggregate.
//!
//! A credit limit of zero means unlimited credit; `has_credit_for` is the
//! single place that rule lives. Outstanding balances come from the invoice
//! read models, so the check takes the current outstanding as input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ventora_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: Option<TenantId>,
    pub code: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    /// Credit ceiling in XAF. Zero means unlimited.
    pub credit_limit: u64,
    pub active: bool,
    pub version: u64,
    pub created: bool,
}

impl Customer {
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            address: String::new(),
            credit_limit: 0,
            active: false,
            version: 0,
            created: false,
        }
    }

    /// Can this customer take on `amount` more credit given what they already
    /// owe?
    pub fn has_credit_for(&self, outstanding: u64, amount: u64) -> bool {
        if self.credit_limit == 0 {
            return true;
        }
        outstanding.saturating_add(amount) <= self.credit_limit
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

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub code: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub credit_limit: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateContact {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCreditLimit {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub credit_limit: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactivateCustomer {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustomerCommand {
    Register(RegisterCustomer),
    UpdateContact(UpdateContact),
    SetCreditLimit(SetCreditLimit),
    Deactivate(DeactivateCustomer),
    Reactivate(ReactivateCustomer),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub code: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub credit_limit: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactUpdated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLimitSet {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub previous: u64,
    pub credit_limit: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDeactivated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerReactivated {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustomerEvent {
    Registered(CustomerRegistered),
    ContactUpdated(ContactUpdated),
    CreditLimitSet(CreditLimitSet),
    Deactivated(CustomerDeactivated),
    Reactivated(CustomerReactivated),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::Registered(_) => "customers.customer.registered",
            CustomerEvent::ContactUpdated(_) => "customers.customer.contact_updated",
            CustomerEvent::CreditLimitSet(_) => "customers.customer.credit_limit_set",
            CustomerEvent::Deactivated(_) => "customers.customer.deactivated",
            CustomerEvent::Reactivated(_) => "customers.customer.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::Registered(e) => e.occurred_at,
            CustomerEvent::ContactUpdated(e) => e.occurred_at,
            CustomerEvent::CreditLimitSet(e) => e.occurred_at,
            CustomerEvent::Deactivated(e) => e.occurred_at,
            CustomerEvent::Reactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::Registered(e) => {
                self.id = e.customer_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.email = e.email.clone();
                self.address = e.address.clone();
                self.credit_limit = e.credit_limit;
                self.active = true;
                self.created = true;
            }
            CustomerEvent::ContactUpdated(e) => {
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.email = e.email.clone();
                self.address = e.address.clone();
            }
            CustomerEvent::CreditLimitSet(e) => {
                self.credit_limit = e.credit_limit;
            }
            CustomerEvent::Deactivated(_) => {
                self.active = false;
            }
            CustomerEvent::Reactivated(_) => {
                self.active = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::Register(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateContact(cmd) => self.handle_update_contact(cmd),
            CustomerCommand::SetCreditLimit(cmd) => self.handle_set_credit_limit(cmd),
            CustomerCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            CustomerCommand::Reactivate(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Customer {
    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already registered"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("customer code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        if !cmd.email.is_empty() && !cmd.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }

        Ok(vec![CustomerEvent::Registered(CustomerRegistered {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            code: cmd.code.trim().to_uppercase(),
            name: cmd.name.trim().to_string(),
            phone: cmd.phone.trim().to_string(),
            email: cmd.email.trim().to_lowercase(),
            address: cmd.address.clone(),
            credit_limit: cmd.credit_limit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_contact(&self, cmd: &UpdateContact) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("customer name cannot be empty"));
        }
        if !cmd.email.is_empty() && !cmd.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }

        Ok(vec![CustomerEvent::ContactUpdated(ContactUpdated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            name: cmd.name.trim().to_string(),
            phone: cmd.phone.trim().to_string(),
            email: cmd.email.trim().to_lowercase(),
            address: cmd.address.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_credit_limit(
        &self,
        cmd: &SetCreditLimit,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.credit_limit == self.credit_limit {
            return Err(DomainError::invariant("credit limit unchanged"));
        }

        Ok(vec![CustomerEvent::CreditLimitSet(CreditLimitSet {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            previous: self.credit_limit,
            credit_limit: cmd.credit_limit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateCustomer,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.active {
            return Err(DomainError::invariant("customer already inactive"));
        }

        Ok(vec![CustomerEvent::Deactivated(CustomerDeactivated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(
        &self,
        cmd: &ReactivateCustomer,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.active {
            return Err(DomainError::invariant("customer already active"));
        }

        Ok(vec![CustomerEvent::Reactivated(CustomerReactivated {
            tenant_id: cmd.tenant_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_events::execute;

    fn registered(credit_limit: u64) -> (Customer, TenantId) {
        let tenant = TenantId::new();
        let id = CustomerId::new(AggregateId::new());
        let mut customer = Customer::empty(id);
        execute(
            &mut customer,
            &CustomerCommand::Register(RegisterCustomer {
                tenant_id: tenant,
                customer_id: id,
                code: "cli-001".into(),
                name: "Marie Ngo".into(),
                phone: "+237 699 00 00 00".into(),
                email: "Marie@Example.com".into(),
                address: "Douala".into(),
                credit_limit,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (customer, tenant)
    }

    #[test]
    fn register_normalizes_code_and_email() {
        let (customer, _) = registered(50_000);
        assert_eq!(customer.code, "CLI-001");
        assert_eq!(customer.email, "marie@example.com");
        assert!(customer.active);
    }

    #[test]
    fn zero_credit_limit_means_unlimited() {
        let (customer, _) = registered(0);
        assert!(customer.has_credit_for(u64::MAX - 1, 1));
    }

    #[test]
    fn credit_check_includes_outstanding_balance() {
        let (customer, _) = registered(100_000);
        assert!(customer.has_credit_for(60_000, 40_000));
        assert!(!customer.has_credit_for(60_000, 40_001));
        // Saturating add cannot wrap past the limit.
        assert!(!customer.has_credit_for(u64::MAX, 1));
    }

    #[test]
    fn credit_limit_change_records_previous_value() {
        let (mut customer, tenant) = registered(100_000);
        let id = customer.id;
        let events = execute(
            &mut customer,
            &CustomerCommand::SetCreditLimit(SetCreditLimit {
                tenant_id: tenant,
                customer_id: id,
                credit_limit: 250_000,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        match &events[0] {
            CustomerEvent::CreditLimitSet(e) => {
                assert_eq!(e.previous, 100_000);
                assert_eq!(e.credit_limit, 250_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(customer.credit_limit, 250_000);
    }

    #[test]
    fn deactivate_twice_is_rejected() {
        let (mut customer, tenant) = registered(0);
        let id = customer.id;
        execute(
            &mut customer,
            &CustomerCommand::Deactivate(DeactivateCustomer {
                tenant_id: tenant,
                customer_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let err = customer
            .handle(&CustomerCommand::Deactivate(DeactivateCustomer {
                tenant_id: tenant,
                customer_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
