//! Company aggregate (one company = one tenant).
//!
//! Registration reserves the tenant and derives its schema name; an
//! infrastructure job then provisions the schema and reports back via
//! `StartProvisioning` / `CompleteProvisioning` / `FailProvisioning`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ventora_events::Event;

use crate::plan::Plan;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub AggregateId);

impl CompanyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    #[default]
    Trial,
    Active,
    Suspended,
}

/// Schema provisioning lifecycle, driven by the background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct Company {
    pub id: CompanyId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub slug: String,
    pub schema_name: String,
    pub plan: Option<Plan>,
    pub currency: String,
    pub status: CompanyStatus,
    pub provisioning: ProvisioningStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub paid_until: Option<DateTime<Utc>>,
    pub version: u64,
    pub created: bool,
}

impl Default for CompanyId {
    fn default() -> Self {
        Self(AggregateId::new())
    }
}

impl Company {
    pub fn empty(id: CompanyId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Derive the tenant's schema name from its id.
    ///
    /// Must stay stable forever: the schema is created under this name.
    pub fn schema_name_for(tenant_id: TenantId) -> String {
        format!("tenant_{}", tenant_id.as_uuid().simple())
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioning == ProvisioningStatus::Completed
    }

    /// Whether the tenant can transact right now.
    pub fn is_operational(&self, now: DateTime<Utc>) -> bool {
        if !self.created || !self.is_provisioned() || self.status == CompanyStatus::Suspended {
            return false;
        }
        match self.status {
            CompanyStatus::Trial => self.trial_ends_at.is_none_or(|t| now < t),
            CompanyStatus::Active => self.paid_until.is_none_or(|t| now < t),
            CompanyStatus::Suspended => false,
        }
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

impl AggregateRoot for Company {
    type Id = CompanyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub name: String,
    pub slug: String,
    pub plan: Plan,
    pub currency: String,
    /// Trial window granted at signup, if any.
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartProvisioning {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteProvisioning {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailProvisioning {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePlan {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub plan: Plan,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendSubscription {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub paid_until: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinstateCompany {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompanyCommand {
    Register(RegisterCompany),
    StartProvisioning(StartProvisioning),
    CompleteProvisioning(CompleteProvisioning),
    FailProvisioning(FailProvisioning),
    ChangePlan(ChangePlan),
    ExtendSubscription(ExtendSubscription),
    Suspend(SuspendCompany),
    Reinstate(ReinstateCompany),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRegistered {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub name: String,
    pub slug: String,
    pub schema_name: String,
    pub plan: Plan,
    pub currency: String,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningStarted {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProvisioned {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub schema_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningFailed {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanChanged {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub previous: Plan,
    pub plan: Plan,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionExtended {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub paid_until: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySuspended {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyReinstated {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompanyEvent {
    Registered(CompanyRegistered),
    ProvisioningStarted(ProvisioningStarted),
    Provisioned(CompanyProvisioned),
    ProvisioningFailed(ProvisioningFailed),
    PlanChanged(PlanChanged),
    SubscriptionExtended(SubscriptionExtended),
    Suspended(CompanySuspended),
    Reinstated(CompanyReinstated),
}

impl Event for CompanyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::Registered(_) => "tenants.company.registered",
            CompanyEvent::ProvisioningStarted(_) => "tenants.company.provisioning_started",
            CompanyEvent::Provisioned(_) => "tenants.company.provisioned",
            CompanyEvent::ProvisioningFailed(_) => "tenants.company.provisioning_failed",
            CompanyEvent::PlanChanged(_) => "tenants.company.plan_changed",
            CompanyEvent::SubscriptionExtended(_) => "tenants.company.subscription_extended",
            CompanyEvent::Suspended(_) => "tenants.company.suspended",
            CompanyEvent::Reinstated(_) => "tenants.company.reinstated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CompanyEvent::Registered(e) => e.occurred_at,
            CompanyEvent::ProvisioningStarted(e) => e.occurred_at,
            CompanyEvent::Provisioned(e) => e.occurred_at,
            CompanyEvent::ProvisioningFailed(e) => e.occurred_at,
            CompanyEvent::PlanChanged(e) => e.occurred_at,
            CompanyEvent::SubscriptionExtended(e) => e.occurred_at,
            CompanyEvent::Suspended(e) => e.occurred_at,
            CompanyEvent::Reinstated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Company {
    type Command = CompanyCommand;
    type Event = CompanyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CompanyEvent::Registered(e) => {
                self.id = e.company_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.slug = e.slug.clone();
                self.schema_name = e.schema_name.clone();
                self.plan = Some(e.plan);
                self.currency = e.currency.clone();
                self.status = CompanyStatus::Trial;
                self.provisioning = ProvisioningStatus::Pending;
                self.trial_ends_at = e.trial_ends_at;
                self.created = true;
            }
            CompanyEvent::ProvisioningStarted(_) => {
                self.provisioning = ProvisioningStatus::InProgress;
            }
            CompanyEvent::Provisioned(_) => {
                self.provisioning = ProvisioningStatus::Completed;
            }
            CompanyEvent::ProvisioningFailed(_) => {
                self.provisioning = ProvisioningStatus::Failed;
            }
            CompanyEvent::PlanChanged(e) => {
                self.plan = Some(e.plan);
            }
            CompanyEvent::SubscriptionExtended(e) => {
                self.paid_until = Some(e.paid_until);
                self.status = CompanyStatus::Active;
            }
            CompanyEvent::Suspended(_) => {
                self.status = CompanyStatus::Suspended;
            }
            CompanyEvent::Reinstated(_) => {
                // Back to active if they ever paid, otherwise back on trial.
                self.status = if self.paid_until.is_some() {
                    CompanyStatus::Active
                } else {
                    CompanyStatus::Trial
                };
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CompanyCommand::Register(cmd) => self.handle_register(cmd),
            CompanyCommand::StartProvisioning(cmd) => self.handle_start_provisioning(cmd),
            CompanyCommand::CompleteProvisioning(cmd) => self.handle_complete_provisioning(cmd),
            CompanyCommand::FailProvisioning(cmd) => self.handle_fail_provisioning(cmd),
            CompanyCommand::ChangePlan(cmd) => self.handle_change_plan(cmd),
            CompanyCommand::ExtendSubscription(cmd) => self.handle_extend_subscription(cmd),
            CompanyCommand::Suspend(cmd) => self.handle_suspend(cmd),
            CompanyCommand::Reinstate(cmd) => self.handle_reinstate(cmd),
        }
    }
}

fn validate_slug(slug: &str) -> Result<(), DomainError> {
    if slug.is_empty() || slug.len() > 63 {
        return Err(DomainError::validation("slug must be 1-63 characters"));
    }
    let ok = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !ok || slug.starts_with('-') || slug.ends_with('-') {
        return Err(DomainError::validation(
            "slug must be lowercase alphanumeric with inner hyphens",
        ));
    }
    Ok(())
}

impl Company {
    fn handle_register(&self, cmd: &RegisterCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("company already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("company name cannot be empty"));
        }
        validate_slug(&cmd.slug)?;
        if cmd.currency.len() != 3 || !cmd.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(
                "currency must be a 3-letter ISO code",
            ));
        }

        Ok(vec![CompanyEvent::Registered(CompanyRegistered {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            name: cmd.name.trim().to_string(),
            slug: cmd.slug.clone(),
            schema_name: Self::schema_name_for(cmd.tenant_id),
            plan: cmd.plan,
            currency: cmd.currency.clone(),
            trial_ends_at: cmd.trial_ends_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start_provisioning(
        &self,
        cmd: &StartProvisioning,
    ) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        // Retrying a failed run is allowed.
        match self.provisioning {
            ProvisioningStatus::Pending | ProvisioningStatus::Failed => {}
            ProvisioningStatus::InProgress => {
                return Err(DomainError::invariant("provisioning already in progress"));
            }
            ProvisioningStatus::Completed => {
                return Err(DomainError::invariant("tenant is already provisioned"));
            }
        }

        Ok(vec![CompanyEvent::ProvisioningStarted(ProvisioningStarted {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete_provisioning(
        &self,
        cmd: &CompleteProvisioning,
    ) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.provisioning != ProvisioningStatus::InProgress {
            return Err(DomainError::invariant(
                "provisioning must be in progress to complete",
            ));
        }

        Ok(vec![CompanyEvent::Provisioned(CompanyProvisioned {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            schema_name: self.schema_name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail_provisioning(
        &self,
        cmd: &FailProvisioning,
    ) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.provisioning != ProvisioningStatus::InProgress {
            return Err(DomainError::invariant(
                "provisioning must be in progress to fail",
            ));
        }

        Ok(vec![CompanyEvent::ProvisioningFailed(ProvisioningFailed {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            error: cmd.error.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_plan(&self, cmd: &ChangePlan) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == CompanyStatus::Suspended {
            return Err(DomainError::invariant("company is suspended"));
        }
        let previous = self
            .plan
            .ok_or_else(|| DomainError::invariant("company has no plan"))?;
        if previous == cmd.plan {
            return Err(DomainError::invariant("company is already on this plan"));
        }

        Ok(vec![CompanyEvent::PlanChanged(PlanChanged {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            previous,
            plan: cmd.plan,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_extend_subscription(
        &self,
        cmd: &ExtendSubscription,
    ) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if let Some(current) = self.paid_until {
            if cmd.paid_until <= current {
                return Err(DomainError::validation(
                    "paid_until must extend the current subscription",
                ));
            }
        }

        Ok(vec![CompanyEvent::SubscriptionExtended(
            SubscriptionExtended {
                tenant_id: cmd.tenant_id,
                company_id: cmd.company_id,
                paid_until: cmd.paid_until,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_suspend(&self, cmd: &SuspendCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == CompanyStatus::Suspended {
            return Err(DomainError::invariant("company already suspended"));
        }

        Ok(vec![CompanyEvent::Suspended(CompanySuspended {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reinstate(&self, cmd: &ReinstateCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != CompanyStatus::Suspended {
            return Err(DomainError::invariant("company is not suspended"));
        }

        Ok(vec![CompanyEvent::Reinstated(CompanyReinstated {
            tenant_id: cmd.tenant_id,
            company_id: cmd.company_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_events::execute;

    fn registered_company() -> (Company, TenantId) {
        let tenant = TenantId::new();
        let id = CompanyId::new(AggregateId::new());
        let mut company = Company::empty(id);
        execute(
            &mut company,
            &CompanyCommand::Register(RegisterCompany {
                tenant_id: tenant,
                company_id: id,
                name: "Boutique Centrale".into(),
                slug: "boutique-centrale".into(),
                plan: Plan::Business,
                currency: "XAF".into(),
                trial_ends_at: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (company, tenant)
    }

    fn provisioned_company() -> (Company, TenantId) {
        let (mut company, tenant) = registered_company();
        let id = company.id;
        execute(
            &mut company,
            &CompanyCommand::StartProvisioning(StartProvisioning {
                tenant_id: tenant,
                company_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut company,
            &CompanyCommand::CompleteProvisioning(CompleteProvisioning {
                tenant_id: tenant,
                company_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (company, tenant)
    }

    #[test]
    fn register_derives_the_schema_name() {
        let (company, tenant) = registered_company();
        assert_eq!(
            company.schema_name,
            format!("tenant_{}", tenant.as_uuid().simple())
        );
        assert_eq!(company.provisioning, ProvisioningStatus::Pending);
        assert_eq!(company.status, CompanyStatus::Trial);
    }

    #[test]
    fn bad_slugs_are_rejected() {
        let id = CompanyId::new(AggregateId::new());
        let company = Company::empty(id);
        for slug in ["", "Has-Upper", "spaced out", "-leading", "trailing-"] {
            let err = company
                .handle(&CompanyCommand::Register(RegisterCompany {
                    tenant_id: TenantId::new(),
                    company_id: id,
                    name: "X".into(),
                    slug: slug.into(),
                    plan: Plan::Starter,
                    currency: "XAF".into(),
                    trial_ends_at: None,
                    occurred_at: Utc::now(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "slug: {slug:?}");
        }
    }

    #[test]
    fn provisioning_must_be_started_before_completion() {
        let (company, tenant) = registered_company();
        let err = company
            .handle(&CompanyCommand::CompleteProvisioning(CompleteProvisioning {
                tenant_id: tenant,
                company_id: company.id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn failed_provisioning_can_be_retried() {
        let (mut company, tenant) = registered_company();
        let id = company.id;
        execute(
            &mut company,
            &CompanyCommand::StartProvisioning(StartProvisioning {
                tenant_id: tenant,
                company_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut company,
            &CompanyCommand::FailProvisioning(FailProvisioning {
                tenant_id: tenant,
                company_id: id,
                error: "schema creation timed out".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(company.provisioning, ProvisioningStatus::Failed);

        execute(
            &mut company,
            &CompanyCommand::StartProvisioning(StartProvisioning {
                tenant_id: tenant,
                company_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(company.provisioning, ProvisioningStatus::InProgress);
    }

    #[test]
    fn plan_change_records_the_previous_plan() {
        let (mut company, tenant) = provisioned_company();
        let id = company.id;
        let events = execute(
            &mut company,
            &CompanyCommand::ChangePlan(ChangePlan {
                tenant_id: tenant,
                company_id: id,
                plan: Plan::Enterprise,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        match &events[0] {
            CompanyEvent::PlanChanged(e) => {
                assert_eq!(e.previous, Plan::Business);
                assert_eq!(e.plan, Plan::Enterprise);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn suspended_company_is_not_operational() {
        let (mut company, tenant) = provisioned_company();
        let id = company.id;
        assert!(company.is_operational(Utc::now()));

        execute(
            &mut company,
            &CompanyCommand::Suspend(SuspendCompany {
                tenant_id: tenant,
                company_id: id,
                reason: "unpaid invoice".into(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!company.is_operational(Utc::now()));

        execute(
            &mut company,
            &CompanyCommand::Reinstate(ReinstateCompany {
                tenant_id: tenant,
                company_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(company.is_operational(Utc::now()));
        // Never paid, so reinstatement puts them back on trial.
        assert_eq!(company.status, CompanyStatus::Trial);
    }

    #[test]
    fn expired_trial_is_not_operational() {
        let tenant = TenantId::new();
        let id = CompanyId::new(AggregateId::new());
        let mut company = Company::empty(id);
        let now = Utc::now();
        execute(
            &mut company,
            &CompanyCommand::Register(RegisterCompany {
                tenant_id: tenant,
                company_id: id,
                name: "X".into(),
                slug: "x".into(),
                plan: Plan::Starter,
                currency: "XAF".into(),
                trial_ends_at: Some(now - chrono::Duration::days(1)),
                occurred_at: now,
            }),
        )
        .unwrap();
        execute(
            &mut company,
            &CompanyCommand::StartProvisioning(StartProvisioning {
                tenant_id: tenant,
                company_id: id,
                occurred_at: now,
            }),
        )
        .unwrap();
        execute(
            &mut company,
            &CompanyCommand::CompleteProvisioning(CompleteProvisioning {
                tenant_id: tenant,
                company_id: id,
                occurred_at: now,
            }),
        )
        .unwrap();
        assert!(!company.is_operational(now));

        // Paying reactivates.
        execute(
            &mut company,
            &CompanyCommand::ExtendSubscription(ExtendSubscription {
                tenant_id: tenant,
                company_id: id,
                paid_until: now + chrono::Duration::days(30),
                occurred_at: now,
            }),
        )
        .unwrap();
        assert_eq!(company.status, CompanyStatus::Active);
        assert!(company.is_operational(now));
    }
}
