//! Product aggregate (catalog entries).
//!
//! Prices are in XAF (no minor units). Stock quantities live in the
//! inventory read models; the product only carries the reorder threshold
//! (`min_stock_level`) those models compare against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ventora_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ventora_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: Option<TenantId>,
    pub sku: String,
    pub name: String,
    pub category: String,
    /// Sale unit ("piece", "kg", "carton", ...).
    pub unit: String,
    pub purchase_price: u64,
    pub selling_price: u64,
    pub min_stock_level: i64,
    pub active: bool,
    pub version: u64,
    pub created: bool,
}

impl Product {
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            category: String::new(),
            unit: String::new(),
            purchase_price: 0,
            selling_price: 0,
            min_stock_level: 0,
            active: false,
            version: 0,
            created: false,
        }
    }

    /// Gross margin per unit, if the product sells above cost.
    pub fn unit_margin(&self) -> Option<u64> {
        self.selling_price.checked_sub(self.purchase_price)
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

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub purchase_price: u64,
    pub selling_price: u64,
    pub min_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub min_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePrices {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub purchase_price: u64,
    pub selling_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Register(RegisterProduct),
    UpdateDetails(UpdateDetails),
    UpdatePrices(UpdatePrices),
    Deactivate(DeactivateProduct),
    Reactivate(ReactivateProduct),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub purchase_price: u64,
    pub selling_price: u64,
    pub min_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub min_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricesUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub purchase_price: u64,
    pub selling_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReactivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Registered(ProductRegistered),
    DetailsUpdated(DetailsUpdated),
    PricesUpdated(PricesUpdated),
    Deactivated(ProductDeactivated),
    Reactivated(ProductReactivated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Registered(_) => "products.product.registered",
            ProductEvent::DetailsUpdated(_) => "products.product.details_updated",
            ProductEvent::PricesUpdated(_) => "products.product.prices_updated",
            ProductEvent::Deactivated(_) => "products.product.deactivated",
            ProductEvent::Reactivated(_) => "products.product.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Registered(e) => e.occurred_at,
            ProductEvent::DetailsUpdated(e) => e.occurred_at,
            ProductEvent::PricesUpdated(e) => e.occurred_at,
            ProductEvent::Deactivated(e) => e.occurred_at,
            ProductEvent::Reactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Registered(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit = e.unit.clone();
                self.purchase_price = e.purchase_price;
                self.selling_price = e.selling_price;
                self.min_stock_level = e.min_stock_level;
                self.active = true;
                self.created = true;
            }
            ProductEvent::DetailsUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.unit = e.unit.clone();
                self.min_stock_level = e.min_stock_level;
            }
            ProductEvent::PricesUpdated(e) => {
                self.purchase_price = e.purchase_price;
                self.selling_price = e.selling_price;
            }
            ProductEvent::Deactivated(_) => {
                self.active = false;
            }
            ProductEvent::Reactivated(_) => {
                self.active = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Register(cmd) => self.handle_register(cmd),
            ProductCommand::UpdateDetails(cmd) => self.handle_update_details(cmd),
            ProductCommand::UpdatePrices(cmd) => self.handle_update_prices(cmd),
            ProductCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
            ProductCommand::Reactivate(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Product {
    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already registered"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if cmd.selling_price == 0 {
            return Err(DomainError::validation("selling price must be positive"));
        }
        if cmd.min_stock_level < 0 {
            return Err(DomainError::validation("min stock level cannot be negative"));
        }

        Ok(vec![ProductEvent::Registered(ProductRegistered {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_uppercase(),
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            unit: cmd.unit.trim().to_string(),
            purchase_price: cmd.purchase_price,
            selling_price: cmd.selling_price,
            min_stock_level: cmd.min_stock_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateDetails) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if cmd.min_stock_level < 0 {
            return Err(DomainError::validation("min stock level cannot be negative"));
        }

        Ok(vec![ProductEvent::DetailsUpdated(DetailsUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            unit: cmd.unit.trim().to_string(),
            min_stock_level: cmd.min_stock_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_prices(&self, cmd: &UpdatePrices) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if cmd.selling_price == 0 {
            return Err(DomainError::validation("selling price must be positive"));
        }

        Ok(vec![ProductEvent::PricesUpdated(PricesUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            purchase_price: cmd.purchase_price,
            selling_price: cmd.selling_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.active {
            return Err(DomainError::invariant("product already inactive"));
        }

        Ok(vec![ProductEvent::Deactivated(ProductDeactivated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.active {
            return Err(DomainError::invariant("product already active"));
        }

        Ok(vec![ProductEvent::Reactivated(ProductReactivated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ventora_events::execute;

    fn register_cmd(tenant: TenantId, id: ProductId) -> RegisterProduct {
        RegisterProduct {
            tenant_id: tenant,
            product_id: id,
            sku: "sav-250".into(),
            name: "Savon 250g".into(),
            category: "Hygiène".into(),
            unit: "piece".into(),
            purchase_price: 350,
            selling_price: 500,
            min_stock_level: 20,
            occurred_at: Utc::now(),
        }
    }

    fn registered() -> (Product, TenantId) {
        let tenant = TenantId::new();
        let id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(id);
        execute(&mut product, &ProductCommand::Register(register_cmd(tenant, id))).unwrap();
        (product, tenant)
    }

    #[test]
    fn register_uppercases_sku() {
        let (product, _) = registered();
        assert_eq!(product.sku, "SAV-250");
        assert_eq!(product.unit_margin(), Some(150));
        assert!(product.active);
    }

    #[test]
    fn register_rejects_zero_selling_price() {
        let id = ProductId::new(AggregateId::new());
        let product = Product::empty(id);
        let mut cmd = register_cmd(TenantId::new(), id);
        cmd.selling_price = 0;
        let err = product.handle(&ProductCommand::Register(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn price_update_changes_margin() {
        let (mut product, tenant) = registered();
        let id = product.id;
        execute(
            &mut product,
            &ProductCommand::UpdatePrices(UpdatePrices {
                tenant_id: tenant,
                product_id: id,
                purchase_price: 600,
                selling_price: 550,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        // Selling below cost: no margin.
        assert_eq!(product.unit_margin(), None);
    }

    #[test]
    fn commands_against_missing_product_return_not_found() {
        let id = ProductId::new(AggregateId::new());
        let product = Product::empty(id);
        let err = product
            .handle(&ProductCommand::Deactivate(DeactivateProduct {
                tenant_id: TenantId::new(),
                product_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(1000))]

            #[test]
            fn handle_is_deterministic(purchase in 0u64..1_000_000, selling in 1u64..1_000_000) {
                let tenant = TenantId::new();
                let id = ProductId::new(AggregateId::new());
                let product = Product::empty(id);
                let mut cmd = register_cmd(tenant, id);
                cmd.purchase_price = purchase;
                cmd.selling_price = selling;

                let a = product.handle(&ProductCommand::Register(cmd.clone())).unwrap();
                let b = product.handle(&ProductCommand::Register(cmd)).unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn apply_is_deterministic(selling in 1u64..1_000_000) {
                let tenant = TenantId::new();
                let id = ProductId::new(AggregateId::new());
                let mut cmd = register_cmd(tenant, id);
                cmd.selling_price = selling;

                let product = Product::empty(id);
                let events = product.handle(&ProductCommand::Register(cmd)).unwrap();

                let mut p1 = Product::empty(id);
                let mut p2 = Product::empty(id);
                for e in &events {
                    p1.apply(e);
                    p2.apply(e);
                }
                prop_assert_eq!(p1, p2);
            }

            #[test]
            fn version_increments_monotonically(n in 1usize..20) {
                let tenant = TenantId::new();
                let id = ProductId::new(AggregateId::new());
                let mut product = Product::empty(id);
                execute(&mut product, &ProductCommand::Register(register_cmd(tenant, id))).unwrap();

                for i in 0..n {
                    let before = product.version();
                    execute(
                        &mut product,
                        &ProductCommand::UpdatePrices(UpdatePrices {
                            tenant_id: tenant,
                            product_id: id,
                            purchase_price: i as u64,
                            selling_price: (i as u64) + 1,
                            occurred_at: Utc::now(),
                        }),
                    )
                    .unwrap();
                    prop_assert_eq!(product.version(), before + 1);
                }
            }
        }
    }
}
