//! Request DTOs and JSON mapping helpers.
//!
//! Domain value enums (payment methods, plans, store kinds) derive serde
//! with snake_case naming, so request bodies use them directly.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use ventora_cashbox::{MovementCategory, MovementDirection};
use ventora_core::PaymentMethod;
use ventora_expenses::ExpenseCategory;
use ventora_infra::projections::{
    CashSessionReadModel, CompanyReadModel, CustomerReadModel, ExpenseReadModel, InvoiceReadModel,
    LoanReadModel, ProductReadModel, SaleReadModel, ServiceReadModel, StockLevel,
    StockMovementRecord, UserReadModel,
};
use ventora_inventory::StoreKind;
use ventora_loans::LoanSource;
use ventora_sales::SaleItem;
use ventora_tenants::Plan;

// Requests

#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub purchase_price: u64,
    pub selling_price: u64,
    #[serde(default)]
    pub min_stock_level: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductDetailsRequest {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub min_stock_level: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductPricesRequest {
    pub purchase_price: u64,
    pub selling_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub credit_limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerContactRequest {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct SetCreditLimitRequest {
    pub credit_limit: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterServiceRequest {
    pub reference: String,
    pub name: String,
    pub category: String,
    pub unit_price: u64,
    #[serde(default)]
    pub tax_rate_bps: u32,
    pub estimated_duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: String,
    pub category: String,
    pub estimated_duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SetServicePricingRequest {
    pub unit_price: u64,
    pub tax_rate_bps: u32,
}

#[derive(Debug, Deserialize)]
pub struct OpenStoreRequest {
    pub name: String,
    pub kind: StoreKind,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStoreRequest {
    pub name: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct StockMovementRequest {
    pub product_id: String,
    pub quantity: u64,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: String,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCountRequest {
    pub store_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordCountLineRequest {
    pub product_id: String,
    pub theoretical: i64,
    pub counted: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from_store: String,
    pub to_store: String,
}

#[derive(Debug, Deserialize)]
pub struct AddTransferLineRequest {
    pub product_id: String,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveTransferLineRequest {
    pub product_id: String,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveTransferRequest {
    pub received: Vec<ReceiveTransferLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub customer_id: Option<String>,
}

/// Exactly one of `product_id` / `service_id` names what the line sells.
#[derive(Debug, Deserialize)]
pub struct AddSaleLineRequest {
    pub product_id: Option<String>,
    pub service_id: Option<String>,
    pub quantity: u64,
    pub unit_price: u64,
    #[serde(default)]
    pub discount_bps: u32,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmSaleRequest {
    pub store_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub sale_id: Option<String>,
    pub customer_id: Option<String>,
    pub total: u64,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPaymentRequest {
    pub amount: u64,
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub store_id: String,
    pub opening_balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub direction: MovementDirection,
    pub category: MovementCategory,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloseSessionRequest {
    pub counted_balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub category: ExpenseCategory,
    pub amount: u64,
    pub description: String,
    pub supplier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayExpenseRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct GrantLoanRequest {
    pub lender: String,
    pub source: LoanSource,
    pub principal: u64,
    pub annual_rate_bps: u32,
    pub term_months: u32,
}

#[derive(Debug, Deserialize)]
pub struct RecordRepaymentRequest {
    pub amount: u64,
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub name: String,
    pub slug: String,
    pub plan: Plan,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Trial window in days, granted at signup.
    pub trial_days: Option<i64>,
}

fn default_currency() -> String {
    "XAF".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct ExtendSubscriptionRequest {
    pub paid_until: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub initial_roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

// Read model -> JSON

pub fn product_to_json(rm: ProductReadModel) -> JsonValue {
    json!({
        "id": rm.product_id.0.to_string(),
        "sku": rm.sku,
        "name": rm.name,
        "category": rm.category,
        "unit": rm.unit,
        "purchase_price": rm.purchase_price,
        "selling_price": rm.selling_price,
        "min_stock_level": rm.min_stock_level,
        "active": rm.active,
    })
}

pub fn customer_to_json(rm: CustomerReadModel) -> JsonValue {
    json!({
        "id": rm.customer_id.0.to_string(),
        "code": rm.code,
        "name": rm.name,
        "phone": rm.phone,
        "email": rm.email,
        "address": rm.address,
        "credit_limit": rm.credit_limit,
        "active": rm.active,
    })
}

pub fn service_to_json(rm: ServiceReadModel) -> JsonValue {
    json!({
        "id": rm.service_id.0.to_string(),
        "reference": rm.reference,
        "name": rm.name,
        "category": rm.category,
        "unit_price": rm.unit_price,
        "tax_rate_bps": rm.tax_rate_bps,
        "price_with_tax": rm.price_with_tax(),
        "estimated_duration_minutes": rm.estimated_duration_minutes,
        "active": rm.active,
    })
}

pub fn stock_level_to_json(level: StockLevel) -> JsonValue {
    json!({
        "store_id": level.store_id.0.to_string(),
        "product_id": level.product_id.0.to_string(),
        "on_hand": level.on_hand,
    })
}

pub fn stock_movement_to_json(m: StockMovementRecord) -> JsonValue {
    json!({
        "product_id": m.product_id.0.to_string(),
        "kind": m.kind,
        "delta": m.delta,
        "reference": m.reference,
        "occurred_at": m.occurred_at.to_rfc3339(),
    })
}

pub fn sale_to_json(rm: SaleReadModel) -> JsonValue {
    let lines: Vec<JsonValue> = rm
        .lines
        .iter()
        .map(|l| {
            let (kind, item_id) = match l.item {
                SaleItem::Product(id) => ("product", id.0.to_string()),
                SaleItem::Service(id) => ("service", id.0.to_string()),
            };
            json!({
                "line_no": l.line_no,
                "kind": kind,
                "item_id": item_id,
                "quantity": l.quantity,
                "unit_price": l.unit_price,
                "discount_bps": l.discount_bps,
                "total": l.total(),
            })
        })
        .collect();

    json!({
        "id": rm.sale_id.0.to_string(),
        "status": rm.status,
        "number": rm.number.as_ref().map(|n| n.as_str().to_string()),
        "store_id": rm.store_id.map(|s| s.0.to_string()),
        "customer_id": rm.customer_id.map(|c| c.0.to_string()),
        "lines": lines,
        "total": rm.total,
        "confirmed_at": rm.confirmed_at.map(|t| t.to_rfc3339()),
    })
}

pub fn invoice_to_json(rm: InvoiceReadModel) -> JsonValue {
    json!({
        "id": rm.invoice_id.0.to_string(),
        "number": rm.number.as_str(),
        "sale_id": rm.sale_id.map(|s| s.0.to_string()),
        "customer_id": rm.customer_id.map(|c| c.0.to_string()),
        "total": rm.total,
        "paid": rm.paid,
        "outstanding": rm.outstanding(),
        "status": rm.status,
        "due_date": rm.due_date.map(|t| t.to_rfc3339()),
        "issued_at": rm.issued_at.to_rfc3339(),
    })
}

pub fn cash_session_to_json(rm: CashSessionReadModel) -> JsonValue {
    json!({
        "id": rm.session_id.0.to_string(),
        "store_id": rm.store_id.0.to_string(),
        "cashier_id": rm.cashier_id.to_string(),
        "status": rm.status,
        "opening_balance": rm.opening_balance,
        "expected_balance": rm.expected_balance,
        "movement_count": rm.movement_count,
        "counted_balance": rm.counted_balance,
        "difference": rm.difference,
        "opened_at": rm.opened_at.to_rfc3339(),
        "closed_at": rm.closed_at.map(|t| t.to_rfc3339()),
    })
}

pub fn expense_to_json(rm: ExpenseReadModel) -> JsonValue {
    json!({
        "id": rm.expense_id.0.to_string(),
        "number": rm.number.as_str(),
        "category": rm.category,
        "amount": rm.amount,
        "description": rm.description,
        "supplier": rm.supplier,
        "status": rm.status,
        "approved_by": rm.approved_by.map(|u| u.to_string()),
    })
}

pub fn loan_to_json(rm: LoanReadModel) -> JsonValue {
    json!({
        "id": rm.loan_id.0.to_string(),
        "number": rm.number.as_str(),
        "lender": rm.lender,
        "source": rm.source,
        "principal": rm.principal,
        "total_due": rm.total_due,
        "repaid": rm.repaid,
        "balance": rm.balance(),
        "status": rm.status,
    })
}

pub fn company_to_json(rm: CompanyReadModel) -> JsonValue {
    json!({
        "id": rm.company_id.0.to_string(),
        "name": rm.name,
        "slug": rm.slug,
        "schema_name": rm.schema_name,
        "plan": rm.plan,
        "currency": rm.currency,
        "status": rm.status,
        "provisioning": rm.provisioning,
        "trial_ends_at": rm.trial_ends_at.map(|t| t.to_rfc3339()),
        "paid_until": rm.paid_until.map(|t| t.to_rfc3339()),
        "suspended_reason": rm.suspended_reason,
    })
}

pub fn user_to_json(rm: UserReadModel) -> JsonValue {
    json!({
        "id": rm.user_id.to_string(),
        "email": rm.email,
        "display_name": rm.display_name,
        "roles": rm.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "suspended": rm.suspended,
    })
}
