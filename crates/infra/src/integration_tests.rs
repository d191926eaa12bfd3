//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → EventBus → Projections / Saga → ReadModels,
//! all in memory. The bus subscription is drained synchronously, so the
//! tests are deterministic: every published envelope (including the ones
//! the saga produces while reacting) is processed before asserting.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;

    use ventora_core::{AggregateId, DocumentKind, TenantId};
    use ventora_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use ventora_inventory::store::{OpenStore, ReceiveStock};
    use ventora_inventory::{Store, StoreCommand, StoreId, StoreKind};
    use ventora_products::product::RegisterProduct;
    use ventora_products::{Product, ProductCommand, ProductId};
    use ventora_sales::sale::{AddSaleLine, CancelSale, ConfirmSale, CreateSale};
    use ventora_sales::{Sale, SaleCommand, SaleId, SaleItem, SaleStatus};
    use ventora_tenants::company::RegisterCompany;
    use ventora_tenants::{Company, CompanyCommand, CompanyId, Plan};

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::jobs::{InMemoryJobStore, Job, JobExecutor, JobKind, JobStatus, JobStore};
    use crate::numbering::{InMemoryNumberAllocator, allocate_number};
    use crate::projections::{
        InvoiceReadModel, OpenInvoicesProjection, SaleReadModel, SalesProjection,
        StockLevelsProjection, StoreStockReadModel,
    };
    use crate::read_model::InMemoryTenantStore;
    use crate::saga::{InvoicingSagaExecutor, SagaRunner, SaleInvoicingSaga};
    use crate::workers::{NoopSchemaProvisioner, tenant_provisioning_handler};

    use ventora_core::PaymentMethod;
    use ventora_invoicing::invoice::RegisterPayment;
    use ventora_invoicing::{Invoice, InvoiceCommand, InvoiceId};

    type Env = EventEnvelope<JsonValue>;
    type Dispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<Env>>>;

    struct Pipeline {
        store: Arc<InMemoryEventStore>,
        dispatcher: Arc<Dispatcher>,
        numbers: Arc<InMemoryNumberAllocator>,
        sub: Subscription<Env>,
        sales: SalesProjection<Arc<InMemoryTenantStore<SaleId, SaleReadModel>>>,
        invoices: OpenInvoicesProjection<Arc<InMemoryTenantStore<InvoiceId, InvoiceReadModel>>>,
        stock: StockLevelsProjection<Arc<InMemoryTenantStore<StoreId, StoreStockReadModel>>>,
        saga: SagaRunner<
            SaleInvoicingSaga,
            Arc<InMemoryEventStore>,
            InvoicingSagaExecutor<
                Arc<InMemoryEventStore>,
                Arc<InMemoryEventBus<Env>>,
                InMemoryNumberAllocator,
            >,
        >,
    }

    fn pipeline() -> Pipeline {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<Env>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));
        let numbers = Arc::new(InMemoryNumberAllocator::new());

        let executor = InvoicingSagaExecutor::new(dispatcher.clone(), numbers.clone());
        let saga = SagaRunner::new(store.clone(), executor);

        Pipeline {
            store,
            dispatcher,
            numbers,
            sub,
            sales: SalesProjection::new(Arc::new(InMemoryTenantStore::new())),
            invoices: OpenInvoicesProjection::new(Arc::new(InMemoryTenantStore::new())),
            stock: StockLevelsProjection::new(Arc::new(InMemoryTenantStore::new())),
            saga,
        }
    }

    impl Pipeline {
        /// Drain every pending envelope through projections and the saga.
        ///
        /// Saga reactions publish further envelopes onto the same bus, so
        /// the loop runs until the channel is empty.
        fn process(&self) {
            while let Ok(env) = self.sub.try_recv() {
                self.sales.apply_envelope(&env).unwrap();
                self.invoices.apply_envelope(&env).unwrap();
                self.stock.apply_envelope(&env).unwrap();
                self.saga.handle_envelope(&env).unwrap();
            }
        }
    }

    fn open_store(p: &Pipeline, tenant_id: TenantId) -> StoreId {
        let store_id = StoreId::new(AggregateId::new());
        p.dispatcher
            .dispatch::<Store>(
                tenant_id,
                store_id.0,
                "inventory.store",
                StoreCommand::Open(OpenStore {
                    tenant_id,
                    store_id,
                    name: "Marché Central".to_string(),
                    kind: StoreKind::Retail,
                    address: "Avenue Kennedy, Yaoundé".to_string(),
                    occurred_at: Utc::now(),
                }),
                |_, id| Store::empty(StoreId::new(id)),
            )
            .unwrap();
        store_id
    }

    fn register_product(p: &Pipeline, tenant_id: TenantId, sku: &str) -> ProductId {
        let product_id = ProductId::new(AggregateId::new());
        p.dispatcher
            .dispatch::<Product>(
                tenant_id,
                product_id.0,
                "products.product",
                ProductCommand::Register(RegisterProduct {
                    tenant_id,
                    product_id,
                    sku: sku.to_string(),
                    name: "Savon de Marseille 300g".to_string(),
                    category: "hygiene".to_string(),
                    unit: "piece".to_string(),
                    purchase_price: 350,
                    selling_price: 500,
                    min_stock_level: 10,
                    occurred_at: Utc::now(),
                }),
                |_, id| Product::empty(ProductId::new(id)),
            )
            .unwrap();
        product_id
    }

    fn receive_stock(
        p: &Pipeline,
        tenant_id: TenantId,
        store_id: StoreId,
        product_id: ProductId,
        quantity: u64,
    ) {
        p.dispatcher
            .dispatch::<Store>(
                tenant_id,
                store_id.0,
                "inventory.store",
                StoreCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    store_id,
                    product_id,
                    quantity,
                    reference: "BL-0042".to_string(),
                    occurred_at: Utc::now(),
                }),
                |_, id| Store::empty(StoreId::new(id)),
            )
            .unwrap();
    }

    fn confirmed_sale(
        p: &Pipeline,
        tenant_id: TenantId,
        store_id: StoreId,
        product_id: ProductId,
        quantity: u64,
    ) -> SaleId {
        let sale_id = SaleId::new(AggregateId::new());
        p.dispatcher
            .dispatch::<Sale>(
                tenant_id,
                sale_id.0,
                "sales.sale",
                SaleCommand::Create(CreateSale {
                    tenant_id,
                    sale_id,
                    customer_id: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| Sale::empty(SaleId::new(id)),
            )
            .unwrap();

        p.dispatcher
            .dispatch::<Sale>(
                tenant_id,
                sale_id.0,
                "sales.sale",
                SaleCommand::AddLine(AddSaleLine {
                    tenant_id,
                    sale_id,
                    item: SaleItem::Product(product_id),
                    quantity,
                    unit_price: 500,
                    discount_bps: 0,
                    occurred_at: Utc::now(),
                }),
                |_, id| Sale::empty(SaleId::new(id)),
            )
            .unwrap();

        let number =
            allocate_number(&*p.numbers, tenant_id, DocumentKind::Sale, Utc::now()).unwrap();
        p.dispatcher
            .dispatch::<Sale>(
                tenant_id,
                sale_id.0,
                "sales.sale",
                SaleCommand::Confirm(ConfirmSale {
                    tenant_id,
                    sale_id,
                    number,
                    store_id,
                    occurred_at: Utc::now(),
                }),
                |_, id| Sale::empty(SaleId::new(id)),
            )
            .unwrap();

        sale_id
    }

    #[test]
    fn confirmed_sale_flows_through_to_an_invoice() {
        let p = pipeline();
        let tenant_id = TenantId::new();

        let store_id = open_store(&p, tenant_id);
        let product_id = register_product(&p, tenant_id, "SAV-300");
        receive_stock(&p, tenant_id, store_id, product_id, 50);
        let sale_id = confirmed_sale(&p, tenant_id, store_id, product_id, 3);
        p.process();

        let sale = p.sales.get(tenant_id, &sale_id).unwrap();
        assert_eq!(sale.status, SaleStatus::Confirmed);
        assert_eq!(sale.total, 1_500);

        // The saga issued exactly one invoice for the sale total.
        let invoices = p.invoices.list(tenant_id);
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].sale_id, Some(sale_id));
        assert_eq!(invoices[0].total, 1_500);
        assert!(invoices[0].number.as_str().starts_with("FAC"));

        // Confirmation issued the sold quantity from the store.
        assert_eq!(p.stock.on_hand(tenant_id, &store_id, &product_id), 47);
    }

    #[test]
    fn paying_the_invoice_in_full_completes_the_sale() {
        let p = pipeline();
        let tenant_id = TenantId::new();

        let store_id = open_store(&p, tenant_id);
        let product_id = register_product(&p, tenant_id, "SAV-300");
        receive_stock(&p, tenant_id, store_id, product_id, 50);
        let sale_id = confirmed_sale(&p, tenant_id, store_id, product_id, 3);
        p.process();

        let invoice_id = p.invoices.list(tenant_id)[0].invoice_id;
        p.dispatcher
            .dispatch::<Invoice>(
                tenant_id,
                invoice_id.0,
                "invoicing.invoice",
                InvoiceCommand::RegisterPayment(RegisterPayment {
                    tenant_id,
                    invoice_id,
                    amount: 1_500,
                    method: PaymentMethod::Cash,
                    occurred_at: Utc::now(),
                }),
                |_, id| Invoice::empty(InvoiceId::new(id)),
            )
            .unwrap();
        p.process();

        let sale = p.sales.get(tenant_id, &sale_id).unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(
            p.invoices.list(tenant_id)[0].status,
            ventora_invoicing::PaymentStatus::Paid
        );
    }

    #[test]
    fn cancelling_a_confirmed_sale_cancels_its_invoice() {
        let p = pipeline();
        let tenant_id = TenantId::new();

        let store_id = open_store(&p, tenant_id);
        let product_id = register_product(&p, tenant_id, "SAV-300");
        receive_stock(&p, tenant_id, store_id, product_id, 50);
        let sale_id = confirmed_sale(&p, tenant_id, store_id, product_id, 3);
        p.process();

        p.dispatcher
            .dispatch::<Sale>(
                tenant_id,
                sale_id.0,
                "sales.sale",
                SaleCommand::Cancel(CancelSale {
                    tenant_id,
                    sale_id,
                    reason: "customer returned the goods".to_string(),
                    occurred_at: Utc::now(),
                }),
                |_, id| Sale::empty(SaleId::new(id)),
            )
            .unwrap();
        p.process();

        let invoices = p.invoices.list(tenant_id);
        assert_eq!(invoices.len(), 1);
        assert_eq!(
            invoices[0].status,
            ventora_invoicing::PaymentStatus::Cancelled
        );
        assert_eq!(invoices[0].outstanding(), 0);
    }

    #[test]
    fn redelivered_confirmation_does_not_duplicate_the_invoice() {
        let p = pipeline();
        let tenant_id = TenantId::new();

        let store_id = open_store(&p, tenant_id);
        let product_id = register_product(&p, tenant_id, "SAV-300");
        let sale_id = confirmed_sale(&p, tenant_id, store_id, product_id, 2);
        p.process();

        // Re-feed the confirmed sale's stream through the saga, simulating
        // an at-least-once redelivery.
        let history = p.store.load_stream(tenant_id, sale_id.0).unwrap();
        for stored in &history {
            p.saga.handle_envelope(&stored.to_envelope()).unwrap();
        }
        p.process();

        assert_eq!(p.invoices.list(tenant_id).len(), 1);
    }

    #[test]
    fn projections_are_tenant_isolated() {
        let p = pipeline();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        let store_a = open_store(&p, tenant_a);
        let product_a = register_product(&p, tenant_a, "SAV-300");
        confirmed_sale(&p, tenant_a, store_a, product_a, 1);
        p.process();

        assert_eq!(p.sales.list(tenant_a).len(), 1);
        assert_eq!(p.invoices.list(tenant_a).len(), 1);
        assert!(p.sales.list(tenant_b).is_empty());
        assert!(p.invoices.list(tenant_b).is_empty());
    }

    #[test]
    fn provisioning_job_runs_through_the_executor() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<Env>> = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus));

        let tenant_id = TenantId::new();
        let company_id = CompanyId::new(AggregateId::new());
        dispatcher
            .dispatch::<Company>(
                tenant_id,
                company_id.0,
                "tenants.company",
                CompanyCommand::Register(RegisterCompany {
                    tenant_id,
                    company_id,
                    name: "Quincaillerie du Centre".to_string(),
                    slug: "quincaillerie-du-centre".to_string(),
                    plan: Plan::Business,
                    currency: "XAF".to_string(),
                    trial_ends_at: None,
                    occurred_at: Utc::now(),
                }),
                |_, id| Company::empty(CompanyId::new(id)),
            )
            .unwrap();

        let jobs = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(jobs.clone());
        executor.register_handler(
            "tenant.provisioning",
            tenant_provisioning_handler(dispatcher.clone(), Arc::new(NoopSchemaProvisioner)),
        );

        jobs.enqueue(Job::new(
            tenant_id,
            JobKind::TenantProvisioning,
            serde_json::json!({ "company_id": company_id }),
        ))
        .unwrap();

        let mut claimed = jobs.claim_next(Some(tenant_id)).unwrap().unwrap();
        executor.execute_one(&mut claimed).unwrap();
        assert!(matches!(claimed.status, JobStatus::Completed));

        let stream = store.load_stream(tenant_id, company_id.0).unwrap();
        assert_eq!(
            stream.last().map(|e| e.event_type.as_str()),
            Some("tenants.company.provisioned")
        );
    }

    proptest! {
        #[test]
        fn stock_level_equals_the_sum_of_receipts(quantities in prop::collection::vec(1u64..500, 1..12)) {
            let p = pipeline();
            let tenant_id = TenantId::new();
            let store_id = open_store(&p, tenant_id);
            let product_id = register_product(&p, tenant_id, "SAV-300");

            for q in &quantities {
                receive_stock(&p, tenant_id, store_id, product_id, *q);
            }
            p.process();

            let expected: u64 = quantities.iter().sum();
            prop_assert_eq!(
                p.stock.on_hand(tenant_id, &store_id, &product_id),
                expected as i64
            );
        }
    }
}
