use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use ventora_cashbox::CashSessionId;
use ventora_core::{AggregateId, DocumentKind, DocumentNumber, DomainError, TenantId, UserId};
use ventora_customers::CustomerId;
use ventora_events::{EventBus, EventEnvelope, InMemoryEventBus};
use ventora_expenses::ExpenseId;
use ventora_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, PostgresEventStore, StoredEvent},
    jobs::{InMemoryJobStore, Job, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobId,
        JobKind, JobStatus, JobStoreError},
    jobs::JobStore,
    numbering::{
        InMemoryNumberAllocator, NumberAllocator, NumberAllocatorError, PostgresNumberAllocator,
        allocate_number,
    },
    projections::{
        CashSessionReadModel, CashSessionsProjection, CompanyDirectoryProjection,
        CompanyReadModel, CustomerDirectoryProjection, CustomerReadModel, ExpenseReadModel,
        ExpenseReportProjection, InvoiceReadModel, LoanBookProjection, LoanReadModel,
        OpenInvoicesProjection, ProductCatalogProjection, ProductReadModel, SaleReadModel,
        SalesProjection, ServiceCatalogProjection, ServiceReadModel, StockLevel,
        StockLevelsProjection, StockMovementRecord, StoreStockReadModel, UserReadModel,
        UsersProjection,
    },
    read_model::InMemoryTenantStore,
    saga::{InvoicingSagaExecutor, SagaRunner, sale_invoicing::SaleInvoicingSaga},
    workers::{NoopSchemaProvisioner, SchemaProvisioner, subscription_sweep_handler,
        tenant_provisioning_handler},
};
use ventora_inventory::StoreId;
use ventora_invoicing::InvoiceId;
use ventora_loans::LoanId;
use ventora_products::ProductId;
use ventora_sales::{SaleId, SaleStatus};
use ventora_services::ServiceId;
use ventora_tenants::CompanyId;

type Env = EventEnvelope<serde_json::Value>;
type Bus = Arc<InMemoryEventBus<Env>>;

type InMemoryDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;
type PersistentDispatcher = CommandDispatcher<Arc<PostgresEventStore>, Bus>;

type Mem<K, V> = Arc<InMemoryTenantStore<K, V>>;

/// Realtime message broadcast to SSE subscribers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Every read model the API serves, fed by the background bus subscriber.
///
/// Read models are in-memory in both backends and rebuildable from the
/// event stream; only the write side differs between them.
#[derive(Clone)]
pub struct ReadSide {
    pub catalog: Arc<ProductCatalogProjection<Mem<ProductId, ProductReadModel>>>,
    pub customers: Arc<CustomerDirectoryProjection<Mem<CustomerId, CustomerReadModel>>>,
    pub services: Arc<ServiceCatalogProjection<Mem<ServiceId, ServiceReadModel>>>,
    pub stock: Arc<StockLevelsProjection<Mem<StoreId, StoreStockReadModel>>>,
    pub sales: Arc<SalesProjection<Mem<SaleId, SaleReadModel>>>,
    pub invoices: Arc<OpenInvoicesProjection<Mem<InvoiceId, InvoiceReadModel>>>,
    pub cash_sessions: Arc<CashSessionsProjection<Mem<CashSessionId, CashSessionReadModel>>>,
    pub expenses: Arc<ExpenseReportProjection<Mem<ExpenseId, ExpenseReadModel>>>,
    pub loans: Arc<LoanBookProjection<Mem<LoanId, LoanReadModel>>>,
    pub companies: Arc<CompanyDirectoryProjection<Mem<CompanyId, CompanyReadModel>>>,
    pub users: Arc<UsersProjection<Mem<UserId, UserReadModel>>>,
}

impl ReadSide {
    fn new() -> Self {
        Self {
            catalog: Arc::new(ProductCatalogProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            customers: Arc::new(CustomerDirectoryProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            services: Arc::new(ServiceCatalogProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            stock: Arc::new(StockLevelsProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            sales: Arc::new(SalesProjection::new(Arc::new(InMemoryTenantStore::new()))),
            invoices: Arc::new(OpenInvoicesProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            cash_sessions: Arc::new(CashSessionsProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            expenses: Arc::new(ExpenseReportProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            loans: Arc::new(LoanBookProjection::new(Arc::new(InMemoryTenantStore::new()))),
            companies: Arc::new(CompanyDirectoryProjection::new(Arc::new(
                InMemoryTenantStore::new(),
            ))),
            users: Arc::new(UsersProjection::new(Arc::new(InMemoryTenantStore::new()))),
        }
    }

    /// Apply one envelope to whichever projections care about it.
    fn apply(&self, env: &Env) -> Result<(), String> {
        let result = match env.aggregate_type() {
            "products.product" => self.catalog.apply_envelope(env),
            "customers.customer" => self.customers.apply_envelope(env),
            "services.service" => self.services.apply_envelope(env),
            "inventory.store" | "inventory.transfer" | "inventory.count" => {
                self.stock.apply_envelope(env)
            }
            // Confirmed sales issue stock, so the stock view consumes the
            // sale stream as well.
            "sales.sale" => self
                .sales
                .apply_envelope(env)
                .and_then(|_| self.stock.apply_envelope(env)),
            "invoicing.invoice" => self.invoices.apply_envelope(env),
            "cashbox.session" => self.cash_sessions.apply_envelope(env),
            "expenses.expense" => self.expenses.apply_envelope(env),
            "loans.loan" => self.loans.apply_envelope(env),
            "tenants.company" => self.companies.apply_envelope(env),
            "auth.user" => self.users.apply_envelope(env),
            _ => Ok(()),
        };
        result.map_err(|e| e.to_string())
    }

    /// Drop and rebuild every read model from a tenant's full event set.
    ///
    /// Each projection filters to its own aggregate types, so all of them
    /// get the same envelope list.
    fn rebuild(&self, envelopes: &[Env]) -> Result<(), String> {
        let envs = || envelopes.iter().cloned();
        self.catalog
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.customers
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.services
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.stock
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.sales
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.invoices
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.cash_sessions
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.expenses
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.loans
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.companies
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        self.users
            .rebuild_from_scratch(envs())
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Write-side backend: event store, dispatcher and number allocation.
enum Backend {
    InMemory {
        store: Arc<InMemoryEventStore>,
        dispatcher: Arc<InMemoryDispatcher>,
        numbers: Arc<InMemoryNumberAllocator>,
    },
    Persistent {
        store: Arc<PostgresEventStore>,
        dispatcher: Arc<PersistentDispatcher>,
        numbers: Arc<PostgresNumberAllocator>,
    },
}

pub struct AppServices {
    backend: Backend,
    reads: ReadSide,
    jobs: Arc<InMemoryJobStore>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    // Kept so the job executor thread survives as long as the services do.
    _job_executor: JobExecutorHandle,
}

pub async fn build_services() -> anyhow::Result<AppServices> {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        return build_persistent_services().await;
    }

    build_in_memory_services()
}

fn build_in_memory_services() -> anyhow::Result<AppServices> {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher: Arc<InMemoryDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    let numbers = Arc::new(InMemoryNumberAllocator::new());

    let reads = ReadSide::new();
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    let saga = SagaRunner::<SaleInvoicingSaga, _, _>::new(
        store.clone(),
        InvoicingSagaExecutor::new(dispatcher.clone(), numbers.clone()),
    );
    spawn_subscriber(bus.subscribe(), reads.clone(), saga, realtime_tx.clone());

    let jobs = Arc::new(InMemoryJobStore::new());
    let job_executor = spawn_job_executor(
        jobs.clone(),
        dispatcher.clone(),
        Arc::new(NoopSchemaProvisioner),
        reads.companies.clone(),
    )?;

    Ok(AppServices {
        backend: Backend::InMemory {
            store,
            dispatcher,
            numbers,
        },
        reads,
        jobs,
        realtime_tx,
        _job_executor: job_executor,
    })
}

async fn build_persistent_services() -> anyhow::Result<AppServices> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    let store = Arc::new(PostgresEventStore::new(pool.clone()));
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher: Arc<PersistentDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    let numbers = Arc::new(PostgresNumberAllocator::new(pool));

    let reads = ReadSide::new();
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    let saga = SagaRunner::<SaleInvoicingSaga, _, _>::new(
        store.clone(),
        InvoicingSagaExecutor::new(dispatcher.clone(), numbers.clone()),
    );
    spawn_subscriber(bus.subscribe(), reads.clone(), saga, realtime_tx.clone());

    let provisioner = PgSchemaProvisioner {
        store: store.clone(),
        runtime: tokio::runtime::Handle::current(),
    };

    let jobs = Arc::new(InMemoryJobStore::new());
    let job_executor = spawn_job_executor(
        jobs.clone(),
        dispatcher.clone(),
        Arc::new(provisioner),
        reads.companies.clone(),
    )?;

    Ok(AppServices {
        backend: Backend::Persistent {
            store,
            dispatcher,
            numbers,
        },
        reads,
        jobs,
        realtime_tx,
        _job_executor: job_executor,
    })
}

/// Schema provisioner over the Postgres event store's DDL, bridged onto the
/// job executor's worker thread.
struct PgSchemaProvisioner {
    store: Arc<PostgresEventStore>,
    runtime: tokio::runtime::Handle,
}

impl SchemaProvisioner for PgSchemaProvisioner {
    fn provision(&self, tenant_id: TenantId) -> Result<(), String> {
        self.runtime
            .block_on(self.store.provision_tenant(tenant_id))
            .map_err(|e| e.to_string())
    }
}

/// Background subscriber: bus -> projections -> saga -> realtime broadcast.
fn spawn_subscriber<S, X>(
    sub: ventora_events::Subscription<Env>,
    reads: ReadSide,
    saga: SagaRunner<SaleInvoicingSaga, S, X>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
) where
    S: ventora_infra::event_store::EventStore + Send + 'static,
    X: ventora_infra::saga::SagaCommandExecutor + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        loop {
            match sub.recv() {
                Ok(env) => {
                    if let Err(e) = reads.apply(&env) {
                        tracing::warn!("projection apply failed: {e}");
                        continue;
                    }

                    saga.handle_envelope_logged(&env);

                    let at = env.aggregate_type().to_string();
                    // Lossy broadcast; no backpressure on the write path.
                    let _ = realtime_tx.send(RealtimeMessage {
                        tenant_id: env.tenant_id(),
                        topic: format!("{at}.projection_updated"),
                        payload: serde_json::json!({
                            "kind": "projection_update",
                            "aggregate_type": at,
                            "aggregate_id": env.aggregate_id().to_string(),
                            "sequence_number": env.sequence_number(),
                        }),
                    });
                }
                Err(_) => break,
            }
        }
    });
}

fn spawn_job_executor<S, B, P>(
    jobs: Arc<InMemoryJobStore>,
    dispatcher: Arc<CommandDispatcher<S, B>>,
    provisioner: Arc<P>,
    companies: Arc<CompanyDirectoryProjection<Mem<CompanyId, CompanyReadModel>>>,
) -> anyhow::Result<JobExecutorHandle>
where
    S: ventora_infra::event_store::EventStore + Send + Sync + 'static,
    B: EventBus<Env> + Send + Sync + 'static,
    P: SchemaProvisioner + 'static,
{
    let mut executor = JobExecutor::new(jobs);
    executor.register_handler(
        JobKind::TenantProvisioning.routing_key(),
        tenant_provisioning_handler(dispatcher.clone(), provisioner),
    );
    executor.register_handler(
        JobKind::SubscriptionSweep.routing_key(),
        subscription_sweep_handler(dispatcher, companies),
    );

    let handle = executor.spawn(JobExecutorConfig::default().with_name("api-jobs"))?;
    Ok(handle)
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: ventora_core::Aggregate<Error = DomainError>,
        A::Event: ventora_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        match &self.backend {
            Backend::InMemory { dispatcher, .. } => dispatcher.dispatch::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
            Backend::Persistent { dispatcher, .. } => dispatcher.dispatch::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
        }
    }

    /// Allocate the next gapless document number for this tenant and kind.
    pub fn allocate(
        &self,
        tenant_id: TenantId,
        kind: DocumentKind,
    ) -> Result<DocumentNumber, NumberAllocatorError> {
        let now = chrono::Utc::now();
        match &self.backend {
            Backend::InMemory { numbers, .. } => {
                allocate_number(numbers.as_ref() as &dyn NumberAllocator, tenant_id, kind, now)
            }
            Backend::Persistent { numbers, .. } => {
                allocate_number(numbers.as_ref() as &dyn NumberAllocator, tenant_id, kind, now)
            }
        }
    }

    /// Rebuild every read model for one tenant from its event history.
    ///
    /// Returns how many envelopes were replayed. Writes for the tenant
    /// should be quiesced while this runs; envelopes arriving on the bus
    /// mid-rebuild are deduplicated by the projection cursors afterwards.
    pub async fn replay_read_models(&self, tenant_id: TenantId) -> Result<usize, String> {
        let envelopes: Vec<Env> = match &self.backend {
            Backend::InMemory { store, .. } => store
                .all_envelopes()
                .into_iter()
                .filter(|e| e.tenant_id() == tenant_id)
                .collect(),
            Backend::Persistent { store, .. } => store
                .load_tenant_async(tenant_id)
                .await
                .map_err(|e| e.to_string())?
                .iter()
                .map(|stored| stored.to_envelope())
                .collect(),
        };

        self.reads.rebuild(&envelopes)?;
        Ok(envelopes.len())
    }

    // Read side

    pub fn products_get(&self, tenant_id: TenantId, id: &ProductId) -> Option<ProductReadModel> {
        self.reads.catalog.get(tenant_id, id)
    }

    pub fn products_list(&self, tenant_id: TenantId) -> Vec<ProductReadModel> {
        self.reads.catalog.list(tenant_id)
    }

    pub fn customers_get(
        &self,
        tenant_id: TenantId,
        id: &CustomerId,
    ) -> Option<CustomerReadModel> {
        self.reads.customers.get(tenant_id, id)
    }

    pub fn customers_list(&self, tenant_id: TenantId) -> Vec<CustomerReadModel> {
        self.reads.customers.list(tenant_id)
    }

    pub fn customer_by_code(&self, tenant_id: TenantId, code: &str) -> Option<CustomerReadModel> {
        self.reads.customers.find_by_code(tenant_id, code)
    }

    pub fn services_get(&self, tenant_id: TenantId, id: &ServiceId) -> Option<ServiceReadModel> {
        self.reads.services.get(tenant_id, id)
    }

    pub fn services_list(&self, tenant_id: TenantId) -> Vec<ServiceReadModel> {
        self.reads.services.list(tenant_id)
    }

    pub fn stock_on_hand(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
        product_id: &ProductId,
    ) -> i64 {
        self.reads.stock.on_hand(tenant_id, store_id, product_id)
    }

    pub fn stock_levels(&self, tenant_id: TenantId, store_id: &StoreId) -> Vec<StockLevel> {
        self.reads.stock.levels(tenant_id, store_id)
    }

    pub fn stock_movements(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
    ) -> Vec<StockMovementRecord> {
        self.reads.stock.movements(tenant_id, store_id)
    }

    pub fn stock_low(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
        min_level_for: impl Fn(&ProductId) -> Option<i64>,
    ) -> Vec<StockLevel> {
        self.reads
            .stock
            .low_stock(tenant_id, store_id, min_level_for)
    }

    pub fn sales_get(&self, tenant_id: TenantId, id: &SaleId) -> Option<SaleReadModel> {
        self.reads.sales.get(tenant_id, id)
    }

    pub fn sales_list(&self, tenant_id: TenantId) -> Vec<SaleReadModel> {
        self.reads.sales.list(tenant_id)
    }

    pub fn sales_list_by_status(
        &self,
        tenant_id: TenantId,
        status: SaleStatus,
    ) -> Vec<SaleReadModel> {
        self.reads.sales.list_by_status(tenant_id, status)
    }

    pub fn invoices_get(&self, tenant_id: TenantId, id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.reads.invoices.get(tenant_id, id)
    }

    pub fn invoices_list(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.reads.invoices.list(tenant_id)
    }

    pub fn invoices_open(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.reads.invoices.open(tenant_id)
    }

    pub fn invoices_overdue(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.reads.invoices.overdue(tenant_id, chrono::Utc::now())
    }

    pub fn outstanding_for_customer(&self, tenant_id: TenantId, customer_id: &CustomerId) -> u64 {
        self.reads
            .invoices
            .outstanding_for_customer(tenant_id, customer_id)
    }

    pub fn cash_sessions_get(
        &self,
        tenant_id: TenantId,
        id: &CashSessionId,
    ) -> Option<CashSessionReadModel> {
        self.reads.cash_sessions.get(tenant_id, id)
    }

    pub fn cash_sessions_list(&self, tenant_id: TenantId) -> Vec<CashSessionReadModel> {
        self.reads.cash_sessions.list(tenant_id)
    }

    pub fn cash_session_open_for_store(
        &self,
        tenant_id: TenantId,
        store_id: &StoreId,
    ) -> Option<CashSessionReadModel> {
        self.reads.cash_sessions.open_for_store(tenant_id, store_id)
    }

    pub fn expenses_get(&self, tenant_id: TenantId, id: &ExpenseId) -> Option<ExpenseReadModel> {
        self.reads.expenses.get(tenant_id, id)
    }

    pub fn expenses_list(&self, tenant_id: TenantId) -> Vec<ExpenseReadModel> {
        self.reads.expenses.list(tenant_id)
    }

    pub fn loans_get(&self, tenant_id: TenantId, id: &LoanId) -> Option<LoanReadModel> {
        self.reads.loans.get(tenant_id, id)
    }

    pub fn loans_list(&self, tenant_id: TenantId) -> Vec<LoanReadModel> {
        self.reads.loans.list(tenant_id)
    }

    pub fn loans_outstanding(&self, tenant_id: TenantId) -> u64 {
        self.reads.loans.total_outstanding(tenant_id)
    }

    pub fn companies_get(&self, tenant_id: TenantId, id: &CompanyId) -> Option<CompanyReadModel> {
        self.reads.companies.get(tenant_id, id)
    }

    /// A tenant's own company record, if one has been registered.
    pub fn company_for_tenant(&self, tenant_id: TenantId) -> Option<CompanyReadModel> {
        self.reads.companies.list(tenant_id).into_iter().next()
    }

    pub fn users_get(&self, tenant_id: TenantId, id: &UserId) -> Option<UserReadModel> {
        self.reads.users.get(tenant_id, id)
    }

    pub fn users_list(&self, tenant_id: TenantId) -> Vec<UserReadModel> {
        self.reads.users.list(tenant_id)
    }

    // Jobs

    pub fn enqueue_job(&self, job: Job) -> Result<JobId, JobStoreError> {
        self.jobs.enqueue(job)
    }

    pub fn jobs_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        self.jobs.list_by_status(tenant_id, status, limit)
    }
}

/// Build an SSE stream for a tenant (used by `/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
