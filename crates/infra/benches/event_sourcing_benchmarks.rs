use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;

use ventora_core::{AggregateId, ExpectedVersion, TenantId};
use ventora_events::{EventEnvelope, InMemoryEventBus};
use ventora_infra::command_dispatcher::CommandDispatcher;
use ventora_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use ventora_infra::projections::{StockLevelsProjection, StoreStockReadModel};
use ventora_infra::read_model::InMemoryTenantStore;
use ventora_inventory::store::{OpenStore, ReceiveStock, StockReceived, StoreOpened};
use ventora_inventory::{Store, StoreCommand, StoreEvent, StoreId, StoreKind};
use ventora_products::ProductId;

type Env = EventEnvelope<serde_json::Value>;

fn setup_dispatcher() -> (
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<Env>>>,
    TenantId,
) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<Env>> = Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(store, bus), TenantId::new())
}

fn open_store_cmd(tenant_id: TenantId, store_id: StoreId) -> StoreCommand {
    StoreCommand::Open(OpenStore {
        tenant_id,
        store_id,
        name: "Bench Store".to_string(),
        kind: StoreKind::Retail,
        address: "Douala".to_string(),
        occurred_at: Utc::now(),
    })
}

fn receive_cmd(tenant_id: TenantId, store_id: StoreId, product_id: ProductId) -> StoreCommand {
    StoreCommand::ReceiveStock(ReceiveStock {
        tenant_id,
        store_id,
        product_id,
        quantity: 5,
        reference: "BL-0001".to_string(),
        occurred_at: Utc::now(),
    })
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    group.bench_function("open_store_fresh", |b| {
        let (dispatcher, tenant_id) = setup_dispatcher();
        b.iter(|| {
            let store_id = StoreId::new(AggregateId::new());
            dispatcher
                .dispatch::<Store>(
                    tenant_id,
                    store_id.0,
                    "inventory.store",
                    black_box(open_store_cmd(tenant_id, store_id)),
                    |_, id| Store::empty(StoreId::new(id)),
                )
                .unwrap();
        });
    });

    group.bench_function("receive_stock_with_history", |b| {
        let (dispatcher, tenant_id) = setup_dispatcher();
        let store_id = StoreId::new(AggregateId::new());
        let product_id = ProductId::new(AggregateId::new());

        dispatcher
            .dispatch::<Store>(
                tenant_id,
                store_id.0,
                "inventory.store",
                open_store_cmd(tenant_id, store_id),
                |_, id| Store::empty(StoreId::new(id)),
            )
            .unwrap();

        b.iter(|| {
            dispatcher
                .dispatch::<Store>(
                    tenant_id,
                    store_id.0,
                    "inventory.store",
                    black_box(receive_cmd(tenant_id, store_id, product_id)),
                    |_, id| Store::empty(StoreId::new(id)),
                )
                .unwrap();
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            &batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let store_id = StoreId::new(AggregateId::new());
                let product_id = ProductId::new(AggregateId::new());

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|i| {
                            let event = StoreEvent::StockReceived(StockReceived {
                                tenant_id,
                                store_id,
                                product_id,
                                quantity: (i + 1) as u64,
                                reference: "BL-0001".to_string(),
                                occurred_at: Utc::now(),
                            });
                            UncommittedEvent::from_typed(
                                tenant_id,
                                store_id.0,
                                "inventory.store",
                                uuid::Uuid::now_v7(),
                                &event,
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(store.append(events, ExpectedVersion::Any).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10usize, 100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("rebuild_stock_levels", event_count),
            &event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let store_id = StoreId::new(AggregateId::new());
                let product_id = ProductId::new(AggregateId::new());

                let opened = StoreEvent::Opened(StoreOpened {
                    tenant_id,
                    store_id,
                    name: "Bench Store".to_string(),
                    kind: StoreKind::Retail,
                    address: "Douala".to_string(),
                    occurred_at: Utc::now(),
                });
                let mut uncommitted = vec![
                    UncommittedEvent::from_typed(
                        tenant_id,
                        store_id.0,
                        "inventory.store",
                        uuid::Uuid::now_v7(),
                        &opened,
                    )
                    .unwrap(),
                ];
                for i in 0..(count - 1) {
                    let event = StoreEvent::StockReceived(StockReceived {
                        tenant_id,
                        store_id,
                        product_id,
                        quantity: (i % 10 + 1) as u64,
                        reference: "BL-0001".to_string(),
                        occurred_at: Utc::now(),
                    });
                    uncommitted.push(
                        UncommittedEvent::from_typed(
                            tenant_id,
                            store_id.0,
                            "inventory.store",
                            uuid::Uuid::now_v7(),
                            &event,
                        )
                        .unwrap(),
                    );
                }
                let envelopes: Vec<Env> = store
                    .append(uncommitted, ExpectedVersion::Any)
                    .unwrap()
                    .iter()
                    .map(|e| e.to_envelope())
                    .collect();

                let read_store: Arc<InMemoryTenantStore<StoreId, StoreStockReadModel>> =
                    Arc::new(InMemoryTenantStore::new());
                let projection = StockLevelsProjection::new(read_store);

                b.iter(|| {
                    projection
                        .rebuild_from_scratch(black_box(envelopes.clone()))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
