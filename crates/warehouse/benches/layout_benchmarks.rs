use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use granary_core::{Aggregate, AggregateId, AllocationId, CustomerId, OwnerId};
use granary_warehouse::{
    AllocateBags, BlockLabelScheme, CreateWarehouse, DEFAULT_SLOT_CAPACITY, LayoutConfiguration,
    Pricing, Warehouse, WarehouseCommand, WarehouseId, generate_layout, occupancy_stats,
};
use rust_decimal::Decimal;

fn configurations() -> [(&'static str, LayoutConfiguration); 3] {
    [
        ("1_slot", LayoutConfiguration::new(1, 1, 1, 1)),
        ("2600_slots", LayoutConfiguration::new(2, 13, 10, 10)),
        (
            "104000_slots",
            LayoutConfiguration::new(10, 26, 20, 20)
                .with_label_scheme(BlockLabelScheme::MultiLetter),
        ),
    ]
}

/// Warehouse with every other slot holding bags.
fn half_filled(config: LayoutConfiguration) -> Warehouse {
    let id = WarehouseId::new(AggregateId::new());
    let owner = OwnerId::new();
    let mut warehouse = Warehouse::empty(id);
    let created = warehouse
        .handle(&WarehouseCommand::CreateWarehouse(CreateWarehouse {
            warehouse_id: id,
            owner_id: owner,
            name: "Bench".to_string(),
            description: String::new(),
            configuration: config,
            pricing: Pricing::default(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            occurred_at: Utc::now(),
        }))
        .unwrap();
    for event in &created {
        warehouse.apply(event);
    }

    let addresses: Vec<_> = warehouse
        .layout()
        .slots()
        .step_by(2)
        .map(|r| r.address())
        .collect();
    let customer = CustomerId::new();
    for address in addresses {
        let events = warehouse
            .handle(&WarehouseCommand::AllocateBags(AllocateBags {
                warehouse_id: id,
                owner_id: owner,
                address,
                allocation_id: AllocationId::new(),
                customer_id: customer,
                customer_name: "Bench".to_string(),
                bags: 10,
                grain_type: "Wheat".to_string(),
                weight_kg: Decimal::from(500),
                notes: String::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for event in &events {
            warehouse.apply(event);
        }
    }
    warehouse
}

fn bench_layout_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_generation");

    for (name, config) in configurations() {
        group.throughput(Throughput::Elements(u64::from(config.total_slots())));
        group.bench_with_input(BenchmarkId::from_parameter(name), &config, |b, config| {
            b.iter(|| generate_layout(black_box(config), DEFAULT_SLOT_CAPACITY).unwrap());
        });
    }

    group.finish();
}

fn bench_occupancy_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("occupancy_walk");

    for (name, config) in configurations() {
        let warehouse = half_filled(config);
        group.throughput(Throughput::Elements(u64::from(warehouse.total_slots())));
        group.bench_with_input(
            BenchmarkId::new("stats", name),
            &warehouse,
            |b, warehouse| {
                b.iter(|| occupancy_stats(black_box(warehouse.layout())));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("first_available", name),
            &warehouse,
            |b, warehouse| {
                b.iter(|| black_box(warehouse).find_available_slot());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_layout_generation, bench_occupancy_walk);
criterion_main!(benches);
