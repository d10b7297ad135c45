//! Warehouse slot allocation and storage costing (event-sourced).
//!
//! This crate contains the business rules for warehouse layouts, bag
//! allocation and storage billing, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod configuration;
pub mod costing;
pub mod export;
pub mod labels;
pub mod layout;
pub mod occupancy;
pub mod pricing;
pub mod slot;
pub mod warehouse;

pub use configuration::{DEFAULT_SLOT_CAPACITY, LayoutConfiguration};
pub use costing::{CostBreakdown, CostFormulas, StoragePeriod, storage_cost, storage_period};
pub use export::LayoutExport;
pub use labels::BlockLabelScheme;
pub use layout::{Block, Building, GeneratedLayout, Layout, SlotRef, generate_layout};
pub use occupancy::{
    CustomerHolding, OccupancyStats, SlotDetails, SlotLocation, available_slots,
    customer_holdings, find_available_slot, occupancy_stats,
};
pub use pricing::{Pricing, PricingUpdate};
pub use slot::{Allocation, Slot, SlotAddress, SlotReservation, SlotStatus, SlotSummary};
pub use warehouse::{
    AGGREGATE_TYPE, AllocateBags, BagsAllocated, BagsDeallocated, CreateWarehouse,
    DeallocateBags, DetailsUpdated, ReleaseSlot, ReserveSlot, RetireWarehouse, SlotReleased,
    SlotReserved, UpdateDetails, Warehouse, WarehouseCommand, WarehouseCreated, WarehouseEvent,
    WarehouseId, WarehouseRetired,
};
