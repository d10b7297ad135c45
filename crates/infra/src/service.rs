//! Application service exposing the warehouse engine to an outer layer
//! (HTTP handlers, jobs). Authentication happens outside; ownership is
//! checked by the aggregate from the `owner_id` each mutation carries.

use std::sync::Mutex;

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use granary_core::{AggregateId, AllocationId, CustomerId, DomainError, Missing, OwnerId};
use granary_events::{EventBus, EventEnvelope};
use granary_warehouse::{
    AGGREGATE_TYPE, Allocation, AllocateBags, CostBreakdown, CreateWarehouse, DeallocateBags,
    LayoutConfiguration, LayoutExport, OccupancyStats, Pricing, PricingUpdate, ReleaseSlot,
    ReserveSlot, RetireWarehouse, SlotAddress, SlotDetails, SlotLocation, SlotSummary,
    UpdateDetails, Warehouse, WarehouseCommand, WarehouseEvent, WarehouseId, storage_cost,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::config::EngineConfig;
use crate::event_store::EventStore;
use crate::projections::{CatalogProjectionError, WarehouseCatalogProjection, WarehouseSummary};
use crate::read_model::{InMemoryReadModelStore, ReadModelStore};
use crate::storage_records::{
    DEFAULT_GRAIN_TYPE, DEFAULT_QUALITY_GRADE, RecordStatus, StorageRecord, StorageRecordSink,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Business failure with enough detail to render a user-facing message.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("catalog projection failed: {0}")]
    Catalog(#[from] CatalogProjectionError),

    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("service lock poisoned")]
    Poisoned,
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => ServiceError::Domain(err),
            other => ServiceError::Dispatch(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWarehouseRequest {
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub configuration: LayoutConfiguration,
    /// Falls back to the configured default pricing.
    #[serde(default)]
    pub pricing: Option<Pricing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateBagsRequest {
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub bags: u32,
    #[serde(default)]
    pub grain_type: Option<String>,
    pub weight_kg: Decimal,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocateBagsRequest {
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub allocation_id: Option<AllocationId>,
    pub bags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSlotRequest {
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub grain_details: String,
    #[serde(default)]
    pub allocation_id: Option<AllocationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWarehouseRequest {
    pub owner_id: OwnerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pricing: PricingUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReceipt {
    pub allocation_id: AllocationId,
    pub slot: SlotSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlots {
    pub slots: Vec<SlotLocation>,
    pub count: u32,
    pub total: u32,
}

/// One allocation entry of a customer, located across warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrainLocation {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub owner_id: Option<OwnerId>,
    pub location: SlotLocation,
    pub allocation: Allocation,
    pub slot: SlotSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseOverview {
    pub summary: WarehouseSummary,
    pub occupancy: OccupancyStats,
}

/// Facade over dispatcher, catalog and storage-record sink.
///
/// - `S`: event store
/// - `B`: event bus (real-time slot notifications)
/// - `R`: storage record sink
/// - `C`: catalog read model store
pub struct WarehouseService<S, B, R, C = InMemoryReadModelStore<WarehouseId, WarehouseSummary>>
where
    C: ReadModelStore<WarehouseId, WarehouseSummary>,
{
    dispatcher: CommandDispatcher<S, B>,
    catalog: WarehouseCatalogProjection<C>,
    records: R,
    config: EngineConfig,
    /// Serializes name checks with the writes they guard.
    naming: Mutex<()>,
}

impl<S, B, R> WarehouseService<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: StorageRecordSink,
{
    /// Service with an in-memory catalog.
    pub fn in_memory_catalog(store: S, bus: B, records: R, config: EngineConfig) -> Self {
        Self::new(store, bus, records, InMemoryReadModelStore::new(), config)
    }
}

impl<S, B, R, C> WarehouseService<S, B, R, C>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: StorageRecordSink,
    C: ReadModelStore<WarehouseId, WarehouseSummary>,
{
    pub fn new(store: S, bus: B, records: R, catalog_store: C, config: EngineConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            catalog: WarehouseCatalogProjection::new(catalog_store),
            records,
            config,
            naming: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn catalog(&self) -> &WarehouseCatalogProjection<C> {
        &self.catalog
    }

    // mutations

    pub fn create_warehouse(
        &self,
        request: CreateWarehouseRequest,
    ) -> Result<Warehouse, ServiceError> {
        let _guard = self.naming.lock().map_err(|_| ServiceError::Poisoned)?;
        self.ensure_name_available(request.owner_id, &request.name, None)?;

        let warehouse_id = WarehouseId::new(AggregateId::new());
        let command = WarehouseCommand::CreateWarehouse(CreateWarehouse {
            warehouse_id,
            owner_id: request.owner_id,
            name: request.name,
            description: request.description,
            configuration: request.configuration,
            pricing: request.pricing.unwrap_or(self.config.default_pricing),
            slot_capacity: self.config.slot_capacity,
            occurred_at: Utc::now(),
        });

        let warehouse = self.execute(warehouse_id, &command)?;
        tracing::info!(
            warehouse_id = %warehouse_id,
            owner_id = %request.owner_id,
            total_slots = warehouse.total_slots(),
            "warehouse created"
        );
        Ok(warehouse)
    }

    pub fn allocate_bags(
        &self,
        warehouse_id: WarehouseId,
        request: AllocateBagsRequest,
    ) -> Result<AllocationReceipt, ServiceError> {
        let allocation_id = AllocationId::new();
        let grain_type = request
            .grain_type
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_GRAIN_TYPE)
            .to_string();

        let command = WarehouseCommand::AllocateBags(AllocateBags {
            warehouse_id,
            owner_id: request.owner_id,
            address: request.address.clone(),
            allocation_id,
            customer_id: request.customer_id,
            customer_name: request.customer_name.clone(),
            bags: request.bags,
            grain_type: grain_type.clone(),
            weight_kg: request.weight_kg,
            notes: request.notes.clone(),
            occurred_at: Utc::now(),
        });

        let warehouse = self.execute(warehouse_id, &command)?;
        let slot = warehouse.slot_summary(&request.address)?;
        tracing::info!(
            warehouse_id = %warehouse_id,
            slot = %request.address,
            bags = request.bags,
            customer_id = %request.customer_id,
            filled_bags = slot.filled_bags,
            "bags allocated"
        );

        self.write_storage_record(warehouse_id, &request, allocation_id, grain_type, &slot);
        Ok(AllocationReceipt {
            allocation_id,
            slot,
        })
    }

    pub fn deallocate_bags(
        &self,
        warehouse_id: WarehouseId,
        request: DeallocateBagsRequest,
    ) -> Result<SlotSummary, ServiceError> {
        let command = WarehouseCommand::DeallocateBags(DeallocateBags {
            warehouse_id,
            owner_id: request.owner_id,
            address: request.address.clone(),
            customer_id: request.customer_id,
            allocation_id: request.allocation_id,
            bags: request.bags,
            occurred_at: Utc::now(),
        });

        let dispatched = self.execute_committed(warehouse_id, &command)?;
        let warehouse = &dispatched.aggregate;
        let slot = warehouse.slot_summary(&request.address)?;
        tracing::info!(
            warehouse_id = %warehouse_id,
            slot = %request.address,
            bags = request.bags,
            customer_id = %request.customer_id,
            filled_bags = slot.filled_bags,
            "bags deallocated"
        );

        let remaining = warehouse.slot_details(&request.address)?.allocations;
        for stored in &dispatched.committed {
            let Ok(WarehouseEvent::BagsDeallocated(e)) =
                serde_json::from_value::<WarehouseEvent>(stored.payload.clone())
            else {
                continue;
            };
            if !remaining.iter().any(|a| a.allocation_id == e.allocation_id) {
                self.complete_storage_record(
                    warehouse_id,
                    e.allocation_id,
                    e.occurred_at.date_naive(),
                );
            }
        }
        Ok(slot)
    }

    /// Hold a whole slot for one customer.
    pub fn reserve_slot(
        &self,
        warehouse_id: WarehouseId,
        request: ReserveSlotRequest,
    ) -> Result<SlotSummary, ServiceError> {
        let command = WarehouseCommand::ReserveSlot(ReserveSlot {
            warehouse_id,
            owner_id: request.owner_id,
            address: request.address.clone(),
            customer_id: request.customer_id,
            grain_details: request.grain_details,
            allocation_id: request.allocation_id,
            occurred_at: Utc::now(),
        });

        let warehouse = self.execute(warehouse_id, &command)?;
        tracing::info!(
            warehouse_id = %warehouse_id,
            slot = %request.address,
            customer_id = %request.customer_id,
            "slot reserved"
        );
        Ok(warehouse.slot_summary(&request.address)?)
    }

    pub fn release_slot(
        &self,
        warehouse_id: WarehouseId,
        owner_id: OwnerId,
        address: SlotAddress,
    ) -> Result<SlotSummary, ServiceError> {
        let command = WarehouseCommand::ReleaseSlot(ReleaseSlot {
            warehouse_id,
            owner_id,
            address: address.clone(),
            occurred_at: Utc::now(),
        });

        let warehouse = self.execute(warehouse_id, &command)?;
        tracing::info!(warehouse_id = %warehouse_id, slot = %address, "slot released");
        Ok(warehouse.slot_summary(&address)?)
    }

    pub fn update_warehouse(
        &self,
        warehouse_id: WarehouseId,
        request: UpdateWarehouseRequest,
    ) -> Result<Warehouse, ServiceError> {
        let _guard = self.naming.lock().map_err(|_| ServiceError::Poisoned)?;
        if let Some(name) = &request.name {
            self.ensure_name_available(request.owner_id, name, Some(warehouse_id))?;
        }

        let command = WarehouseCommand::UpdateDetails(UpdateDetails {
            warehouse_id,
            owner_id: request.owner_id,
            name: request.name,
            description: request.description,
            pricing: request.pricing,
            occurred_at: Utc::now(),
        });

        let warehouse = self.execute(warehouse_id, &command)?;
        tracing::info!(warehouse_id = %warehouse_id, "warehouse updated");
        Ok(warehouse)
    }

    /// Soft delete; rejected while any slot is occupied.
    pub fn retire_warehouse(
        &self,
        warehouse_id: WarehouseId,
        owner_id: OwnerId,
    ) -> Result<(), ServiceError> {
        let command = WarehouseCommand::RetireWarehouse(RetireWarehouse {
            warehouse_id,
            owner_id,
            occurred_at: Utc::now(),
        });

        self.execute(warehouse_id, &command)?;
        tracing::info!(warehouse_id = %warehouse_id, "warehouse retired");
        Ok(())
    }

    // queries

    pub fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Warehouse, ServiceError> {
        let warehouse = self
            .dispatcher
            .load(warehouse_id.0, |id| Warehouse::empty(WarehouseId::new(id)))?;
        if !warehouse.is_created() {
            return Err(DomainError::not_found(Missing::Warehouse(warehouse_id.0)).into());
        }
        Ok(warehouse)
    }

    pub fn occupancy_stats(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<OccupancyStats, ServiceError> {
        Ok(self.warehouse(warehouse_id)?.occupancy_stats())
    }

    /// First unoccupied slot in layout order.
    pub fn find_available_slot(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Option<SlotLocation>, ServiceError> {
        Ok(self.warehouse(warehouse_id)?.find_available_slot())
    }

    pub fn available_slots(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<AvailableSlots, ServiceError> {
        let warehouse = self.warehouse(warehouse_id)?;
        let slots = warehouse.available_slots();
        Ok(AvailableSlots {
            count: slots.len() as u32,
            total: warehouse.total_slots(),
            slots,
        })
    }

    pub fn slot_details(
        &self,
        warehouse_id: WarehouseId,
        address: &SlotAddress,
    ) -> Result<SlotDetails, ServiceError> {
        Ok(self.warehouse(warehouse_id)?.slot_details(address)?)
    }

    /// Storage cost under the warehouse's pricing, or the configured default
    /// pricing when no warehouse is given. `current` defaults to today (UTC).
    pub fn storage_cost(
        &self,
        weight_kg: Decimal,
        entry: NaiveDate,
        current: Option<NaiveDate>,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<CostBreakdown, ServiceError> {
        let current = current.unwrap_or_else(|| Utc::now().date_naive());
        let pricing = match warehouse_id {
            Some(id) => *self.warehouse(id)?.pricing(),
            None => self.config.default_pricing,
        };
        Ok(storage_cost(weight_kg, entry, current, &pricing)?)
    }

    /// Every allocation entry of the customer across active warehouses.
    pub fn customer_grain_locations(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<GrainLocation>, ServiceError> {
        let mut out = Vec::new();
        for warehouse_id in self.catalog.warehouses_for_customer(customer_id) {
            let warehouse = self.warehouse(warehouse_id)?;
            out.extend(
                warehouse
                    .customer_holdings(customer_id)
                    .into_iter()
                    .map(|holding| GrainLocation {
                        warehouse_id,
                        warehouse_name: warehouse.name().to_string(),
                        owner_id: warehouse.owner_id(),
                        location: holding.location,
                        allocation: holding.allocation,
                        slot: holding.slot,
                    }),
            );
        }
        Ok(out)
    }

    /// Active warehouses of the owner, newest first, with live occupancy.
    pub fn list_warehouses(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<WarehouseOverview>, ServiceError> {
        self.catalog
            .list_by_owner(owner_id)
            .into_iter()
            .map(|summary| {
                let occupancy = self.warehouse(summary.warehouse_id)?.occupancy_stats();
                Ok(WarehouseOverview { summary, occupancy })
            })
            .collect()
    }

    pub fn export_layout(&self, warehouse_id: WarehouseId) -> Result<LayoutExport, ServiceError> {
        let warehouse = self.warehouse(warehouse_id)?;
        Ok(LayoutExport::from_warehouse(&warehouse, Utc::now()))
    }

    pub fn export_layout_json(&self, warehouse_id: WarehouseId) -> Result<String, ServiceError> {
        let export = self.export_layout(warehouse_id)?;
        serde_json::to_string_pretty(&export).map_err(|e| ServiceError::Serialize(e.to_string()))
    }

    /// Rebuild the catalog from the full event store.
    pub fn rebuild_catalog(&self) -> Result<(), ServiceError> {
        let events = self
            .dispatcher
            .store()
            .load_all()
            .map_err(DispatchError::from)?;
        self.catalog
            .rebuild_from_scratch(events.iter().map(|e| e.to_envelope()))?;
        Ok(())
    }

    // internals

    fn execute(
        &self,
        warehouse_id: WarehouseId,
        command: &WarehouseCommand,
    ) -> Result<Warehouse, ServiceError> {
        self.execute_committed(warehouse_id, command)
            .map(|out| out.aggregate)
    }

    fn execute_committed(
        &self,
        warehouse_id: WarehouseId,
        command: &WarehouseCommand,
    ) -> Result<Dispatched<Warehouse>, ServiceError> {
        let out = self.dispatcher.dispatch_with_retry(
            warehouse_id.0,
            AGGREGATE_TYPE,
            command,
            |id| Warehouse::empty(WarehouseId::new(id)),
            self.config.max_dispatch_attempts,
        )?;

        // A catalog failure never fails a committed command.
        for stored in &out.committed {
            match self.catalog.apply_envelope(&stored.to_envelope()) {
                Ok(()) => {}
                Err(CatalogProjectionError::NonMonotonicSequence { last, found }) => {
                    tracing::debug!(
                        warehouse_id = %warehouse_id,
                        last,
                        found,
                        "catalog behind the stream, catching up"
                    );
                    self.catch_up_catalog(warehouse_id);
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        warehouse_id = %warehouse_id,
                        sequence_number = stored.sequence_number,
                        "catalog update failed: {err}"
                    );
                }
            }
        }

        Ok(out)
    }

    fn catch_up_catalog(&self, warehouse_id: WarehouseId) {
        let stream = match self.dispatcher.store().load_stream(warehouse_id.0) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(warehouse_id = %warehouse_id, "catalog catch-up load failed: {err}");
                return;
            }
        };
        if let Err(err) = self
            .catalog
            .catch_up(warehouse_id.0, stream.iter().map(|e| e.to_envelope()))
        {
            tracing::warn!(warehouse_id = %warehouse_id, "catalog catch-up failed: {err}");
        }
    }

    fn ensure_name_available(
        &self,
        owner_id: OwnerId,
        name: &str,
        except: Option<WarehouseId>,
    ) -> Result<(), ServiceError> {
        match self.catalog.find_active_by_name(owner_id, name) {
            Some(existing) if Some(existing.warehouse_id) != except => Err(DomainError::conflict(
                format!("a warehouse named '{}' already exists", name.trim()),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn write_storage_record(
        &self,
        warehouse_id: WarehouseId,
        request: &AllocateBagsRequest,
        allocation_id: AllocationId,
        grain_type: String,
        slot: &SlotSummary,
    ) {
        let start_date = Utc::now().date_naive();
        let end_date = start_date
            .checked_add_days(Days::new(u64::from(self.config.record_term_days)))
            .unwrap_or(start_date);

        let record = StorageRecord {
            record_id: uuid::Uuid::now_v7(),
            allocation_id,
            customer_id: request.customer_id,
            warehouse_id,
            owner_id: request.owner_id,
            address: request.address.clone(),
            slot_capacity: slot.capacity,
            bags_used: request.bags,
            grain_type,
            weight_kg: request.weight_kg,
            quality_grade: DEFAULT_QUALITY_GRADE.to_string(),
            start_date,
            end_date,
            status: RecordStatus::Active,
            notes: request.notes.clone(),
        };

        if let Err(err) = self.records.record(record) {
            tracing::warn!(
                warehouse_id = %warehouse_id,
                slot = %request.address,
                customer_id = %request.customer_id,
                "storage record not written: {err}"
            );
        }
    }

    fn complete_storage_record(
        &self,
        warehouse_id: WarehouseId,
        allocation_id: AllocationId,
        end_date: NaiveDate,
    ) {
        if let Err(err) = self.records.complete(allocation_id, end_date) {
            tracing::warn!(
                warehouse_id = %warehouse_id,
                allocation_id = %allocation_id,
                "storage record not completed: {err}"
            );
        }
    }
}
