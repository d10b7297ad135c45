use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use granary_core::{
    Aggregate, AggregateId, AggregateRoot, AllocationId, CustomerId, DomainError, DomainResult,
    Missing, OwnerId,
};
use granary_events::Event;

use crate::configuration::LayoutConfiguration;
use crate::costing::{self, CostBreakdown};
use crate::layout::Layout;
use crate::occupancy::{self, CustomerHolding, OccupancyStats, SlotDetails, SlotLocation};
use crate::pricing::{Pricing, PricingUpdate};
use crate::slot::{Allocation, SlotAddress, SlotReservation, SlotSummary};

/// Aggregate type recorded on every warehouse stream.
pub const AGGREGATE_TYPE: &str = "warehouse.layout";

/// Warehouse identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Warehouse.
///
/// Owns the whole building/block/slot/allocation tree. Occupancy and slot
/// totals are always derived from that tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    id: WarehouseId,
    owner_id: Option<OwnerId>,
    name: String,
    description: String,
    configuration: Option<LayoutConfiguration>,
    pricing: Pricing,
    slot_capacity: u32,
    layout: Layout,
    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Warehouse {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: WarehouseId) -> Self {
        Self {
            id,
            owner_id: None,
            name: String::new(),
            description: String::new(),
            configuration: None,
            pricing: Pricing::default(),
            slot_capacity: 0,
            layout: Layout::default(),
            is_active: false,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WarehouseId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn configuration(&self) -> Option<LayoutConfiguration> {
        self.configuration
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn slot_capacity(&self) -> u32 {
        self.slot_capacity
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn total_slots(&self) -> u32 {
        self.layout.slot_count()
    }

    pub fn occupied_slots(&self) -> u32 {
        self.layout.slots().filter(|r| r.slot.is_occupied()).count() as u32
    }

    pub fn occupancy_stats(&self) -> OccupancyStats {
        occupancy::occupancy_stats(&self.layout)
    }

    pub fn find_available_slot(&self) -> Option<SlotLocation> {
        occupancy::find_available_slot(&self.layout)
    }

    pub fn available_slots(&self) -> Vec<SlotLocation> {
        occupancy::available_slots(&self.layout)
    }

    pub fn slot_summary(&self, address: &SlotAddress) -> DomainResult<SlotSummary> {
        self.layout.slot(address).map(|slot| slot.summary())
    }

    pub fn slot_details(&self, address: &SlotAddress) -> DomainResult<SlotDetails> {
        self.layout.locate(address).map(SlotDetails::from)
    }

    pub fn customer_holdings(&self, customer_id: CustomerId) -> Vec<CustomerHolding> {
        occupancy::customer_holdings(&self.layout, customer_id)
    }

    /// Storage cost under this warehouse's pricing.
    pub fn storage_cost(
        &self,
        weight_kg: Decimal,
        entry: NaiveDate,
        current: NaiveDate,
    ) -> DomainResult<CostBreakdown> {
        costing::storage_cost(weight_kg, entry, current, &self.pricing)
    }

    pub fn verify(&self) -> DomainResult<()> {
        self.layout.verify()
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWarehouse {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub configuration: LayoutConfiguration,
    pub pricing: Pricing,
    pub slot_capacity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateBags.
///
/// `allocation_id` is chosen by the caller so that deciding stays pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateBags {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub allocation_id: AllocationId,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub bags: u32,
    pub grain_type: String,
    pub weight_kg: Decimal,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeallocateBags.
///
/// Without an `allocation_id` the customer's first entry in the slot is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeallocateBags {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    pub allocation_id: Option<AllocationId>,
    pub bags: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveSlot (whole slot for one customer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSlot {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    pub grain_details: String,
    pub allocation_id: Option<AllocationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseSlot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSlot {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails. Absent fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub pricing: PricingUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetireWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireWarehouse {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    CreateWarehouse(CreateWarehouse),
    AllocateBags(AllocateBags),
    DeallocateBags(DeallocateBags),
    ReserveSlot(ReserveSlot),
    ReleaseSlot(ReleaseSlot),
    UpdateDetails(UpdateDetails),
    RetireWarehouse(RetireWarehouse),
}

/// Event: WarehouseCreated. The layout is rebuilt from the configuration on apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseCreated {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub configuration: LayoutConfiguration,
    pub pricing: Pricing,
    pub slot_capacity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BagsAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagsAllocated {
    pub warehouse_id: WarehouseId,
    pub address: SlotAddress,
    pub allocation: Allocation,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BagsDeallocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagsDeallocated {
    pub warehouse_id: WarehouseId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    pub allocation_id: AllocationId,
    pub bags: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReserved {
    pub warehouse_id: WarehouseId,
    pub address: SlotAddress,
    pub reservation: SlotReservation,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReleased {
    pub warehouse_id: WarehouseId,
    pub address: SlotAddress,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailsUpdated. Carries the resulting values, not the patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub description: String,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WarehouseRetired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRetired {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    WarehouseCreated(WarehouseCreated),
    BagsAllocated(BagsAllocated),
    BagsDeallocated(BagsDeallocated),
    SlotReserved(SlotReserved),
    SlotReleased(SlotReleased),
    DetailsUpdated(DetailsUpdated),
    WarehouseRetired(WarehouseRetired),
}

impl WarehouseEvent {
    pub fn warehouse_id(&self) -> WarehouseId {
        match self {
            WarehouseEvent::WarehouseCreated(e) => e.warehouse_id,
            WarehouseEvent::BagsAllocated(e) => e.warehouse_id,
            WarehouseEvent::BagsDeallocated(e) => e.warehouse_id,
            WarehouseEvent::SlotReserved(e) => e.warehouse_id,
            WarehouseEvent::SlotReleased(e) => e.warehouse_id,
            WarehouseEvent::DetailsUpdated(e) => e.warehouse_id,
            WarehouseEvent::WarehouseRetired(e) => e.warehouse_id,
        }
    }
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseCreated(_) => "warehouse.created",
            WarehouseEvent::BagsAllocated(_) => "warehouse.bags_allocated",
            WarehouseEvent::BagsDeallocated(_) => "warehouse.bags_deallocated",
            WarehouseEvent::SlotReserved(_) => "warehouse.slot_reserved",
            WarehouseEvent::SlotReleased(_) => "warehouse.slot_released",
            WarehouseEvent::DetailsUpdated(_) => "warehouse.details_updated",
            WarehouseEvent::WarehouseRetired(_) => "warehouse.retired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::WarehouseCreated(e) => e.occurred_at,
            WarehouseEvent::BagsAllocated(e) => e.occurred_at,
            WarehouseEvent::BagsDeallocated(e) => e.occurred_at,
            WarehouseEvent::SlotReserved(e) => e.occurred_at,
            WarehouseEvent::SlotReleased(e) => e.occurred_at,
            WarehouseEvent::DetailsUpdated(e) => e.occurred_at,
            WarehouseEvent::WarehouseRetired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::WarehouseCreated(e) => {
                self.id = e.warehouse_id;
                self.owner_id = Some(e.owner_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.configuration = Some(e.configuration);
                self.pricing = e.pricing;
                self.slot_capacity = e.slot_capacity;
                self.layout = Layout::build(&e.configuration, e.slot_capacity);
                self.is_active = true;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            WarehouseEvent::BagsAllocated(e) => {
                if let Ok(slot) = self.layout.slot_mut(&e.address) {
                    slot.deposit(e.allocation.clone());
                }
            }
            WarehouseEvent::BagsDeallocated(e) => {
                if let Ok(slot) = self.layout.slot_mut(&e.address) {
                    slot.withdraw(e.allocation_id, e.bags);
                }
            }
            WarehouseEvent::SlotReserved(e) => {
                if let Ok(slot) = self.layout.slot_mut(&e.address) {
                    slot.reserve(e.reservation.clone());
                }
            }
            WarehouseEvent::SlotReleased(e) => {
                if let Ok(slot) = self.layout.slot_mut(&e.address) {
                    slot.release();
                }
            }
            WarehouseEvent::DetailsUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.pricing = e.pricing;
            }
            WarehouseEvent::WarehouseRetired(_) => {
                self.is_active = false;
            }
        }

        self.updated_at = Some(event.occurred_at());
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::CreateWarehouse(cmd) => self.handle_create(cmd),
            WarehouseCommand::AllocateBags(cmd) => self.handle_allocate(cmd),
            WarehouseCommand::DeallocateBags(cmd) => self.handle_deallocate(cmd),
            WarehouseCommand::ReserveSlot(cmd) => self.handle_reserve(cmd),
            WarehouseCommand::ReleaseSlot(cmd) => self.handle_release(cmd),
            WarehouseCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            WarehouseCommand::RetireWarehouse(cmd) => self.handle_retire(cmd),
        }
    }
}

impl Warehouse {
    /// Shared guard for every command after creation.
    fn ensure_writable(&self, warehouse_id: WarehouseId, owner_id: OwnerId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found(Missing::Warehouse(self.id.0)));
        }
        if self.id != warehouse_id {
            return Err(DomainError::invalid("warehouse_id mismatch"));
        }
        if self.owner_id != Some(owner_id) {
            return Err(DomainError::Unauthorized);
        }
        if !self.is_active {
            return Err(DomainError::conflict(format!(
                "warehouse {} is retired",
                self.id
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateWarehouse) -> DomainResult<Vec<WarehouseEvent>> {
        if self.created {
            return Err(DomainError::conflict("warehouse already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::invalid("name cannot be empty"));
        }
        cmd.configuration.validate()?;
        cmd.pricing.validate()?;
        if cmd.slot_capacity == 0 {
            return Err(DomainError::invalid("slot capacity must be greater than zero"));
        }

        Ok(vec![WarehouseEvent::WarehouseCreated(WarehouseCreated {
            warehouse_id: cmd.warehouse_id,
            owner_id: cmd.owner_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            configuration: cmd.configuration,
            pricing: cmd.pricing,
            slot_capacity: cmd.slot_capacity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateBags) -> DomainResult<Vec<WarehouseEvent>> {
        self.ensure_writable(cmd.warehouse_id, cmd.owner_id)?;
        if cmd.weight_kg < Decimal::ZERO {
            return Err(DomainError::invalid("weight cannot be negative"));
        }

        self.layout.slot(&cmd.address)?.check_deposit(cmd.bags)?;

        Ok(vec![WarehouseEvent::BagsAllocated(BagsAllocated {
            warehouse_id: cmd.warehouse_id,
            address: cmd.address.clone(),
            allocation: Allocation {
                allocation_id: cmd.allocation_id,
                customer_id: cmd.customer_id,
                customer_name: cmd.customer_name.clone(),
                bags: cmd.bags,
                grain_type: cmd.grain_type.clone(),
                weight_kg: cmd.weight_kg,
                entered_at: cmd.occurred_at,
                notes: cmd.notes.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deallocate(&self, cmd: &DeallocateBags) -> DomainResult<Vec<WarehouseEvent>> {
        self.ensure_writable(cmd.warehouse_id, cmd.owner_id)?;

        let entry = self.layout.slot(&cmd.address)?.resolve_withdrawal(
            cmd.customer_id,
            cmd.allocation_id,
            cmd.bags,
        )?;

        Ok(vec![WarehouseEvent::BagsDeallocated(BagsDeallocated {
            warehouse_id: cmd.warehouse_id,
            address: cmd.address.clone(),
            customer_id: cmd.customer_id,
            allocation_id: entry.allocation_id,
            bags: cmd.bags,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveSlot) -> DomainResult<Vec<WarehouseEvent>> {
        self.ensure_writable(cmd.warehouse_id, cmd.owner_id)?;
        self.layout.slot(&cmd.address)?.check_reserve()?;

        Ok(vec![WarehouseEvent::SlotReserved(SlotReserved {
            warehouse_id: cmd.warehouse_id,
            address: cmd.address.clone(),
            reservation: SlotReservation {
                customer_id: cmd.customer_id,
                grain_details: cmd.grain_details.clone(),
                allocation_id: cmd.allocation_id,
                reserved_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseSlot) -> DomainResult<Vec<WarehouseEvent>> {
        self.ensure_writable(cmd.warehouse_id, cmd.owner_id)?;
        let slot = self.layout.slot(&cmd.address)?;
        slot.check_release()?;
        let customer_id = slot
            .reservation()
            .map(|r| r.customer_id)
            .ok_or_else(|| DomainError::conflict(format!("slot {} is not reserved", cmd.address)))?;

        Ok(vec![WarehouseEvent::SlotReleased(SlotReleased {
            warehouse_id: cmd.warehouse_id,
            address: cmd.address.clone(),
            customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> DomainResult<Vec<WarehouseEvent>> {
        self.ensure_writable(cmd.warehouse_id, cmd.owner_id)?;

        let name = match &cmd.name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::invalid("name cannot be empty"));
            }
            Some(name) => name.trim().to_string(),
            None => self.name.clone(),
        };
        let description = cmd
            .description
            .clone()
            .unwrap_or_else(|| self.description.clone());
        let pricing = self.pricing.merged(&cmd.pricing);
        pricing.validate()?;

        if name == self.name && description == self.description && pricing == self.pricing {
            return Ok(Vec::new());
        }

        Ok(vec![WarehouseEvent::DetailsUpdated(DetailsUpdated {
            warehouse_id: cmd.warehouse_id,
            name,
            description,
            pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire(&self, cmd: &RetireWarehouse) -> DomainResult<Vec<WarehouseEvent>> {
        self.ensure_writable(cmd.warehouse_id, cmd.owner_id)?;

        let occupied = self.occupied_slots();
        if occupied > 0 {
            return Err(DomainError::conflict(format!(
                "cannot retire warehouse {}: {occupied} slots are still occupied",
                self.id
            )));
        }

        Ok(vec![WarehouseEvent::WarehouseRetired(WarehouseRetired {
            warehouse_id: cmd.warehouse_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
