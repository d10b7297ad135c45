//! Read-only walks over the slot grid.
//!
//! Occupancy is always recomputed from slot state; there is no stored
//! counter to drift from the tree.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use granary_core::CustomerId;

use crate::layout::{Layout, SlotRef};
use crate::slot::{Allocation, SlotSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyStats {
    pub total: u32,
    pub occupied: u32,
    pub available: u32,
    /// Percentage of occupied slots, rounded to two decimals.
    pub occupancy_rate: Decimal,
}

/// Where a slot sits in the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLocation {
    pub building: String,
    pub block: String,
    pub slot_label: String,
    pub row: u32,
    pub col: u32,
}

impl From<SlotRef<'_>> for SlotLocation {
    fn from(r: SlotRef<'_>) -> Self {
        Self {
            building: r.building.label().to_string(),
            block: r.block.label().to_string(),
            slot_label: r.slot.label().to_string(),
            row: r.slot.row(),
            col: r.slot.col(),
        }
    }
}

/// One allocation entry of a customer, with the slot it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerHolding {
    pub location: SlotLocation,
    pub allocation: Allocation,
    pub slot: SlotSummary,
}

/// Full view of one slot, including every allocation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDetails {
    pub location: SlotLocation,
    pub summary: SlotSummary,
    pub allocations: Vec<Allocation>,
}

impl From<SlotRef<'_>> for SlotDetails {
    fn from(r: SlotRef<'_>) -> Self {
        Self {
            summary: r.slot.summary(),
            allocations: r.slot.allocations().to_vec(),
            location: SlotLocation::from(r),
        }
    }
}

pub fn occupancy_stats(layout: &Layout) -> OccupancyStats {
    let (total, occupied) = layout.slots().fold((0u32, 0u32), |(total, occupied), r| {
        (total + 1, occupied + u32::from(r.slot.is_occupied()))
    });

    let occupancy_rate = if total == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(occupied) * Decimal::ONE_HUNDRED / Decimal::from(total))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };

    OccupancyStats {
        total,
        occupied,
        available: total - occupied,
        occupancy_rate,
    }
}

/// First unoccupied slot in layout order.
pub fn find_available_slot(layout: &Layout) -> Option<SlotLocation> {
    layout
        .slots()
        .find(|r| !r.slot.is_occupied())
        .map(SlotLocation::from)
}

pub fn available_slots(layout: &Layout) -> Vec<SlotLocation> {
    layout
        .slots()
        .filter(|r| !r.slot.is_occupied())
        .map(SlotLocation::from)
        .collect()
}

/// Every allocation entry the customer holds, in layout order.
pub fn customer_holdings(layout: &Layout, customer_id: CustomerId) -> Vec<CustomerHolding> {
    layout
        .slots()
        .flat_map(|r| {
            r.slot
                .allocations()
                .iter()
                .filter(move |a| a.customer_id == customer_id)
                .map(move |a| CustomerHolding {
                    location: SlotLocation::from(r),
                    allocation: a.clone(),
                    slot: r.slot.summary(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::LayoutConfiguration;
    use crate::layout::generate_layout;
    use crate::slot::SlotAddress;
    use chrono::Utc;
    use granary_core::AllocationId;

    fn layout(buildings: u32, blocks: u32, rows: u32, cols: u32) -> Layout {
        generate_layout(&LayoutConfiguration::new(buildings, blocks, rows, cols), 100)
            .unwrap()
            .layout
    }

    fn fill(layout: &mut Layout, address: &SlotAddress, customer_id: CustomerId, bags: u32) {
        layout.slot_mut(address).unwrap().deposit(Allocation {
            allocation_id: AllocationId::new(),
            customer_id,
            customer_name: "Meena".to_string(),
            bags,
            grain_type: "paddy".to_string(),
            weight_kg: Decimal::from(bags) * Decimal::from(60),
            entered_at: Utc::now(),
            notes: String::new(),
        });
    }

    #[test]
    fn empty_warehouse_has_zero_rate() {
        let stats = occupancy_stats(&layout(1, 2, 2, 2));
        assert_eq!(
            stats,
            OccupancyStats {
                total: 8,
                occupied: 0,
                available: 8,
                occupancy_rate: Decimal::ZERO,
            }
        );
    }

    #[test]
    fn rate_is_rounded_to_two_decimals() {
        let mut l = layout(1, 1, 1, 3);
        fill(&mut l, &SlotAddress::new("Building 1", "A", "A2"), CustomerId::new(), 5);

        let stats = occupancy_stats(&l);
        assert_eq!(stats.occupied, 1);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.occupancy_rate, Decimal::new(3333, 2));
    }

    #[test]
    fn stats_are_stable_without_mutation() {
        let mut l = layout(2, 3, 2, 2);
        fill(&mut l, &SlotAddress::new("Building 2", "E", "E3"), CustomerId::new(), 9);
        assert_eq!(occupancy_stats(&l), occupancy_stats(&l));
    }

    #[test]
    fn first_available_slot_skips_occupied_ones() {
        let mut l = layout(1, 1, 1, 2);
        assert_eq!(find_available_slot(&l).unwrap().slot_label, "A1");

        fill(&mut l, &SlotAddress::new("Building 1", "A", "A1"), CustomerId::new(), 1);
        let next = find_available_slot(&l).unwrap();
        assert_eq!(next.slot_label, "A2");
        assert_eq!((next.row, next.col), (1, 2));

        fill(&mut l, &SlotAddress::new("Building 1", "A", "A2"), CustomerId::new(), 1);
        assert_eq!(find_available_slot(&l), None);
        assert!(available_slots(&l).is_empty());
    }

    #[test]
    fn holdings_list_each_entry_of_the_customer() {
        let mut l = layout(1, 2, 1, 2);
        let customer = CustomerId::new();
        let other = CustomerId::new();
        fill(&mut l, &SlotAddress::new("Building 1", "A", "A1"), customer, 10);
        fill(&mut l, &SlotAddress::new("Building 1", "A", "A1"), other, 20);
        fill(&mut l, &SlotAddress::new("Building 1", "B", "B2"), customer, 30);
        fill(&mut l, &SlotAddress::new("Building 1", "B", "B2"), customer, 5);

        let holdings = customer_holdings(&l, customer);
        let rows: Vec<(&str, u32, u32)> = holdings
            .iter()
            .map(|h| (h.location.slot_label.as_str(), h.allocation.bags, h.slot.filled_bags))
            .collect();
        assert_eq!(rows, vec![("A1", 10, 30), ("B2", 30, 35), ("B2", 5, 35)]);
    }
}
