//! Storage slots and the allocation entries they hold.
//!
//! A slot's `filled_bags`, `status` and `is_occupied` are never set directly:
//! every mutation goes through `deposit`/`withdraw`/`reserve`/`release`,
//! which re-derive them from the allocation entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use granary_core::{AllocationId, CustomerId, DomainError, DomainResult, Entity, Missing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotStatus {
    Empty,
    PartiallyFilled,
    Full,
}

impl SlotStatus {
    pub fn derive(filled_bags: u32, capacity: u32) -> Self {
        if filled_bags == 0 {
            SlotStatus::Empty
        } else if filled_bags >= capacity {
            SlotStatus::Full
        } else {
            SlotStatus::PartiallyFilled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Empty => "empty",
            SlotStatus::PartiallyFilled => "partially-filled",
            SlotStatus::Full => "full",
        }
    }
}

impl core::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One customer's deposit of bags within a slot.
///
/// A customer may hold several entries in the same slot (separate deposits);
/// entries are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: AllocationId,
    pub customer_id: CustomerId,
    /// Snapshot of the customer's name at deposit time.
    pub customer_name: String,
    pub bags: u32,
    pub grain_type: String,
    pub weight_kg: Decimal,
    pub entered_at: DateTime<Utc>,
    pub notes: String,
}

/// Whole-slot hold for a single customer (no bag accounting).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReservation {
    pub customer_id: CustomerId,
    pub grain_details: String,
    pub allocation_id: Option<AllocationId>,
    pub reserved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    label: String,
    row: u32,
    col: u32,
    capacity: u32,
    filled_bags: u32,
    status: SlotStatus,
    is_occupied: bool,
    allocations: Vec<Allocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reservation: Option<SlotReservation>,
}

impl Entity for Slot {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.label
    }
}

impl Slot {
    pub(crate) fn new(label: String, row: u32, col: u32, capacity: u32) -> Self {
        Self {
            label,
            row,
            col,
            capacity,
            filled_bags: 0,
            status: SlotStatus::Empty,
            is_occupied: false,
            allocations: Vec::new(),
            reservation: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn filled_bags(&self) -> u32 {
        self.filled_bags
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.filled_bags)
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    /// True when the slot holds bags or a whole-slot reservation.
    pub fn is_occupied(&self) -> bool {
        self.is_occupied
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn reservation(&self) -> Option<&SlotReservation> {
        self.reservation.as_ref()
    }

    pub fn summary(&self) -> SlotSummary {
        SlotSummary {
            slot_label: self.label.clone(),
            capacity: self.capacity,
            filled_bags: self.filled_bags,
            remaining_capacity: self.remaining_capacity(),
            status: self.status,
        }
    }

    /// Validate a deposit of `bags` without mutating anything.
    pub fn check_deposit(&self, bags: u32) -> DomainResult<()> {
        if bags == 0 {
            return Err(DomainError::invalid("bags must be greater than zero"));
        }
        if self.reservation.is_some() {
            return Err(DomainError::conflict(format!(
                "slot {} is reserved as a whole and cannot take bag allocations",
                self.label
            )));
        }
        let available = self.remaining_capacity();
        if bags > available {
            return Err(DomainError::capacity(bags, available));
        }
        Ok(())
    }

    /// Resolve the entry a withdrawal of `bags` targets.
    ///
    /// With an explicit `allocation_id` that entry is used; otherwise the
    /// customer's first entry in the slot.
    pub fn resolve_withdrawal(
        &self,
        customer_id: CustomerId,
        allocation_id: Option<AllocationId>,
        bags: u32,
    ) -> DomainResult<&Allocation> {
        if bags == 0 {
            return Err(DomainError::invalid("bags must be greater than zero"));
        }

        let entry = self
            .allocations
            .iter()
            .filter(|a| a.customer_id == customer_id)
            .find(|a| allocation_id.is_none_or(|id| a.allocation_id == id))
            .ok_or_else(|| {
                DomainError::not_found(Missing::Allocation {
                    slot: self.label.clone(),
                    customer: customer_id,
                })
            })?;

        if bags > entry.bags {
            return Err(DomainError::invalid(format!(
                "cannot deallocate {bags} bags: customer only has {} bags in slot {}",
                entry.bags, self.label
            )));
        }
        Ok(entry)
    }

    pub fn check_reserve(&self) -> DomainResult<()> {
        if self.reservation.is_some() {
            return Err(DomainError::conflict(format!(
                "slot {} is already occupied",
                self.label
            )));
        }
        if self.filled_bags > 0 {
            return Err(DomainError::conflict(format!(
                "slot {} holds bag allocations and cannot be reserved as a whole",
                self.label
            )));
        }
        Ok(())
    }

    pub fn check_release(&self) -> DomainResult<()> {
        if self.reservation.is_none() {
            return Err(DomainError::conflict(format!(
                "slot {} is not reserved",
                self.label
            )));
        }
        Ok(())
    }

    pub(crate) fn deposit(&mut self, allocation: Allocation) {
        self.filled_bags = self.filled_bags.saturating_add(allocation.bags);
        self.allocations.push(allocation);
        self.sync_state();
    }

    pub(crate) fn withdraw(&mut self, allocation_id: AllocationId, bags: u32) {
        let Some(idx) = self
            .allocations
            .iter()
            .position(|a| a.allocation_id == allocation_id)
        else {
            return;
        };

        let removed = bags.min(self.allocations[idx].bags);
        if removed == self.allocations[idx].bags {
            self.allocations.remove(idx);
        } else {
            self.allocations[idx].bags -= removed;
        }
        self.filled_bags = self.filled_bags.saturating_sub(removed);
        self.sync_state();
    }

    pub(crate) fn reserve(&mut self, reservation: SlotReservation) {
        self.reservation = Some(reservation);
        self.sync_state();
    }

    pub(crate) fn release(&mut self) {
        self.reservation = None;
        self.sync_state();
    }

    fn sync_state(&mut self) {
        self.status = SlotStatus::derive(self.filled_bags, self.capacity);
        self.is_occupied = self.filled_bags > 0 || self.reservation.is_some();
    }

    /// Check the stored counters agree with the allocation entries.
    pub fn verify(&self) -> DomainResult<()> {
        let total: u64 = self.allocations.iter().map(|a| u64::from(a.bags)).sum();
        if total != u64::from(self.filled_bags) {
            return Err(DomainError::invalid(format!(
                "slot {}: filled_bags {} does not match allocations total {total}",
                self.label, self.filled_bags
            )));
        }
        if self.filled_bags > self.capacity {
            return Err(DomainError::invalid(format!(
                "slot {}: filled_bags {} exceeds capacity {}",
                self.label, self.filled_bags, self.capacity
            )));
        }
        if self.status != SlotStatus::derive(self.filled_bags, self.capacity) {
            return Err(DomainError::invalid(format!(
                "slot {}: status {} does not match filled_bags {}",
                self.label, self.status, self.filled_bags
            )));
        }
        if self.is_occupied != (self.filled_bags > 0 || self.reservation.is_some()) {
            return Err(DomainError::invalid(format!(
                "slot {}: is_occupied is out of sync",
                self.label
            )));
        }
        Ok(())
    }
}

/// Slot state returned after a bag movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot_label: String,
    pub capacity: u32,
    pub filled_bags: u32,
    pub remaining_capacity: u32,
    pub status: SlotStatus,
}

/// Building, block and slot labels that locate one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotAddress {
    pub building: String,
    pub block: String,
    pub slot: String,
}

impl SlotAddress {
    pub fn new(
        building: impl Into<String>,
        block: impl Into<String>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            building: building.into(),
            block: block.into(),
            slot: slot.into(),
        }
    }
}

impl core::fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.building, self.block, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn slot(capacity: u32) -> Slot {
        Slot::new("A1".to_string(), 1, 1, capacity)
    }

    fn allocation(customer_id: CustomerId, bags: u32) -> Allocation {
        Allocation {
            allocation_id: AllocationId::new(),
            customer_id,
            customer_name: "Ravi".to_string(),
            bags,
            grain_type: "wheat".to_string(),
            weight_kg: Decimal::from(bags * 50),
            entered_at: Utc::now(),
            notes: String::new(),
        }
    }

    #[test]
    fn status_follows_filled_bags() {
        assert_eq!(SlotStatus::derive(0, 10), SlotStatus::Empty);
        assert_eq!(SlotStatus::derive(1, 10), SlotStatus::PartiallyFilled);
        assert_eq!(SlotStatus::derive(10, 10), SlotStatus::Full);
    }

    #[test]
    fn status_serializes_in_kebab_case() {
        let json = serde_json::to_string(&SlotStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"partially-filled\"");
    }

    #[test]
    fn filling_to_capacity_marks_full_and_blocks_more() {
        let mut s = slot(1500);
        let customer = CustomerId::new();
        s.deposit(allocation(customer, 1000));
        assert_eq!(s.status(), SlotStatus::PartiallyFilled);

        s.check_deposit(500).unwrap();
        s.deposit(allocation(customer, 500));
        assert_eq!(s.status(), SlotStatus::Full);
        assert_eq!(s.check_deposit(1), Err(DomainError::capacity(1, 0)));
    }

    #[test]
    fn zero_bags_are_rejected() {
        let s = slot(10);
        assert!(matches!(s.check_deposit(0), Err(DomainError::InvalidArgument(_))));
        assert!(matches!(
            s.resolve_withdrawal(CustomerId::new(), None, 0),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn withdrawal_matches_first_entry_of_the_customer() {
        let mut s = slot(100);
        let customer = CustomerId::new();
        let first = allocation(customer, 10);
        let second = allocation(customer, 20);
        let first_id = first.allocation_id;
        let second_id = second.allocation_id;
        s.deposit(first);
        s.deposit(second);

        assert_eq!(s.resolve_withdrawal(customer, None, 5).unwrap().allocation_id, first_id);
        assert_eq!(
            s.resolve_withdrawal(customer, Some(second_id), 15).unwrap().allocation_id,
            second_id
        );
    }

    #[test]
    fn over_withdrawal_reports_the_held_amount() {
        let mut s = slot(100);
        let customer = CustomerId::new();
        s.deposit(allocation(customer, 3));

        let err = s.resolve_withdrawal(customer, None, 5).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidArgument(msg) if msg.contains("only has 3 bags")
        ));
    }

    #[test]
    fn unknown_customer_is_not_found() {
        let mut s = slot(100);
        s.deposit(allocation(CustomerId::new(), 3));
        let stranger = CustomerId::new();

        assert_eq!(
            s.resolve_withdrawal(stranger, None, 1).unwrap_err(),
            DomainError::not_found(Missing::Allocation {
                slot: "A1".to_string(),
                customer: stranger
            })
        );
    }

    #[test]
    fn withdrawing_everything_empties_the_slot() {
        let mut s = slot(100);
        let entry = allocation(CustomerId::new(), 40);
        let id = entry.allocation_id;
        s.deposit(entry);

        s.withdraw(id, 15);
        assert_eq!(s.allocations()[0].bags, 25);
        assert!(s.is_occupied());

        s.withdraw(id, 25);
        assert!(s.allocations().is_empty());
        assert_eq!(s.status(), SlotStatus::Empty);
        assert!(!s.is_occupied());
    }

    #[test]
    fn reservation_and_bags_are_mutually_exclusive() {
        let mut s = slot(100);
        s.reserve(SlotReservation {
            customer_id: CustomerId::new(),
            grain_details: "rice, 40 bags".to_string(),
            allocation_id: None,
            reserved_at: Utc::now(),
        });
        assert!(s.is_occupied());
        assert_eq!(s.status(), SlotStatus::Empty);
        assert!(matches!(s.check_deposit(1), Err(DomainError::Conflict(_))));
        assert!(matches!(s.check_reserve(), Err(DomainError::Conflict(_))));

        s.release();
        assert!(!s.is_occupied());
        assert!(matches!(s.check_release(), Err(DomainError::Conflict(_))));

        s.deposit(allocation(CustomerId::new(), 1));
        assert!(matches!(s.check_reserve(), Err(DomainError::Conflict(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of checked deposits and withdrawals keeps
        /// filled_bags equal to the entry total, within capacity, with the
        /// derived status and occupancy flag.
        #[test]
        fn counters_stay_consistent(
            capacity in 1u32..2000,
            ops in prop::collection::vec((any::<bool>(), 0usize..4, 1u32..800), 1..40)
        ) {
            let customers: Vec<CustomerId> = (0..4).map(|_| CustomerId::new()).collect();
            let mut s = slot(capacity);

            for (is_deposit, who, bags) in ops {
                let customer = customers[who];
                if is_deposit {
                    if s.check_deposit(bags).is_ok() {
                        s.deposit(allocation(customer, bags));
                    }
                } else if let Ok(entry) = s.resolve_withdrawal(customer, None, bags) {
                    let id = entry.allocation_id;
                    s.withdraw(id, bags);
                }
                prop_assert!(s.verify().is_ok());
                prop_assert!(s.filled_bags() <= s.capacity());
            }
        }

        /// Property: a deposit immediately withdrawn restores the slot's counters.
        #[test]
        fn deposit_then_withdraw_round_trips(
            capacity in 1u32..2000,
            preload in 0u32..2000,
            bags in 1u32..2000
        ) {
            let mut s = slot(capacity);
            let preload = preload.min(capacity);
            if preload > 0 {
                s.deposit(allocation(CustomerId::new(), preload));
            }
            let before = (s.filled_bags(), s.status(), s.is_occupied());

            let customer = CustomerId::new();
            if s.check_deposit(bags).is_ok() {
                let entry = allocation(customer, bags);
                let id = entry.allocation_id;
                s.deposit(entry);
                s.withdraw(id, bags);
            }

            prop_assert_eq!((s.filled_bags(), s.status(), s.is_occupied()), before);
        }
    }
}
