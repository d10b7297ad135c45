//! Building → block → slot hierarchy and its deterministic generation.

use serde::{Deserialize, Serialize};

use granary_core::{DomainError, DomainResult, Missing};

use crate::configuration::LayoutConfiguration;
use crate::slot::{Slot, SlotAddress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    label: String,
    rows: u32,
    cols: u32,
    slots: Vec<Slot>,
}

impl Block {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    label: String,
    blocks: Vec<Block>,
}

impl Building {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

/// A slot together with the labels of the building and block containing it.
#[derive(Debug, Clone, Copy)]
pub struct SlotRef<'a> {
    pub building: &'a Building,
    pub block: &'a Block,
    pub slot: &'a Slot,
}

impl SlotRef<'_> {
    pub fn address(&self) -> SlotAddress {
        SlotAddress::new(self.building.label(), self.block.label(), self.slot.label())
    }
}

/// The warehouse's slot grid, in layout order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    buildings: Vec<Building>,
}

/// Output of [`generate_layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedLayout {
    pub layout: Layout,
    pub total_slots: u32,
}

/// Validate `config`, then build its layout with every slot empty.
pub fn generate_layout(
    config: &LayoutConfiguration,
    slot_capacity: u32,
) -> DomainResult<GeneratedLayout> {
    config.validate()?;
    if slot_capacity == 0 {
        return Err(DomainError::invalid("slot capacity must be greater than zero"));
    }
    Ok(GeneratedLayout {
        layout: Layout::build(config, slot_capacity),
        total_slots: config.total_slots(),
    })
}

impl Layout {
    /// Build the grid for an already validated configuration.
    ///
    /// Block labels are drawn from one sequence across all buildings; slots
    /// are numbered row-major within their block.
    pub(crate) fn build(config: &LayoutConfiguration, slot_capacity: u32) -> Self {
        let mut labels = config.label_scheme.labels();
        let mut buildings = Vec::with_capacity(config.number_of_buildings as usize);

        for b in 1..=config.number_of_buildings {
            let mut blocks = Vec::with_capacity(config.blocks_per_building as usize);
            for _ in 0..config.blocks_per_building {
                let Some(block_label) = labels.next() else {
                    break;
                };
                let mut slots = Vec::with_capacity(config.slots_per_block() as usize);
                let mut number = 1u32;
                for row in 1..=config.rows_per_block {
                    for col in 1..=config.cols_per_block {
                        slots.push(Slot::new(
                            format!("{block_label}{number}"),
                            row,
                            col,
                            slot_capacity,
                        ));
                        number += 1;
                    }
                }
                blocks.push(Block {
                    label: block_label,
                    rows: config.rows_per_block,
                    cols: config.cols_per_block,
                    slots,
                });
            }
            buildings.push(Building {
                label: format!("Building {b}"),
                blocks,
            });
        }

        Self { buildings }
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    /// Every slot in layout order (building, block, row-major slot).
    pub fn slots(&self) -> impl Iterator<Item = SlotRef<'_>> {
        self.buildings.iter().flat_map(|building| {
            building.blocks.iter().flat_map(move |block| {
                block.slots.iter().map(move |slot| SlotRef {
                    building,
                    block,
                    slot,
                })
            })
        })
    }

    pub fn slot_count(&self) -> u32 {
        self.buildings
            .iter()
            .flat_map(|b| b.blocks.iter())
            .map(|bl| bl.slots.len() as u32)
            .sum()
    }

    /// Resolve `address` to the slot and its enclosing building and block.
    pub fn locate(&self, address: &SlotAddress) -> DomainResult<SlotRef<'_>> {
        let building = self
            .buildings
            .iter()
            .find(|b| b.label == address.building)
            .ok_or_else(|| missing_building(address))?;
        let block = building
            .blocks
            .iter()
            .find(|bl| bl.label == address.block)
            .ok_or_else(|| missing_block(address))?;
        let slot = block
            .slots
            .iter()
            .find(|s| s.label() == address.slot)
            .ok_or_else(|| missing_slot(address))?;
        Ok(SlotRef {
            building,
            block,
            slot,
        })
    }

    pub fn slot(&self, address: &SlotAddress) -> DomainResult<&Slot> {
        self.locate(address).map(|r| r.slot)
    }

    pub(crate) fn slot_mut(&mut self, address: &SlotAddress) -> DomainResult<&mut Slot> {
        let building = self
            .buildings
            .iter_mut()
            .find(|b| b.label == address.building)
            .ok_or_else(|| missing_building(address))?;
        let block = building
            .blocks
            .iter_mut()
            .find(|bl| bl.label == address.block)
            .ok_or_else(|| missing_block(address))?;
        block
            .slots
            .iter_mut()
            .find(|s| s.label() == address.slot)
            .ok_or_else(|| missing_slot(address))
    }

    /// Check every slot's counters.
    pub fn verify(&self) -> DomainResult<()> {
        self.slots().try_for_each(|r| r.slot.verify())
    }
}

fn missing_building(address: &SlotAddress) -> DomainError {
    DomainError::not_found(Missing::Building(address.building.clone()))
}

fn missing_block(address: &SlotAddress) -> DomainError {
    DomainError::not_found(Missing::Block {
        building: address.building.clone(),
        block: address.block.clone(),
    })
}

fn missing_slot(address: &SlotAddress) -> DomainError {
    DomainError::not_found(Missing::Slot {
        block: address.block.clone(),
        slot: address.slot.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DEFAULT_SLOT_CAPACITY;
    use crate::labels::BlockLabelScheme;
    use crate::slot::SlotStatus;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn single_slot_warehouse() {
        let generated =
            generate_layout(&LayoutConfiguration::new(1, 1, 1, 1), DEFAULT_SLOT_CAPACITY).unwrap();

        assert_eq!(generated.total_slots, 1);
        let slots: Vec<_> = generated.layout.slots().collect();
        assert_eq!(slots.len(), 1);
        let only = slots[0];
        assert_eq!(only.building.label(), "Building 1");
        assert_eq!(only.block.label(), "A");
        assert_eq!(only.slot.label(), "A1");
        assert_eq!(only.slot.capacity(), 1500);
        assert_eq!(only.slot.filled_bags(), 0);
        assert_eq!(only.slot.status(), SlotStatus::Empty);
        assert!(!only.slot.is_occupied());
        assert!(only.slot.allocations().is_empty());
    }

    #[test]
    fn block_labels_continue_across_buildings() {
        let generated = generate_layout(&LayoutConfiguration::new(2, 2, 1, 1), 10).unwrap();
        let labels: Vec<(&str, &str)> = generated
            .layout
            .buildings()
            .iter()
            .flat_map(|b| b.blocks().iter().map(move |bl| (b.label(), bl.label())))
            .collect();

        assert_eq!(
            labels,
            vec![
                ("Building 1", "A"),
                ("Building 1", "B"),
                ("Building 2", "C"),
                ("Building 2", "D"),
            ]
        );
    }

    #[test]
    fn slots_are_numbered_row_major() {
        let generated = generate_layout(&LayoutConfiguration::new(1, 1, 2, 3), 10).unwrap();
        let cells: Vec<(String, u32, u32)> = generated
            .layout
            .slots()
            .map(|r| (r.slot.label().to_string(), r.slot.row(), r.slot.col()))
            .collect();

        assert_eq!(cells[0], ("A1".to_string(), 1, 1));
        assert_eq!(cells[2], ("A3".to_string(), 1, 3));
        assert_eq!(cells[3], ("A4".to_string(), 2, 1));
        assert_eq!(cells[5], ("A6".to_string(), 2, 3));
    }

    #[test]
    fn exhausted_alphabet_is_rejected_before_generation() {
        let err = generate_layout(&LayoutConfiguration::new(3, 9, 1, 1), 10).unwrap_err();
        assert_eq!(
            err,
            DomainError::LayoutExhausted {
                required: 27,
                available: 26
            }
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            generate_layout(&LayoutConfiguration::new(1, 1, 1, 1), 0),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn lookups_report_which_label_failed() {
        let layout = generate_layout(&LayoutConfiguration::new(1, 2, 2, 2), 10)
            .unwrap()
            .layout;

        assert!(layout.slot(&SlotAddress::new("Building 1", "B", "B4")).is_ok());
        assert_eq!(
            layout.slot(&SlotAddress::new("Building 9", "A", "A1")).unwrap_err(),
            DomainError::not_found(Missing::Building("Building 9".to_string()))
        );
        assert!(matches!(
            layout.slot(&SlotAddress::new("Building 1", "C", "C1")),
            Err(DomainError::NotFound(Missing::Block { .. }))
        ));
        assert!(matches!(
            layout.slot(&SlotAddress::new("Building 1", "A", "A5")),
            Err(DomainError::NotFound(Missing::Slot { .. }))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: for every valid configuration the generated grid has
        /// totalSlots slots and no repeated block label.
        #[test]
        fn labels_are_unique_and_counts_match(
            buildings in 1u32..=10,
            blocks in 1u32..=26,
            rows in 1u32..=5,
            cols in 1u32..=5,
            multi_letter in any::<bool>()
        ) {
            let scheme = if multi_letter {
                BlockLabelScheme::MultiLetter
            } else {
                BlockLabelScheme::SingleLetter
            };
            let config = LayoutConfiguration::new(buildings, blocks, rows, cols)
                .with_label_scheme(scheme);

            match generate_layout(&config, 100) {
                Ok(generated) => {
                    prop_assert_eq!(generated.total_slots, buildings * blocks * rows * cols);
                    prop_assert_eq!(generated.layout.slot_count(), generated.total_slots);

                    let mut seen = HashSet::new();
                    for building in generated.layout.buildings() {
                        for block in building.blocks() {
                            prop_assert!(seen.insert(block.label().to_string()));
                        }
                    }
                }
                Err(err) => {
                    prop_assert!(!multi_letter && buildings * blocks > 26);
                    let is_exhausted = matches!(err, DomainError::LayoutExhausted { .. });
                    prop_assert!(is_exhausted);
                }
            }
        }
    }
}
