//! Warehouse layout configuration (immutable after creation).

use serde::{Deserialize, Serialize};

use granary_core::{DomainError, DomainResult, ValueObject};

use crate::labels::BlockLabelScheme;

pub const MAX_BUILDINGS: u32 = 10;
pub const MAX_BLOCKS_PER_BUILDING: u32 = 26;
pub const MAX_ROWS_PER_BLOCK: u32 = 20;
pub const MAX_COLS_PER_BLOCK: u32 = 20;

/// Bags a generated slot can hold unless configured otherwise.
pub const DEFAULT_SLOT_CAPACITY: u32 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfiguration {
    pub number_of_buildings: u32,
    pub blocks_per_building: u32,
    pub rows_per_block: u32,
    pub cols_per_block: u32,
    #[serde(default)]
    pub label_scheme: BlockLabelScheme,
}

impl ValueObject for LayoutConfiguration {}

impl LayoutConfiguration {
    pub fn new(
        number_of_buildings: u32,
        blocks_per_building: u32,
        rows_per_block: u32,
        cols_per_block: u32,
    ) -> Self {
        Self {
            number_of_buildings,
            blocks_per_building,
            rows_per_block,
            cols_per_block,
            label_scheme: BlockLabelScheme::SingleLetter,
        }
    }

    pub fn with_label_scheme(mut self, label_scheme: BlockLabelScheme) -> Self {
        self.label_scheme = label_scheme;
        self
    }

    /// Blocks across all buildings (one label each).
    pub fn block_count(&self) -> u32 {
        self.number_of_buildings.saturating_mul(self.blocks_per_building)
    }

    pub fn slots_per_block(&self) -> u32 {
        self.rows_per_block.saturating_mul(self.cols_per_block)
    }

    pub fn total_slots(&self) -> u32 {
        self.block_count().saturating_mul(self.slots_per_block())
    }

    /// Check dimension bounds, then that the label scheme covers every block.
    pub fn validate(&self) -> DomainResult<()> {
        check_bound("number_of_buildings", self.number_of_buildings, MAX_BUILDINGS)?;
        check_bound(
            "blocks_per_building",
            self.blocks_per_building,
            MAX_BLOCKS_PER_BUILDING,
        )?;
        check_bound("rows_per_block", self.rows_per_block, MAX_ROWS_PER_BLOCK)?;
        check_bound("cols_per_block", self.cols_per_block, MAX_COLS_PER_BLOCK)?;

        if let Some(available) = self.label_scheme.capacity() {
            let required = self.block_count();
            if required > available {
                return Err(DomainError::LayoutExhausted {
                    required,
                    available,
                });
            }
        }
        Ok(())
    }
}

fn check_bound(field: &str, value: u32, max: u32) -> DomainResult<()> {
    if value == 0 || value > max {
        return Err(DomainError::invalid(format!(
            "{field} must be between 1 and {max} (got {value})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_largest_single_letter_warehouse() {
        assert!(LayoutConfiguration::new(1, 26, 20, 20).validate().is_ok());
        assert!(LayoutConfiguration::new(2, 13, 1, 1).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_bounds_dimensions() {
        for config in [
            LayoutConfiguration::new(0, 1, 1, 1),
            LayoutConfiguration::new(11, 1, 1, 1),
            LayoutConfiguration::new(1, 27, 1, 1),
            LayoutConfiguration::new(1, 1, 21, 1),
            LayoutConfiguration::new(1, 1, 1, 0),
        ] {
            assert!(
                matches!(config.validate(), Err(DomainError::InvalidArgument(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_more_blocks_than_single_letters() {
        let err = LayoutConfiguration::new(2, 14, 1, 1).validate().unwrap_err();
        assert_eq!(
            err,
            DomainError::LayoutExhausted {
                required: 28,
                available: 26
            }
        );
    }

    #[test]
    fn multi_letter_scheme_lifts_the_block_limit() {
        let config = LayoutConfiguration::new(10, 26, 1, 1)
            .with_label_scheme(BlockLabelScheme::MultiLetter);
        assert!(config.validate().is_ok());
        assert_eq!(config.block_count(), 260);
    }

    #[test]
    fn total_slots_is_the_product_of_dimensions() {
        assert_eq!(LayoutConfiguration::new(2, 3, 4, 5).total_slots(), 120);
    }
}
