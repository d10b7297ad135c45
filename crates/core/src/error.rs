//! Domain error model.

use thiserror::Error;

use crate::id::{AggregateId, CustomerId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Identifies what failed to resolve for a [`DomainError::NotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Warehouse(AggregateId),
    Building(String),
    Block { building: String, block: String },
    Slot { block: String, slot: String },
    /// No allocation entry for the customer in the slot.
    Allocation { slot: String, customer: CustomerId },
}

impl core::fmt::Display for Missing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Missing::Warehouse(id) => write!(f, "warehouse {id}"),
            Missing::Building(building) => write!(f, "building '{building}'"),
            Missing::Block { building, block } => {
                write!(f, "block '{block}' in '{building}'")
            }
            Missing::Slot { block, slot } => write!(f, "slot '{slot}' in block '{block}'"),
            Missing::Allocation { slot, customer } => {
                write!(f, "allocation for customer {customer} in slot '{slot}'")
            }
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// capacity, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A building, block, slot or allocation entry did not resolve.
    #[error("not found: {0}")]
    NotFound(Missing),

    /// More bags were requested than the slot has room for.
    #[error("insufficient capacity: available {available} bags, requested {requested} bags")]
    CapacityExceeded { requested: u32, available: u32 },

    /// A value failed validation (bounds, non-positive counts, over-withdrawal).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configuration needs more block labels than the label scheme provides.
    #[error("block labels exhausted: configuration needs {required}, scheme provides {available}")]
    LayoutExhausted { required: u32, available: u32 },

    /// A conflict with current state (duplicate creation, retired warehouse, mixed slot use).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller does not own the warehouse.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(missing: Missing) -> Self {
        Self::NotFound(missing)
    }

    pub fn capacity(requested: u32, available: u32) -> Self {
        Self::CapacityExceeded {
            requested,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_message_reports_both_amounts() {
        let msg = DomainError::capacity(600, 500).to_string();
        assert!(msg.contains("available 500"));
        assert!(msg.contains("requested 600"));
    }

    #[test]
    fn not_found_names_the_identifier() {
        let err = DomainError::not_found(Missing::Slot {
            block: "B".to_string(),
            slot: "B7".to_string(),
        });
        assert_eq!(err.to_string(), "not found: slot 'B7' in block 'B'");
    }
}
