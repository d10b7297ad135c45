//! `granary-core`: identifiers, errors and aggregate traits shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, Missing};
pub use id::{AggregateId, AllocationId, CustomerId, OwnerId};
pub use value_object::ValueObject;
