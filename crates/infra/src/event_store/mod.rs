//! Append-only event store boundary.
//!
//! One stream per warehouse; the store makes no storage assumptions beyond
//! ordered, versioned append.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
