//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. They are rebuildable from the event stream and idempotent under
//! at-least-once delivery.

pub mod warehouse_catalog;

pub use warehouse_catalog::{CatalogProjectionError, WarehouseCatalogProjection, WarehouseSummary};
