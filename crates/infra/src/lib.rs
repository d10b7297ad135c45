//! Infrastructure layer: event store, command dispatch, projections,
//! configuration and the warehouse application service.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod service;
pub mod storage_records;


pub use config::EngineConfig;
pub use service::{
    AllocateBagsRequest, AllocationReceipt, AvailableSlots, CreateWarehouseRequest,
    DeallocateBagsRequest, GrainLocation, ReserveSlotRequest, ServiceError,
    UpdateWarehouseRequest, WarehouseOverview, WarehouseService,
};
