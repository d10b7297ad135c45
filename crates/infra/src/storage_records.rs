//! Customer-facing storage records written alongside bag allocations.
//!
//! Writing a record is best-effort: the slot mutation is already committed
//! when the sink is called, and a sink failure never undoes it.

use std::sync::RwLock;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use granary_core::{AllocationId, CustomerId, OwnerId};
use granary_warehouse::{SlotAddress, WarehouseId};

pub const DEFAULT_GRAIN_TYPE: &str = "Not specified";
pub const DEFAULT_QUALITY_GRADE: &str = "A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub record_id: Uuid,
    pub allocation_id: AllocationId,
    pub customer_id: CustomerId,
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub address: SlotAddress,
    pub slot_capacity: u32,
    pub bags_used: u32,
    pub grain_type: String,
    pub weight_kg: Decimal,
    pub quality_grade: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: RecordStatus,
    pub notes: String,
}

#[derive(Debug, Error)]
pub enum StorageRecordError {
    #[error("storage record rejected: {0}")]
    Rejected(String),

    #[error("storage record sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for storage records (billing, customer dashboards).
pub trait StorageRecordSink: Send + Sync {
    fn record(&self, record: StorageRecord) -> Result<(), StorageRecordError>;

    /// Closes the record of an allocation whose bags have all been withdrawn.
    fn complete(
        &self,
        allocation_id: AllocationId,
        end_date: NaiveDate,
    ) -> Result<(), StorageRecordError>;
}

impl<S> StorageRecordSink for std::sync::Arc<S>
where
    S: StorageRecordSink + ?Sized,
{
    fn record(&self, record: StorageRecord) -> Result<(), StorageRecordError> {
        (**self).record(record)
    }

    fn complete(
        &self,
        allocation_id: AllocationId,
        end_date: NaiveDate,
    ) -> Result<(), StorageRecordError> {
        (**self).complete(allocation_id, end_date)
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStorageRecordSink {
    records: RwLock<Vec<StorageRecord>>,
}

impl InMemoryStorageRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StorageRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn for_customer(&self, customer_id: CustomerId) -> Vec<StorageRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.customer_id == customer_id)
            .collect()
    }
}

impl StorageRecordSink for InMemoryStorageRecordSink {
    fn record(&self, record: StorageRecord) -> Result<(), StorageRecordError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageRecordError::Unavailable("lock poisoned".to_string()))?;
        records.push(record);
        Ok(())
    }

    fn complete(
        &self,
        allocation_id: AllocationId,
        end_date: NaiveDate,
    ) -> Result<(), StorageRecordError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageRecordError::Unavailable("lock poisoned".to_string()))?;
        let record = records
            .iter_mut()
            .find(|r| r.allocation_id == allocation_id && r.status == RecordStatus::Active)
            .ok_or_else(|| {
                StorageRecordError::Rejected(format!(
                    "no active record for allocation {allocation_id}"
                ))
            })?;
        record.status = RecordStatus::Completed;
        record.end_date = end_date;
        Ok(())
    }
}
