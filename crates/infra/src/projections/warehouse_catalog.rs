use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use granary_core::{AggregateId, CustomerId, OwnerId};
use granary_events::EventEnvelope;
use granary_warehouse::{AGGREGATE_TYPE, Pricing, WarehouseEvent, WarehouseId};

use crate::read_model::ReadModelStore;

/// Queryable warehouse read model: identity, ownership and lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseSummary {
    pub warehouse_id: WarehouseId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub total_slots: u32,
    pub pricing: Pricing,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize warehouse event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("catalog lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct CatalogState {
    /// Last applied sequence number per warehouse stream.
    cursors: HashMap<AggregateId, u64>,
    /// Warehouses each customer has ever deposited bags in.
    customers: HashMap<CustomerId, BTreeSet<WarehouseId>>,
}

/// Warehouse catalog projection.
///
/// Backs owner listings, the per-owner name uniqueness check, and the
/// customer → warehouses index used to locate a customer's grain.
#[derive(Debug)]
pub struct WarehouseCatalogProjection<S>
where
    S: ReadModelStore<WarehouseId, WarehouseSummary>,
{
    store: S,
    state: RwLock<CatalogState>,
}

impl<S> WarehouseCatalogProjection<S>
where
    S: ReadModelStore<WarehouseId, WarehouseSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn get(&self, warehouse_id: &WarehouseId) -> Option<WarehouseSummary> {
        self.store.get(warehouse_id)
    }

    /// Active warehouses of `owner_id`, newest first.
    pub fn list_by_owner(&self, owner_id: OwnerId) -> Vec<WarehouseSummary> {
        let mut out: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|w| w.owner_id == owner_id && w.is_active)
            .collect();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.warehouse_id.cmp(&a.warehouse_id))
        });
        out
    }

    /// Active warehouse of `owner_id` with this name (case-insensitive).
    pub fn find_active_by_name(&self, owner_id: OwnerId, name: &str) -> Option<WarehouseSummary> {
        let wanted = name.trim().to_lowercase();
        self.store
            .list()
            .into_iter()
            .find(|w| w.owner_id == owner_id && w.is_active && w.name.to_lowercase() == wanted)
    }

    /// Every active warehouse the customer has deposited bags in.
    pub fn warehouses_for_customer(&self, customer_id: CustomerId) -> Vec<WarehouseId> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        state
            .customers
            .get(&customer_id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| self.store.get(id).is_some_and(|w| w.is_active))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Folds one committed envelope into the catalog.
    ///
    /// Envelopes for other aggregate types are skipped. Anything at or below
    /// the warehouse's cursor is treated as a redelivery and dropped; a gap
    /// is an error.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut state = self
            .state
            .write()
            .map_err(|_| CatalogProjectionError::Poisoned)?;
        let last = state.cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if !envelope.follows(last) {
            return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: WarehouseEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;
        let warehouse_id = event.warehouse_id();
        if warehouse_id.0 != aggregate_id {
            return Err(CatalogProjectionError::StreamMismatch(
                "event warehouse_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            WarehouseEvent::WarehouseCreated(e) => {
                self.store.upsert(
                    warehouse_id,
                    WarehouseSummary {
                        warehouse_id,
                        owner_id: e.owner_id,
                        name: e.name,
                        description: e.description,
                        total_slots: e.configuration.total_slots(),
                        pricing: e.pricing,
                        is_active: true,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            WarehouseEvent::BagsAllocated(e) => {
                state
                    .customers
                    .entry(e.allocation.customer_id)
                    .or_default()
                    .insert(warehouse_id);
                self.touch(&warehouse_id, e.occurred_at);
            }
            WarehouseEvent::SlotReserved(e) => {
                state
                    .customers
                    .entry(e.reservation.customer_id)
                    .or_default()
                    .insert(warehouse_id);
                self.touch(&warehouse_id, e.occurred_at);
            }
            WarehouseEvent::BagsDeallocated(e) => self.touch(&warehouse_id, e.occurred_at),
            WarehouseEvent::SlotReleased(e) => self.touch(&warehouse_id, e.occurred_at),
            WarehouseEvent::DetailsUpdated(e) => {
                if let Some(mut summary) = self.store.get(&warehouse_id) {
                    summary.name = e.name;
                    summary.description = e.description;
                    summary.pricing = e.pricing;
                    summary.updated_at = e.occurred_at;
                    self.store.upsert(warehouse_id, summary);
                }
            }
            WarehouseEvent::WarehouseRetired(e) => {
                if let Some(mut summary) = self.store.get(&warehouse_id) {
                    summary.is_active = false;
                    summary.updated_at = e.occurred_at;
                    self.store.upsert(warehouse_id, summary);
                }
            }
        }

        state.cursors.insert(aggregate_id, seq);
        Ok(())
    }

    fn touch(&self, warehouse_id: &WarehouseId, at: DateTime<Utc>) {
        if let Some(mut summary) = self.store.get(warehouse_id) {
            summary.updated_at = at;
            self.store.upsert(*warehouse_id, summary);
        }
    }

    /// Last sequence number folded in for this warehouse stream.
    pub fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        self.state
            .read()
            .map(|state| state.cursors.get(&aggregate_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Re-applies one warehouse stream from the store, skipping everything
    /// already at or below the cursor. Returns how far the cursor advanced.
    ///
    /// Used when a committed envelope arrives ahead of its predecessor.
    pub fn catch_up(
        &self,
        aggregate_id: AggregateId,
        stream: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<usize, CatalogProjectionError> {
        let mut pending: Vec<_> = stream
            .into_iter()
            .filter(|e| e.aggregate_id() == aggregate_id)
            .collect();
        pending.sort_by_key(|e| e.sequence_number());

        let before = self.cursor(aggregate_id);
        for env in &pending {
            self.apply_envelope(env)?;
        }
        Ok(self.cursor(aggregate_id).saturating_sub(before) as usize)
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CatalogProjectionError> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|_| CatalogProjectionError::Poisoned)?;
            *state = CatalogState::default();
        }
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        // Deterministic replay order: aggregate, sequence.
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
