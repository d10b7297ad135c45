//! Runs one warehouse command end to end.
//!
//! ```text
//! load stream -> replay -> handle -> append(Exact(version)) -> publish
//! ```
//!
//! If another allocation commits between replay and append, the append is
//! refused and [`CommandDispatcher::dispatch_with_retry`] starts over from a
//! fresh load.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use granary_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use granary_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic business failure; never retried.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure (the stream moved since it was loaded).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Result of a successful dispatch: the rehydrated aggregate with the new
/// events applied, and the events as committed.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    pub aggregate: A,
    pub committed: Vec<StoredEvent>,
}

/// Couples a store `S` with a bus `B`. Events are appended before they are
/// published; a publish failure is logged and the command still succeeds.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command once (load → handle → append → publish).
    ///
    /// Fails with [`DispatchError::Concurrency`] if another writer appended
    /// to the stream between load and append.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: granary_events::Event + Serialize + DeserializeOwned,
    {
        let mut aggregate = self.load(aggregate_id, make_aggregate)?;
        let expected = ExpectedVersion::Exact(aggregate.version());

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;
        for ev in &decided {
            aggregate.apply(ev);
        }

        // Publication is best-effort once committed.
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    aggregate_id = %aggregate_id,
                    sequence_number = stored.sequence_number,
                    event_type = %stored.event_type,
                    "event committed but publication failed: {err:?}"
                );
            }
        }

        Ok(Dispatched {
            aggregate,
            committed,
        })
    }

    /// Dispatch, retrying the whole cycle on concurrency conflicts.
    ///
    /// Domain failures and other errors are returned immediately.
    pub fn dispatch_with_retry<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
        max_attempts: u32,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: granary_events::Event + Serialize + DeserializeOwned,
    {
        let attempts = max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match self.dispatch(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) => {
                    tracing::debug!(
                        aggregate_id = %aggregate_id,
                        attempt,
                        "concurrency conflict, retrying: {msg}"
                    );
                    last = msg;
                }
                other => return other,
            }
        }

        Err(DispatchError::RetriesExhausted { attempts, last })
    }
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must not leak another stream's events into this one.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use granary_core::{AggregateRoot, OwnerId};
    use granary_events::InMemoryEventBus;
    use granary_warehouse::{
        AGGREGATE_TYPE, CreateWarehouse, DEFAULT_SLOT_CAPACITY, LayoutConfiguration, Pricing,
        Warehouse, WarehouseCommand, WarehouseId,
    };

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn create(id: WarehouseId, name: &str) -> WarehouseCommand {
        WarehouseCommand::CreateWarehouse(CreateWarehouse {
            warehouse_id: id,
            owner_id: OwnerId::new(),
            name: name.to_string(),
            description: String::new(),
            configuration: LayoutConfiguration::new(1, 1, 1, 1),
            pricing: Pricing::default(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> Warehouse {
        Warehouse::empty(WarehouseId::new(id))
    }

    #[test]
    fn dispatch_persists_and_publishes() {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), bus);
        let id = WarehouseId::new(AggregateId::new());

        let out = dispatcher
            .dispatch(id.0, AGGREGATE_TYPE, &create(id, "Main"), make)
            .unwrap();

        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.aggregate.version(), 1);
        assert_eq!(out.aggregate.total_slots(), 1);

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event_type(), "warehouse.created");
        assert_eq!(envelope.sequence_number(), 1);

        let loaded = dispatcher.load(id.0, make).unwrap();
        assert_eq!(loaded, out.aggregate);
    }

    #[test]
    fn domain_errors_are_not_retried() {
        let dispatcher =
            CommandDispatcher::new(InMemoryEventStore::new(), Bus::default());
        let id = WarehouseId::new(AggregateId::new());
        dispatcher
            .dispatch(id.0, AGGREGATE_TYPE, &create(id, "Main"), make)
            .unwrap();

        let err = dispatcher
            .dispatch_with_retry(id.0, AGGREGATE_TYPE, &create(id, "Again"), make, 5)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Conflict(_))));
        assert_eq!(dispatcher.store().load_stream(id.0).unwrap().len(), 1);
    }

    #[test]
    fn stale_stream_surfaces_as_concurrency() {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = CommandDispatcher::new(store.clone(), Bus::default());
        let id = WarehouseId::new(AggregateId::new());

        // Another writer lands between this dispatcher's load and append.
        let racing = create(id, "Racing");
        let result = dispatcher.dispatch(id.0, AGGREGATE_TYPE, &create(id, "Main"), |agg_id| {
            let events = make(agg_id).handle(&racing).unwrap();
            let uncommitted = events
                .iter()
                .map(|ev| {
                    UncommittedEvent::from_typed(agg_id, AGGREGATE_TYPE, Uuid::now_v7(), ev)
                        .unwrap()
                })
                .collect();
            store.append(uncommitted, ExpectedVersion::Exact(0)).unwrap();
            make(agg_id)
        });

        assert!(matches!(result, Err(DispatchError::Concurrency(_))));
    }
}
