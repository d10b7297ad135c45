use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use granary_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

type Streams = BTreeMap<AggregateId, Vec<StoredEvent>>;

/// Process-local store: one `Vec` per warehouse stream behind a single lock.
///
/// `append` takes the write lock before reading the stream head and keeps it
/// until the batch is pushed, so of two writers expecting the same version
/// exactly one commits.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events committed across all streams.
    pub fn len(&self) -> usize {
        self.streams
            .read()
            .map(|streams| streams.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: PoisonError<T>) -> EventStoreError {
    EventStoreError::InvalidAppend("event store lock poisoned".to_string())
}

/// Rejects batches that straddle streams or mix aggregate types.
fn single_stream(events: &[UncommittedEvent]) -> Result<(AggregateId, &str), EventStoreError> {
    let Some(head) = events.first() else {
        return Err(EventStoreError::InvalidAppend("empty batch".to_string()));
    };
    for (position, e) in events.iter().enumerate().skip(1) {
        if e.aggregate_id != head.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {position} targets stream {} but the batch started on {}",
                e.aggregate_id, head.aggregate_id
            )));
        }
        if e.aggregate_type != head.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "event {position} is '{}' but the batch started as '{}'",
                e.aggregate_type, head.aggregate_type
            )));
        }
    }
    Ok((head.aggregate_id, head.aggregate_type.as_str()))
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let (aggregate_id, aggregate_type) = single_stream(&events)?;
        let aggregate_type = aggregate_type.to_string();

        let mut streams = self.streams.write().map_err(poisoned)?;
        let stream = streams.entry(aggregate_id).or_default();
        let head = stream.last().map_or(0, |e| e.sequence_number);

        if !expected_version.matches(head) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {aggregate_id} is at {head}, caller expected {expected_version:?}"
            )));
        }
        if let Some(existing) = stream.first().filter(|e| e.aggregate_type != aggregate_type) {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} holds '{}', refusing '{aggregate_type}'",
                existing.aggregate_type
            )));
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(head + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();
        stream.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams.values().flatten().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "warehouse.created".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn assigns_consecutive_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![event(id, "warehouse.layout")], ExpectedVersion::Exact(0))
            .unwrap();
        let second = store
            .append(
                vec![event(id, "warehouse.layout"), event(id, "warehouse.layout")],
                ExpectedVersion::Exact(1),
            )
            .unwrap();

        assert_eq!(first[0].sequence_number, 1);
        assert_eq!(
            second.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "warehouse.layout")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, "warehouse.layout")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let err = store
            .append(
                vec![event(a, "warehouse.layout"), event(b, "warehouse.layout")],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));

        store
            .append(vec![event(a, "warehouse.layout")], ExpectedVersion::Any)
            .unwrap();
        let err = store
            .append(vec![event(a, "other")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn load_all_spans_streams() {
        let store = InMemoryEventStore::new();
        for _ in 0..3 {
            store
                .append(
                    vec![event(AggregateId::new(), "warehouse.layout")],
                    ExpectedVersion::Exact(0),
                )
                .unwrap();
        }
        assert_eq!(store.load_all().unwrap().len(), 3);
        assert_eq!(store.len(), 3);
        assert!(store.load_stream(AggregateId::new()).unwrap().is_empty());
    }
}
