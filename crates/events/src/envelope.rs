use serde::{Deserialize, Serialize};
use uuid::Uuid;

use granary_core::AggregateId;

/// A committed event plus the stream coordinates it was written at.
///
/// `sequence_number` starts at 1 for a warehouse's first event and grows by
/// one per event, so a consumer can detect gaps or replays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,
    event_type: String,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// Whether this envelope directly follows `cursor` in its stream.
    pub fn follows(&self, cursor: u64) -> bool {
        self.sequence_number == cursor + 1
    }

    /// Re-wraps the payload, keeping the stream coordinates.
    pub fn map_payload<F, T>(self, f: F) -> EventEnvelope<T>
    where
        F: FnOnce(E) -> T,
    {
        EventEnvelope {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            event_type: self.event_type,
            payload: f(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_payload_keeps_coordinates() {
        let id = AggregateId::new();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            id,
            "warehouse.layout",
            3,
            "warehouse.slot_released",
            40_u32,
        );
        let mapped = env.clone().map_payload(|bags| bags.to_string());

        assert_eq!(mapped.payload(), "40");
        assert_eq!(mapped.sequence_number(), 3);
        assert_eq!(mapped.aggregate_id(), id);
        assert!(env.follows(2));
        assert!(!env.follows(3));
    }
}
