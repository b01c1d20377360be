use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Envelope for a dispatched event, carrying the raising aggregate's identity.
///
/// This is the unit handed to an [`EventBus`](crate::EventBus). `payload` is the
/// serialized typed event, so subscribers are decoupled from domain crates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    event_version: u32,
    occurred_on: DateTime<Utc>,

    aggregate_id: Uuid,
    aggregate_type: String,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_on: DateTime<Utc>,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            event_version,
            occurred_on,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap a typed event, serializing its payload to JSON.
    pub fn from_typed<T>(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event: &T,
    ) -> Result<Self, serde_json::Error>
    where
        T: Event + Serialize,
    {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(
            event.event_id(),
            event.event_type(),
            event.version(),
            event.occurred_on(),
            aggregate_id,
            aggregate_type,
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;

    #[derive(Debug, Clone, Serialize)]
    struct Pinged {
        #[serde(flatten)]
        meta: EventMetadata,
        target: String,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn metadata(&self) -> &EventMetadata {
            &self.meta
        }
    }

    #[test]
    fn from_typed_copies_metadata_and_serializes_payload() {
        let event = Pinged {
            meta: EventMetadata::now(),
            target: "vin-1".to_string(),
        };
        let aggregate_id = Uuid::now_v7();

        let env = EventEnvelope::from_typed(aggregate_id, "test.aggregate", &event).unwrap();

        assert_eq!(env.event_id(), event.meta.event_id);
        assert_eq!(env.occurred_on(), event.meta.occurred_on);
        assert_eq!(env.event_type(), "test.pinged");
        assert_eq!(env.aggregate_id(), aggregate_id);
        assert_eq!(env.payload()["target"], "vin-1");
    }
}
