use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and creation time shared by every domain event.
///
/// Captured once when the event is raised and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_on: DateTime<Utc>,
}

impl EventMetadata {
    /// Fresh metadata stamped with the current UTC time.
    pub fn now() -> Self {
        Self {
            event_id: Uuid::now_v7(),
            occurred_on: Utc::now(),
        }
    }

    pub fn at(occurred_on: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            occurred_on,
        }
    }
}

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **uniquely identified** (`event_id`), so consumers can de-duplicate
/// - **versioned** (schema evolution)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "identity.user.account_linked").
    fn event_type(&self) -> &'static str;

    fn metadata(&self) -> &EventMetadata;

    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }

    fn event_id(&self) -> Uuid {
        self.metadata().event_id
    }

    /// When the event was raised.
    fn occurred_on(&self) -> DateTime<Utc> {
        self.metadata().occurred_on
    }
}
