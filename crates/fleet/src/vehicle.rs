use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vehiclelink_core::{
    DomainError, DomainResult, Entity, EventBuffer, EventSource, TeslaAccountId, VehicleId,
};
use vehiclelink_events::{Event, EventMetadata};

/// Aggregate root: Vehicle.
///
/// `tesla_account_id` is a back-reference by id to the owning account, not an
/// ownership pointer. `vehicle_identifier` is unique among *active* vehicles of one
/// account; a deactivated vehicle may share it with a later, re-linked one.
#[derive(Debug, Clone)]
pub struct Vehicle {
    id: VehicleId,
    tesla_account_id: TeslaAccountId,
    vehicle_identifier: String,
    display_name: Option<String>,
    linked_at: DateTime<Utc>,
    last_synced_at: Option<DateTime<Utc>>,
    is_active: bool,
    events: EventBuffer<VehicleEvent>,
}

/// Plain field set used by persistence mapping to rebuild a [`Vehicle`].
#[derive(Debug, Clone)]
pub struct VehicleParts {
    pub id: VehicleId,
    pub tesla_account_id: TeslaAccountId,
    pub vehicle_identifier: String,
    pub display_name: Option<String>,
    pub linked_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

impl Vehicle {
    /// Link a vehicle to an account; raises `VehicleLinked`.
    pub fn link(
        tesla_account_id: TeslaAccountId,
        vehicle_identifier: &str,
        display_name: Option<String>,
    ) -> DomainResult<Self> {
        let vehicle_identifier = vehicle_identifier.trim();
        if vehicle_identifier.is_empty() {
            return Err(DomainError::argument(
                "vehicle_identifier",
                "must not be empty",
            ));
        }

        let now = Utc::now();
        let mut vehicle = Self {
            id: VehicleId::new(),
            tesla_account_id,
            vehicle_identifier: vehicle_identifier.to_string(),
            display_name: normalize_name(display_name),
            linked_at: now,
            last_synced_at: None,
            is_active: true,
            events: EventBuffer::new(),
        };

        let linked = VehicleLinked {
            meta: EventMetadata::at(now),
            vehicle_id: vehicle.id,
            tesla_account_id: vehicle.tesla_account_id.clone(),
            vehicle_identifier: vehicle.vehicle_identifier.clone(),
            display_name: vehicle.display_name.clone(),
        };
        vehicle.raise(VehicleEvent::Linked(linked));
        Ok(vehicle)
    }

    /// Rebuild from stored state without raising events. Persistence mapping only.
    pub fn from_persisted(parts: VehicleParts) -> Self {
        Self {
            id: parts.id,
            tesla_account_id: parts.tesla_account_id,
            vehicle_identifier: parts.vehicle_identifier,
            display_name: parts.display_name,
            linked_at: parts.linked_at,
            last_synced_at: parts.last_synced_at,
            is_active: parts.is_active,
            events: EventBuffer::new(),
        }
    }

    pub fn tesla_account_id(&self) -> &TeslaAccountId {
        &self.tesla_account_id
    }

    pub fn vehicle_identifier(&self) -> &str {
        &self.vehicle_identifier
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn linked_at(&self) -> DateTime<Utc> {
        self.linked_at
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn update_display_name(&mut self, name: Option<String>) {
        self.display_name = normalize_name(name);
    }

    pub fn record_sync(&mut self) {
        self.last_synced_at = Some(Utc::now());
    }

    pub fn deactivate(&mut self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::invalid_state("vehicle is already inactive"));
        }
        self.is_active = false;
        Ok(())
    }

    pub fn reactivate(&mut self) -> DomainResult<()> {
        if self.is_active {
            return Err(DomainError::invalid_state("vehicle is already active"));
        }
        self.is_active = true;
        Ok(())
    }
}

impl Entity for Vehicle {
    type Id = VehicleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl EventSource for Vehicle {
    type Event = VehicleEvent;

    fn event_buffer(&self) -> &EventBuffer<VehicleEvent> {
        &self.events
    }

    fn event_buffer_mut(&mut self) -> &mut EventBuffer<VehicleEvent> {
        &mut self.events
    }
}

/// Event emitted when a vehicle is linked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLinked {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub vehicle_id: VehicleId,
    pub tesla_account_id: TeslaAccountId,
    pub vehicle_identifier: String,
    pub display_name: Option<String>,
}

/// All vehicle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum VehicleEvent {
    Linked(VehicleLinked),
}

impl Event for VehicleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VehicleEvent::Linked(_) => "fleet.vehicle.linked",
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            VehicleEvent::Linked(e) => &e.meta,
        }
    }
}
