//! Repository views over a [`UnitOfWork`](crate::UnitOfWork).
//!
//! Reads go straight to the store and return freshly rehydrated aggregates (no pending
//! events). `add` and `update` only register the aggregate with the unit of work;
//! nothing is written until `commit`.

use std::collections::HashSet;

use uuid::Uuid;
use vehiclelink_core::{
    Email, Entity, EventSource, ExternalId, TeslaAccountId, UserId, VehicleId,
};
use vehiclelink_events::Event;
use vehiclelink_fleet::Vehicle;
use vehiclelink_identity::User;

use crate::crypto::TokenCipher;
use crate::persistence::{PersistenceError, Store, UserKey, VehicleKey};

/// An aggregate registered for the next commit.
#[derive(Debug)]
pub(crate) enum Tracked {
    User { user: User, is_new: bool },
    Vehicle { vehicle: Vehicle, is_new: bool },
}

#[async_trait::async_trait]
pub trait UserRepository: Send {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, PersistenceError>;

    async fn get_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<User>, PersistenceError>;

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, PersistenceError>;

    /// Register a new user for insertion.
    fn add(&mut self, user: User);

    /// Register a loaded user for update.
    fn update(&mut self, user: User);
}

#[async_trait::async_trait]
pub trait VehicleRepository: Send {
    async fn get_by_id(&self, id: VehicleId) -> Result<Option<Vehicle>, PersistenceError>;

    /// The active vehicle with this identifier under the account, else the most
    /// recently linked inactive one.
    async fn get_by_vehicle_identifier(
        &self,
        tesla_account_id: &TeslaAccountId,
        vehicle_identifier: &str,
    ) -> Result<Option<Vehicle>, PersistenceError>;

    /// Every vehicle linked to the account, active or not, oldest first.
    async fn get_by_owner_account_id(
        &self,
        tesla_account_id: &TeslaAccountId,
    ) -> Result<Vec<Vehicle>, PersistenceError>;

    fn add(&mut self, vehicle: Vehicle);

    fn update(&mut self, vehicle: Vehicle);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracking
// ─────────────────────────────────────────────────────────────────────────────

/// Move the events queued on `slot` ahead of `incoming`'s own. A clone of the tracked
/// instance carries the same events, so anything already queued is kept once.
fn merge_events<A>(slot: &mut A, incoming: &mut A)
where
    A: EventSource,
    A::Event: Event,
{
    let mut events = slot.drain_events();
    let queued: HashSet<Uuid> = events.iter().map(Event::event_id).collect();
    events.extend(
        incoming
            .drain_events()
            .into_iter()
            .filter(|event| !queued.contains(&event.event_id())),
    );
    for event in events {
        incoming.raise(event);
    }
}

/// Register an aggregate. Re-registering the same id replaces its state and keeps the
/// events queued so far ahead of the new instance's events.
fn track_user(tracked: &mut Vec<Tracked>, mut user: User, is_new: bool) {
    let existing = tracked.iter_mut().find_map(|t| match t {
        Tracked::User { user: u, is_new } if u.id() == user.id() => Some((u, is_new)),
        _ => None,
    });
    match existing {
        Some((slot, was_new)) => {
            merge_events(slot, &mut user);
            *slot = user;
            *was_new = *was_new || is_new;
        }
        None => tracked.push(Tracked::User { user, is_new }),
    }
}

fn track_vehicle(tracked: &mut Vec<Tracked>, mut vehicle: Vehicle, is_new: bool) {
    let existing = tracked.iter_mut().find_map(|t| match t {
        Tracked::Vehicle { vehicle: v, is_new } if v.id() == vehicle.id() => Some((v, is_new)),
        _ => None,
    });
    match existing {
        Some((slot, was_new)) => {
            merge_events(slot, &mut vehicle);
            *slot = vehicle;
            *was_new = *was_new || is_new;
        }
        None => tracked.push(Tracked::Vehicle { vehicle, is_new }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

pub struct UserRepo<'a, S: ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) cipher: &'a TokenCipher,
    pub(crate) tracked: &'a mut Vec<Tracked>,
}

impl<'a, S: Store + ?Sized> UserRepo<'a, S> {
    async fn find(&self, key: UserKey<'_>) -> Result<Option<User>, PersistenceError> {
        self.store
            .find_user(key)
            .await?
            .map(|record| record.into_user(self.cipher))
            .transpose()
    }
}

#[async_trait::async_trait]
impl<'a, S: Store + ?Sized> UserRepository for UserRepo<'a, S> {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, PersistenceError> {
        self.find(UserKey::Id(*id.as_uuid())).await
    }

    async fn get_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<User>, PersistenceError> {
        self.find(UserKey::ExternalId(external_id.as_str())).await
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, PersistenceError> {
        self.find(UserKey::Email(email.as_str())).await
    }

    fn add(&mut self, user: User) {
        track_user(self.tracked, user, true);
    }

    fn update(&mut self, user: User) {
        track_user(self.tracked, user, false);
    }
}

pub struct VehicleRepo<'a, S: ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) tracked: &'a mut Vec<Tracked>,
}

#[async_trait::async_trait]
impl<'a, S: Store + ?Sized> VehicleRepository for VehicleRepo<'a, S> {
    async fn get_by_id(&self, id: VehicleId) -> Result<Option<Vehicle>, PersistenceError> {
        self.store
            .find_vehicle(VehicleKey::Id(*id.as_uuid()))
            .await?
            .map(|record| record.into_vehicle())
            .transpose()
    }

    async fn get_by_vehicle_identifier(
        &self,
        tesla_account_id: &TeslaAccountId,
        vehicle_identifier: &str,
    ) -> Result<Option<Vehicle>, PersistenceError> {
        let key = VehicleKey::Identifier {
            tesla_account_id: tesla_account_id.as_str(),
            vehicle_identifier: vehicle_identifier.trim(),
        };
        self.store
            .find_vehicle(key)
            .await?
            .map(|record| record.into_vehicle())
            .transpose()
    }

    async fn get_by_owner_account_id(
        &self,
        tesla_account_id: &TeslaAccountId,
    ) -> Result<Vec<Vehicle>, PersistenceError> {
        self.store
            .list_vehicles(tesla_account_id.as_str())
            .await?
            .into_iter()
            .map(|record| record.into_vehicle())
            .collect()
    }

    fn add(&mut self, vehicle: Vehicle) {
        track_vehicle(self.tracked, vehicle, true);
    }

    fn update(&mut self, vehicle: Vehicle) {
        track_vehicle(self.tracked, vehicle, false);
    }
}
