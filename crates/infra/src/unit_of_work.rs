//! Request-scoped unit of work.
//!
//! ## Commit protocol
//!
//! 1. Map every tracked aggregate to its record (tokens encrypted here).
//! 2. Wrap every queued domain event in an [`EventEnvelope`], in tracking order.
//! 3. Write all changes with one atomic [`Store::apply`].
//! 4. Only after the write succeeded: drain the aggregates' events, clear tracking and
//!    publish the envelopes.
//!
//! If any step before the write fails, nothing is dispatched and the tracked aggregates
//! keep their queued events, so `has_pending_changes()` stays `true` and the caller may
//! retry the commit or call `discard_tracked()`.
//!
//! A publish failure after a successful write cannot undo the write; it is reported as
//! [`UnitOfWorkError::Dispatch`] and logged.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use vehiclelink_core::{Entity, EventSource};
use vehiclelink_events::{EventBus, EventEnvelope};

use crate::crypto::TokenCipher;
use crate::persistence::{Change, PersistenceError, Store, UserRecord, VehicleRecord};
use crate::repository::{Tracked, UserRepo, VehicleRepo};

pub const USER_AGGREGATE_TYPE: &str = "identity.user";
pub const VEHICLE_AGGREGATE_TYPE: &str = "fleet.vehicle";

pub type DispatchedEvent = EventEnvelope<JsonValue>;

#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The write is durable but some events never reached the bus.
    #[error("{persisted} change(s) persisted but {undelivered} event(s) were not dispatched")]
    Dispatch { persisted: usize, undelivered: usize },
}

pub struct UnitOfWork<S: ?Sized, B> {
    store: Arc<S>,
    cipher: Arc<TokenCipher>,
    bus: B,
    tracked: Vec<Tracked>,
}

impl<S, B> UnitOfWork<S, B>
where
    S: Store + ?Sized,
    B: EventBus<DispatchedEvent>,
{
    pub fn new(store: Arc<S>, cipher: Arc<TokenCipher>, bus: B) -> Self {
        Self {
            store,
            cipher,
            bus,
            tracked: Vec::new(),
        }
    }

    pub fn users(&mut self) -> UserRepo<'_, S> {
        UserRepo {
            store: &*self.store,
            cipher: &self.cipher,
            tracked: &mut self.tracked,
        }
    }

    pub fn vehicles(&mut self) -> VehicleRepo<'_, S> {
        VehicleRepo {
            store: &*self.store,
            tracked: &mut self.tracked,
        }
    }

    /// Whether anything registered via `add`/`update` has not been committed yet.
    pub fn has_pending_changes(&self) -> bool {
        !self.tracked.is_empty()
    }

    /// Forget every tracked aggregate and its queued events.
    pub fn discard_tracked(&mut self) {
        if !self.tracked.is_empty() {
            debug!(discarded = self.tracked.len(), "unit of work discarded");
        }
        self.tracked.clear();
    }

    /// Persist every tracked change atomically, then dispatch the queued events.
    ///
    /// Returns the number of changes written.
    pub async fn commit(&mut self) -> Result<usize, UnitOfWorkError> {
        if self.tracked.is_empty() {
            return Ok(0);
        }

        let (changes, envelopes) = self.prepare()?;
        let persisted = self.store.apply(changes).await?;

        // The envelopes now own every queued event.
        self.tracked.clear();
        debug!(persisted, events = envelopes.len(), "unit of work committed");

        let mut undelivered = 0usize;
        for envelope in envelopes {
            let event_type = envelope.event_type().to_string();
            let event_id = envelope.event_id();
            if let Err(e) = self.bus.publish(envelope) {
                undelivered += 1;
                warn!(%event_id, %event_type, error = ?e, "event dispatch failed after commit");
            }
        }

        if undelivered > 0 {
            return Err(UnitOfWorkError::Dispatch {
                persisted,
                undelivered,
            });
        }
        Ok(persisted)
    }

    fn prepare(&self) -> Result<(Vec<Change>, Vec<DispatchedEvent>), UnitOfWorkError> {
        let mut changes = Vec::with_capacity(self.tracked.len());
        let mut envelopes = Vec::new();

        for tracked in &self.tracked {
            match tracked {
                Tracked::User { user, is_new } => {
                    let record = UserRecord::from_user(user, &self.cipher)?;
                    changes.push(if *is_new {
                        Change::InsertUser(record)
                    } else {
                        Change::UpdateUser(record)
                    });
                    for event in user.pending_events() {
                        envelopes.push(EventEnvelope::from_typed(
                            *user.id().as_uuid(),
                            USER_AGGREGATE_TYPE,
                            event,
                        )?);
                    }
                }
                Tracked::Vehicle { vehicle, is_new } => {
                    let record = VehicleRecord::from_vehicle(vehicle);
                    changes.push(if *is_new {
                        Change::InsertVehicle(record)
                    } else {
                        Change::UpdateVehicle(record)
                    });
                    for event in vehicle.pending_events() {
                        envelopes.push(EventEnvelope::from_typed(
                            *vehicle.id().as_uuid(),
                            VEHICLE_AGGREGATE_TYPE,
                            event,
                        )?);
                    }
                }
            }
        }
        Ok((changes, envelopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionConfig;
    use crate::persistence::InMemoryStore;
    use crate::repository::{UserRepository, VehicleRepository};
    use chrono::{Duration, Utc};
    use vehiclelink_core::{Email, ExternalId, TeslaAccountId};
    use vehiclelink_events::{InMemoryEventBus, Subscription};
    use vehiclelink_fleet::Vehicle;
    use vehiclelink_identity::User;

    type Bus = Arc<InMemoryEventBus<DispatchedEvent>>;

    struct Fixture {
        store: Arc<InMemoryStore>,
        cipher: Arc<TokenCipher>,
        bus: Bus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                cipher: Arc::new(
                    TokenCipher::new(&EncryptionConfig::new("uow-test-secret")).unwrap(),
                ),
                bus: Arc::new(InMemoryEventBus::new()),
            }
        }

        fn uow(&self) -> UnitOfWork<InMemoryStore, Bus> {
            UnitOfWork::new(self.store.clone(), self.cipher.clone(), self.bus.clone())
        }

        fn subscribe(&self) -> Subscription<DispatchedEvent> {
            self.bus.subscribe()
        }
    }

    fn alice() -> User {
        User::create(
            ExternalId::new("ext-1").unwrap(),
            Email::new("a@x.com").unwrap(),
            Some("Alice".to_string()),
        )
    }

    #[tokio::test]
    async fn linked_user_roundtrips_through_storage() {
        let fx = Fixture::new();
        let expires_at = Utc::now() + Duration::seconds(3600);

        let mut user = alice();
        user.link_account(TeslaAccountId::new("tesla-9").unwrap())
            .unwrap();
        user.update_account_tokens("AT1", "RT1", expires_at).unwrap();
        let id = *user.id();

        let mut uow = fx.uow();
        uow.users().add(user);
        assert_eq!(uow.commit().await.unwrap(), 1);

        let loaded = fx.uow().users().get_by_id(id).await.unwrap().unwrap();
        let acc = loaded.active_account().unwrap();
        assert_eq!(acc.account_id().as_str(), "tesla-9");
        assert_eq!(acc.access_token(), Some("AT1"));
        assert_eq!(acc.refresh_token(), Some("RT1"));
        assert!(acc.is_active());
        let drift = (acc.token_expires_at().unwrap() - (Utc::now() + Duration::hours(1)))
            .num_seconds()
            .abs();
        assert!(drift <= 5);
    }

    #[tokio::test]
    async fn events_are_dispatched_after_commit_in_tracking_order() {
        let fx = Fixture::new();
        let sub = fx.subscribe();

        let mut user = alice();
        user.link_account(TeslaAccountId::new("tesla-9").unwrap())
            .unwrap();
        let vehicle =
            Vehicle::link(TeslaAccountId::new("tesla-9").unwrap(), "VIN1", None).unwrap();

        let mut uow = fx.uow();
        uow.users().add(user);
        uow.vehicles().add(vehicle);

        // Nothing leaves before commit.
        assert!(sub.drain_ready().is_empty());

        assert_eq!(uow.commit().await.unwrap(), 2);
        assert!(!uow.has_pending_changes());

        let types: Vec<String> = sub
            .drain_ready()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "identity.user.created",
                "identity.user.account_linked",
                "fleet.vehicle.linked",
            ]
        );

        // A second commit has nothing left to send.
        assert_eq!(uow.commit().await.unwrap(), 0);
        assert!(sub.drain_ready().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_dispatches_nothing_and_keeps_changes() {
        let fx = Fixture::new();

        let mut uow = fx.uow();
        uow.users().add(alice());
        uow.commit().await.unwrap();

        let sub = fx.subscribe();

        // Same email, different external id.
        let duplicate = User::create(
            ExternalId::new("ext-2").unwrap(),
            Email::new("a@x.com").unwrap(),
            None,
        );
        let mut uow = fx.uow();
        uow.users().add(duplicate);

        let err = uow.commit().await.unwrap_err();
        assert!(matches!(
            err,
            UnitOfWorkError::Persistence(PersistenceError::UniqueViolation(_))
        ));
        assert!(sub.drain_ready().is_empty());
        assert!(uow.has_pending_changes());
        assert_eq!(fx.store.user_count(), 1);

        uow.discard_tracked();
        assert!(!uow.has_pending_changes());
        assert_eq!(uow.commit().await.unwrap(), 0);
        assert!(sub.drain_ready().is_empty());
    }

    #[tokio::test]
    async fn update_writes_state_and_only_new_events() {
        let fx = Fixture::new();
        let user = alice();
        let id = *user.id();

        let mut uow = fx.uow();
        uow.users().add(user);
        uow.commit().await.unwrap();

        let sub = fx.subscribe();
        let mut uow = fx.uow();
        let mut loaded = uow.users().get_by_id(id).await.unwrap().unwrap();
        loaded.record_login();
        uow.users().update(loaded);
        assert_eq!(uow.commit().await.unwrap(), 1);

        let dispatched = sub.drain_ready();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].event_type(), "identity.user.logged_in");
        assert_eq!(dispatched[0].aggregate_id(), *id.as_uuid());
        assert_eq!(dispatched[0].aggregate_type(), USER_AGGREGATE_TYPE);

        let reloaded = fx.uow().users().get_by_id(id).await.unwrap().unwrap();
        assert!(reloaded.last_login_at().is_some());
    }

    #[tokio::test]
    async fn retracking_keeps_earlier_events_first() {
        let fx = Fixture::new();
        let sub = fx.subscribe();

        let user = alice();
        let mut copy = user.clone();
        copy.clear_events();
        copy.record_login();

        let mut uow = fx.uow();
        uow.users().add(user);
        uow.users().update(copy);
        assert_eq!(uow.commit().await.unwrap(), 1);

        let types: Vec<String> = sub
            .drain_ready()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(
            types,
            vec!["identity.user.created", "identity.user.logged_in"]
        );
        assert_eq!(fx.store.user_count(), 1);
    }

    #[tokio::test]
    async fn retracking_a_clone_dispatches_each_event_once() {
        let fx = Fixture::new();
        let sub = fx.subscribe();

        let user = alice();
        let mut copy = user.clone();
        copy.record_login();

        let mut uow = fx.uow();
        uow.users().add(user);
        uow.users().update(copy);
        uow.commit().await.unwrap();

        let dispatched = sub.drain_ready();
        let types: Vec<&str> = dispatched.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["identity.user.created", "identity.user.logged_in"]);

        let ids: std::collections::HashSet<_> = dispatched.iter().map(|e| e.event_id()).collect();
        assert_eq!(ids.len(), dispatched.len());
    }

    #[tokio::test]
    async fn retracking_a_vehicle_clone_dispatches_each_event_once() {
        let fx = Fixture::new();
        let sub = fx.subscribe();

        let vehicle =
            Vehicle::link(TeslaAccountId::new("tesla-9").unwrap(), "VIN1", None).unwrap();
        let mut copy = vehicle.clone();
        copy.deactivate().unwrap();

        let mut uow = fx.uow();
        uow.vehicles().add(vehicle);
        uow.vehicles().update(copy);
        assert_eq!(uow.commit().await.unwrap(), 1);

        let types: Vec<String> = sub
            .drain_ready()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(types, vec!["fleet.vehicle.linked"]);
    }

    #[tokio::test]
    async fn vehicle_lookups_go_through_the_store() {
        let fx = Fixture::new();
        let account = TeslaAccountId::new("tesla-9").unwrap();
        let vehicle = Vehicle::link(account.clone(), "VIN1", Some("My Car".to_string())).unwrap();
        let id = *vehicle.id();

        let mut uow = fx.uow();
        uow.vehicles().add(vehicle);
        uow.commit().await.unwrap();

        let mut uow = fx.uow();
        let found = uow
            .vehicles()
            .get_by_vehicle_identifier(&account, " VIN1 ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*found.id(), id);

        let mut loaded = uow.vehicles().get_by_id(id).await.unwrap().unwrap();
        loaded.deactivate().unwrap();
        uow.vehicles().update(loaded);
        uow.commit().await.unwrap();

        let owned = fx
            .uow()
            .vehicles()
            .get_by_owner_account_id(&account)
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert!(!owned[0].is_active());
    }
}
