use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;
use uuid::Uuid;

use super::{
    Change, PersistenceError, Store, UserKey, UserRecord, VehicleKey, VehicleRecord,
};

#[derive(Debug, Default, Clone)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    vehicles: HashMap<Uuid, VehicleRecord>,
}

impl State {
    fn apply(&mut self, change: Change) -> Result<(), PersistenceError> {
        match change {
            Change::InsertUser(user) => {
                if self.users.contains_key(&user.id) {
                    return Err(PersistenceError::UniqueViolation(format!(
                        "users.id {}",
                        user.id
                    )));
                }
                self.check_user_unique(&user)?;
                self.users.insert(user.id, user);
            }
            Change::UpdateUser(user) => {
                if !self.users.contains_key(&user.id) {
                    return Err(PersistenceError::RowMissing {
                        table: "users",
                        id: user.id,
                    });
                }
                self.check_user_unique(&user)?;
                self.users.insert(user.id, user);
            }
            Change::InsertVehicle(vehicle) => {
                if self.vehicles.contains_key(&vehicle.id) {
                    return Err(PersistenceError::UniqueViolation(format!(
                        "vehicles.id {}",
                        vehicle.id
                    )));
                }
                self.check_vehicle_unique(&vehicle)?;
                self.vehicles.insert(vehicle.id, vehicle);
            }
            Change::UpdateVehicle(vehicle) => {
                if !self.vehicles.contains_key(&vehicle.id) {
                    return Err(PersistenceError::RowMissing {
                        table: "vehicles",
                        id: vehicle.id,
                    });
                }
                self.check_vehicle_unique(&vehicle)?;
                self.vehicles.insert(vehicle.id, vehicle);
            }
        }
        Ok(())
    }

    fn check_user_unique(&self, user: &UserRecord) -> Result<(), PersistenceError> {
        for other in self.users.values().filter(|u| u.id != user.id) {
            if other.external_id == user.external_id {
                return Err(PersistenceError::UniqueViolation(format!(
                    "users.external_id {}",
                    user.external_id
                )));
            }
            if other.email == user.email {
                return Err(PersistenceError::UniqueViolation("users.email".to_string()));
            }
        }
        Ok(())
    }

    fn check_vehicle_unique(&self, vehicle: &VehicleRecord) -> Result<(), PersistenceError> {
        if !vehicle.is_active {
            return Ok(());
        }
        let clash = self.vehicles.values().any(|v| {
            v.id != vehicle.id
                && v.is_active
                && v.tesla_account_id == vehicle.tesla_account_id
                && v.vehicle_identifier == vehicle.vehicle_identifier
        });
        if clash {
            return Err(PersistenceError::UniqueViolation(format!(
                "active vehicle {} for account {}",
                vehicle.vehicle_identifier, vehicle.tesla_account_id
            )));
        }
        Ok(())
    }
}

/// In-memory store.
///
/// Intended for tests/dev. Enforces the same uniqueness rules as the Postgres schema.
/// A batch is applied to a scratch copy and swapped in only when every change
/// succeeded, so a failed `apply` leaves the stored state untouched.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.state.read().map(|s| s.users.len()).unwrap_or(0)
    }

    pub fn vehicle_count(&self) -> usize {
        self.state.read().map(|s| s.vehicles.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, PersistenceError> {
        self.state
            .read()
            .map_err(|_| PersistenceError::Database("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn find_user(&self, key: UserKey<'_>) -> Result<Option<UserRecord>, PersistenceError> {
        let state = self.read()?;
        let found = match key {
            UserKey::Id(id) => state.users.get(&id),
            UserKey::ExternalId(external_id) => {
                state.users.values().find(|u| u.external_id == external_id)
            }
            UserKey::Email(email) => state.users.values().find(|u| u.email == email),
        };
        Ok(found.cloned())
    }

    async fn find_vehicle(
        &self,
        key: VehicleKey<'_>,
    ) -> Result<Option<VehicleRecord>, PersistenceError> {
        let state = self.read()?;
        let found = match key {
            VehicleKey::Id(id) => state.vehicles.get(&id),
            VehicleKey::Identifier {
                tesla_account_id,
                vehicle_identifier,
            } => state
                .vehicles
                .values()
                .filter(|v| {
                    v.tesla_account_id == tesla_account_id
                        && v.vehicle_identifier == vehicle_identifier
                })
                .max_by_key(|v| (v.is_active, v.linked_at)),
        };
        Ok(found.cloned())
    }

    async fn list_vehicles(
        &self,
        tesla_account_id: &str,
    ) -> Result<Vec<VehicleRecord>, PersistenceError> {
        let state = self.read()?;
        let mut vehicles: Vec<VehicleRecord> = state
            .vehicles
            .values()
            .filter(|v| v.tesla_account_id == tesla_account_id)
            .cloned()
            .collect();
        vehicles.sort_by_key(|v| (v.linked_at, v.id));
        Ok(vehicles)
    }

    async fn apply(&self, changes: Vec<Change>) -> Result<usize, PersistenceError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| PersistenceError::Database("lock poisoned".to_string()))?;

        let count = changes.len();
        let mut scratch = state.clone();
        for change in changes {
            let kind = change.kind();
            scratch
                .apply(change)
                .inspect_err(|e| debug!(change = kind, error = %e, "change rejected"))?;
        }
        *state = scratch;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(external_id: &str, email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::now_v7(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            display_name: None,
            created_at: Utc::now(),
            last_login_at: None,
            linked_account: None,
        }
    }

    fn vehicle(account: &str, identifier: &str, active: bool) -> VehicleRecord {
        VehicleRecord {
            id: Uuid::now_v7(),
            tesla_account_id: account.to_string(),
            vehicle_identifier: identifier.to_string(),
            display_name: None,
            linked_at: Utc::now(),
            last_synced_at: None,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_every_key() {
        let store = InMemoryStore::new();
        let alice = user("ext-1", "a@x.com");
        assert_eq!(
            store.apply(vec![Change::InsertUser(alice.clone())]).await.unwrap(),
            1
        );

        for key in [
            UserKey::Id(alice.id),
            UserKey::ExternalId("ext-1"),
            UserKey::Email("a@x.com"),
        ] {
            assert_eq!(store.find_user(key).await.unwrap(), Some(alice.clone()));
        }
        assert_eq!(store.find_user(UserKey::Email("b@x.com")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_email_rejects_whole_batch() {
        let store = InMemoryStore::new();
        store
            .apply(vec![Change::InsertUser(user("ext-1", "a@x.com"))])
            .await
            .unwrap();

        let bob = user("ext-2", "b@x.com");
        let err = store
            .apply(vec![
                Change::InsertUser(bob.clone()),
                Change::InsertUser(user("ext-3", "a@x.com")),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::UniqueViolation(_)));
        // The valid first change was not kept either.
        assert_eq!(store.find_user(UserKey::Id(bob.id)).await.unwrap(), None);
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn change_kind_names_the_write() {
        let record = vehicle("tesla-9", "VIN1", true);
        assert_eq!(Change::InsertVehicle(record.clone()).kind(), "insert_vehicle");
        assert_eq!(Change::UpdateVehicle(record).kind(), "update_vehicle");
        assert_eq!(Change::UpdateUser(user("ext-1", "a@x.com")).kind(), "update_user");
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = InMemoryStore::new();
        let ghost = user("ext-1", "a@x.com");
        let err = store
            .apply(vec![Change::UpdateUser(ghost.clone())])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PersistenceError::RowMissing {
                table: "users",
                id: ghost.id
            }
        );
    }

    #[tokio::test]
    async fn only_one_active_vehicle_per_identifier() {
        let store = InMemoryStore::new();
        let first = vehicle("tesla-9", "VIN1", true);
        store
            .apply(vec![Change::InsertVehicle(first.clone())])
            .await
            .unwrap();

        let err = store
            .apply(vec![Change::InsertVehicle(vehicle("tesla-9", "VIN1", true))])
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::UniqueViolation(_)));

        // Same identifier under another account is fine.
        store
            .apply(vec![Change::InsertVehicle(vehicle("tesla-1", "VIN1", true))])
            .await
            .unwrap();

        // Deactivate, then a re-link may reuse the identifier.
        let mut inactive = first.clone();
        inactive.is_active = false;
        let mut relinked = vehicle("tesla-9", "VIN1", true);
        relinked.linked_at = first.linked_at + Duration::seconds(5);
        store
            .apply(vec![
                Change::UpdateVehicle(inactive),
                Change::InsertVehicle(relinked.clone()),
            ])
            .await
            .unwrap();

        let found = store
            .find_vehicle(VehicleKey::Identifier {
                tesla_account_id: "tesla-9",
                vehicle_identifier: "VIN1",
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, relinked.id);
    }

    #[tokio::test]
    async fn identifier_lookup_falls_back_to_latest_inactive() {
        let store = InMemoryStore::new();
        let mut old = vehicle("tesla-9", "VIN1", false);
        old.linked_at = Utc::now() - Duration::days(2);
        let newer = vehicle("tesla-9", "VIN1", false);
        store
            .apply(vec![
                Change::InsertVehicle(old),
                Change::InsertVehicle(newer.clone()),
            ])
            .await
            .unwrap();

        let found = store
            .find_vehicle(VehicleKey::Identifier {
                tesla_account_id: "tesla-9",
                vehicle_identifier: "VIN1",
            })
            .await
            .unwrap();
        assert_eq!(found.map(|v| v.id), Some(newer.id));
    }

    #[tokio::test]
    async fn list_is_scoped_to_account_and_ordered() {
        let store = InMemoryStore::new();
        let mut a = vehicle("tesla-9", "VIN-A", true);
        a.linked_at = Utc::now() - Duration::hours(1);
        let b = vehicle("tesla-9", "VIN-B", false);
        let other = vehicle("tesla-1", "VIN-C", true);
        store
            .apply(vec![
                Change::InsertVehicle(b.clone()),
                Change::InsertVehicle(other),
                Change::InsertVehicle(a.clone()),
            ])
            .await
            .unwrap();

        let listed: Vec<Uuid> = store
            .list_vehicles("tesla-9")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(listed, vec![a.id, b.id]);
        assert_eq!(store.vehicle_count(), 3);
    }
}
