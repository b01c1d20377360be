//! Row shapes and the aggregate <-> row mapping.
//!
//! This is the only place tokens cross the encryption boundary: `from_user` encrypts,
//! `into_user` decrypts. Records hold ciphertext exclusively.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use vehiclelink_core::{Email, Entity, ExternalId, TeslaAccountId, UserId, VehicleId};
use vehiclelink_fleet::{Vehicle, VehicleParts};
use vehiclelink_identity::{LinkedAccount, LinkedAccountParts, User, UserParts};

use super::PersistenceError;
use crate::crypto::TokenCipher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub linked_account: Option<LinkedAccountRecord>,
}

/// The linked-account row. Token columns are `base64(IV || ciphertext)` or `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccountRecord {
    pub tesla_account_id: String,
    pub linked_at: DateTime<Utc>,
    pub is_active: bool,
    pub access_token_enc: Option<String>,
    pub refresh_token_enc: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    pub id: Uuid,
    pub tesla_account_id: String,
    pub vehicle_identifier: String,
    pub display_name: Option<String>,
    pub linked_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> PersistenceError {
    PersistenceError::Corrupt(format!("{what}: {err}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

impl UserRecord {
    pub fn from_user(user: &User, cipher: &TokenCipher) -> Result<Self, PersistenceError> {
        let linked_account = user
            .linked_account()
            .map(|acc| LinkedAccountRecord::from_account(acc, cipher))
            .transpose()?;

        Ok(Self {
            id: *user.id().as_uuid(),
            external_id: user.external_id().as_str().to_string(),
            email: user.email().as_str().to_string(),
            display_name: user.display_name().map(str::to_string),
            created_at: user.created_at(),
            last_login_at: user.last_login_at(),
            linked_account,
        })
    }

    pub fn into_user(self, cipher: &TokenCipher) -> Result<User, PersistenceError> {
        let external_id =
            ExternalId::new(&self.external_id).map_err(|e| corrupt("users.external_id", e))?;
        let email = Email::new(&self.email).map_err(|e| corrupt("users.email", e))?;
        let linked_account = self
            .linked_account
            .map(|acc| acc.into_account(cipher))
            .transpose()?;

        Ok(User::from_persisted(UserParts {
            id: UserId::from_uuid(self.id),
            external_id,
            email,
            display_name: self.display_name,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
            linked_account,
        }))
    }
}

impl LinkedAccountRecord {
    fn from_account(acc: &LinkedAccount, cipher: &TokenCipher) -> Result<Self, PersistenceError> {
        Ok(Self {
            tesla_account_id: acc.account_id().as_str().to_string(),
            linked_at: acc.linked_at(),
            is_active: acc.is_active(),
            access_token_enc: cipher.encrypt(acc.access_token())?,
            refresh_token_enc: cipher.encrypt(acc.refresh_token())?,
            token_expires_at: acc.token_expires_at(),
            last_synced_at: acc.last_synced_at(),
        })
    }

    fn into_account(self, cipher: &TokenCipher) -> Result<LinkedAccount, PersistenceError> {
        let account_id = TeslaAccountId::new(&self.tesla_account_id)
            .map_err(|e| corrupt("linked_accounts.tesla_account_id", e))?;

        Ok(LinkedAccount::from_persisted(LinkedAccountParts {
            account_id,
            linked_at: self.linked_at,
            is_active: self.is_active,
            access_token: cipher.decrypt(self.access_token_enc.as_deref())?,
            refresh_token: cipher.decrypt(self.refresh_token_enc.as_deref())?,
            token_expires_at: self.token_expires_at,
            last_synced_at: self.last_synced_at,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vehicle
// ─────────────────────────────────────────────────────────────────────────────

impl VehicleRecord {
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        Self {
            id: *vehicle.id().as_uuid(),
            tesla_account_id: vehicle.tesla_account_id().as_str().to_string(),
            vehicle_identifier: vehicle.vehicle_identifier().to_string(),
            display_name: vehicle.display_name().map(str::to_string),
            linked_at: vehicle.linked_at(),
            last_synced_at: vehicle.last_synced_at(),
            is_active: vehicle.is_active(),
        }
    }

    pub fn into_vehicle(self) -> Result<Vehicle, PersistenceError> {
        let tesla_account_id = TeslaAccountId::new(&self.tesla_account_id)
            .map_err(|e| corrupt("vehicles.tesla_account_id", e))?;
        if self.vehicle_identifier.trim().is_empty() {
            return Err(corrupt("vehicles.vehicle_identifier", "empty"));
        }

        Ok(Vehicle::from_persisted(VehicleParts {
            id: VehicleId::from_uuid(self.id),
            tesla_account_id,
            vehicle_identifier: self.vehicle_identifier,
            display_name: self.display_name,
            linked_at: self.linked_at,
            last_synced_at: self.last_synced_at,
            is_active: self.is_active,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionConfig;
    use crate::crypto::CryptoError;
    use chrono::Duration;
    use vehiclelink_core::EventSource;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&EncryptionConfig::new("records-test-secret")).unwrap()
    }

    fn linked_user() -> User {
        let mut user = User::create(
            ExternalId::new("ext-1").unwrap(),
            Email::new("a@x.com").unwrap(),
            Some("Alice".to_string()),
        );
        user.link_account(TeslaAccountId::new("tesla-9").unwrap())
            .unwrap();
        user.update_account_tokens("AT1", "RT1", Utc::now() + Duration::seconds(3600))
            .unwrap();
        user
    }

    #[test]
    fn user_record_holds_ciphertext_only() {
        let c = cipher();
        let record = UserRecord::from_user(&linked_user(), &c).unwrap();

        let acc = record.linked_account.as_ref().unwrap();
        let access = acc.access_token_enc.as_deref().unwrap();
        let refresh = acc.refresh_token_enc.as_deref().unwrap();
        assert_ne!(access, "AT1");
        assert_ne!(refresh, "RT1");
        assert_eq!(c.decrypt_str(access).unwrap(), "AT1");
        assert_eq!(c.decrypt_str(refresh).unwrap(), "RT1");
    }

    #[test]
    fn user_survives_mapping() {
        let c = cipher();
        let original = linked_user();

        let restored = UserRecord::from_user(&original, &c)
            .unwrap()
            .into_user(&c)
            .unwrap();

        assert_eq!(restored.id(), original.id());
        assert_eq!(restored.email().as_str(), "a@x.com");
        assert_eq!(restored.display_name(), Some("Alice"));
        let acc = restored.active_account().unwrap();
        assert_eq!(acc.access_token(), Some("AT1"));
        assert_eq!(acc.refresh_token(), Some("RT1"));
        assert_eq!(
            acc.token_expires_at(),
            original.linked_account().unwrap().token_expires_at()
        );
        // Rehydration raises nothing.
        assert!(!restored.has_pending_events());
    }

    #[test]
    fn absent_tokens_stay_absent() {
        let c = cipher();
        let mut user = User::create(
            ExternalId::new("ext-2").unwrap(),
            Email::new("b@x.com").unwrap(),
            None,
        );
        user.link_account(TeslaAccountId::new("tesla-1").unwrap())
            .unwrap();

        let record = UserRecord::from_user(&user, &c).unwrap();
        let acc = record.linked_account.as_ref().unwrap();
        assert!(acc.access_token_enc.is_none());
        assert!(acc.refresh_token_enc.is_none());

        let restored = record.into_user(&c).unwrap();
        assert!(restored.linked_account().unwrap().access_token().is_none());
    }

    #[test]
    fn wrong_key_or_bad_rows_fail() {
        let record = UserRecord::from_user(&linked_user(), &cipher()).unwrap();

        let other = TokenCipher::new(&EncryptionConfig::new("different")).unwrap();
        match record.clone().into_user(&other) {
            Err(PersistenceError::Crypto(CryptoError::Decrypt | CryptoError::Utf8)) => {}
            Ok(user) => assert_ne!(
                user.linked_account().unwrap().access_token(),
                Some("AT1")
            ),
            Err(other) => panic!("unexpected error: {other:?}"),
        }

        let mut broken = record;
        broken.email = "not-an-email".to_string();
        assert!(matches!(
            broken.into_user(&cipher()),
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[test]
    fn vehicle_survives_mapping() {
        let mut vehicle = Vehicle::link(
            TeslaAccountId::new("tesla-9").unwrap(),
            "VIN1",
            Some("My Car".to_string()),
        )
        .unwrap();
        vehicle.deactivate().unwrap();

        let record = VehicleRecord::from_vehicle(&vehicle);
        assert!(!record.is_active);

        let restored = record.into_vehicle().unwrap();
        assert_eq!(restored.id(), vehicle.id());
        assert_eq!(restored.vehicle_identifier(), "VIN1");
        assert_eq!(restored.display_name(), Some("My Car"));
        assert!(!restored.is_active());
        assert!(!restored.has_pending_events());
    }
}
