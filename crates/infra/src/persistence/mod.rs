//! Persisted shapes of the aggregates and the storage capability behind them.
//!
//! Aggregates never touch storage directly: the unit of work maps them to records
//! (encrypting tokens on the way), and a [`Store`] writes a batch of [`Change`]s
//! atomically. Reads go the other way and decrypt.

pub mod in_memory;
pub mod postgres;
pub mod records;

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{LinkedAccountRecord, UserRecord, VehicleRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// A uniqueness constraint rejected the write (duplicate email, active vehicle, ...).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// An update targeted a row that does not exist.
    #[error("{table} row {id} does not exist")]
    RowMissing { table: &'static str, id: Uuid },

    /// A stored row could not be turned back into an aggregate.
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Lookup key for a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKey<'a> {
    Id(Uuid),
    ExternalId(&'a str),
    Email(&'a str),
}

/// Lookup key for a vehicle row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKey<'a> {
    Id(Uuid),
    /// Resolves to the active vehicle when one exists, else the most recently linked one.
    Identifier {
        tesla_account_id: &'a str,
        vehicle_identifier: &'a str,
    },
}

/// One write in a commit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    InsertUser(UserRecord),
    UpdateUser(UserRecord),
    InsertVehicle(VehicleRecord),
    UpdateVehicle(VehicleRecord),
}

impl Change {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::InsertUser(_) => "insert_user",
            Change::UpdateUser(_) => "update_user",
            Change::InsertVehicle(_) => "insert_vehicle",
            Change::UpdateVehicle(_) => "update_vehicle",
        }
    }
}

/// Storage backend.
///
/// `apply` is all-or-nothing: either every change in the batch is written or none is.
/// Lookups return `Ok(None)` for a missing row.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, key: UserKey<'_>) -> Result<Option<UserRecord>, PersistenceError>;

    async fn find_vehicle(
        &self,
        key: VehicleKey<'_>,
    ) -> Result<Option<VehicleRecord>, PersistenceError>;

    /// Every vehicle (active or not) linked to the account, oldest link first.
    async fn list_vehicles(
        &self,
        tesla_account_id: &str,
    ) -> Result<Vec<VehicleRecord>, PersistenceError>;

    /// Write the batch atomically; returns the number of changes written.
    async fn apply(&self, changes: Vec<Change>) -> Result<usize, PersistenceError>;
}

#[async_trait::async_trait]
impl<S> Store for std::sync::Arc<S>
where
    S: Store + ?Sized,
{
    async fn find_user(&self, key: UserKey<'_>) -> Result<Option<UserRecord>, PersistenceError> {
        (**self).find_user(key).await
    }

    async fn find_vehicle(
        &self,
        key: VehicleKey<'_>,
    ) -> Result<Option<VehicleRecord>, PersistenceError> {
        (**self).find_vehicle(key).await
    }

    async fn list_vehicles(
        &self,
        tesla_account_id: &str,
    ) -> Result<Vec<VehicleRecord>, PersistenceError> {
        (**self).list_vehicles(tesla_account_id).await
    }

    async fn apply(&self, changes: Vec<Change>) -> Result<usize, PersistenceError> {
        (**self).apply(changes).await
    }
}
