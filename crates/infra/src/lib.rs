//! Infrastructure layer: configuration, token encryption, storage and the unit of work.
//!
//! Domain crates stay free of IO; this crate maps aggregates to persisted records,
//! encrypts tokens at that boundary and dispatches domain events once a write is
//! durable.

pub mod config;
pub mod crypto;
pub mod persistence;
pub mod repository;
pub mod unit_of_work;

pub use config::{AppConfig, ConfigError, DatabaseConfig, EncryptionConfig, Environment};
pub use crypto::{CryptoError, TokenCipher};
pub use persistence::{InMemoryStore, PersistenceError, PostgresStore, Store};
pub use repository::{UserRepository, VehicleRepository};
pub use unit_of_work::{DispatchedEvent, UnitOfWork, UnitOfWorkError};
