//! `vehiclelink-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the identity and event-buffer capabilities aggregates compose,
//! and the domain error model.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{EventBuffer, EventSource};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{Email, ExternalId, TeslaAccountId, UserId, VehicleId};
pub use value_object::ValueObject;
