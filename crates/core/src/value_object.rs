//! Value object trait: equality by value, not identity.

use crate::id::{Email, ExternalId, TeslaAccountId, UserId, VehicleId};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two instances holding the
/// same attributes are interchangeable. To "modify" one, construct a new one; the
/// constructor is where format invariants are enforced.
///
/// - **Value Object**: `Email("a@x.com")` equals any other `Email("a@x.com")`
/// - **Entity**: `User { id: UserId(..), .. }` is the same user whatever its email
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

impl ValueObject for UserId {}
impl ValueObject for VehicleId {}
impl ValueObject for ExternalId {}
impl ValueObject for TeslaAccountId {}
impl ValueObject for Email {}
