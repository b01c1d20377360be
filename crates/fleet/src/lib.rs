//! Linked-vehicle domain module.
//!
//! Pure domain logic for vehicles linked from a third-party telemetry account.

pub mod vehicle;

pub use vehicle::{Vehicle, VehicleEvent, VehicleLinked, VehicleParts};
