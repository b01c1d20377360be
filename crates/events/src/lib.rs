//! Domain event model and dispatch mechanics.
//!
//! Aggregates raise typed events; the persistence edge wraps them in
//! [`EventEnvelope`]s and hands them to an [`EventBus`] once the state change is
//! durable.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::{Event, EventMetadata};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
