//! Event-raising capability for state-based aggregates.
//!
//! Aggregates here are persisted as current state, not as event streams. Mutating
//! methods record what happened by raising events into an in-memory buffer; the unit
//! of work drains that buffer once the state change has been written.

/// Ordered, in-memory buffer of events raised by one aggregate instance.
///
/// Order reflects the causal order of the mutating calls that raised them. No
/// ordering is implied across different aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuffer<E> {
    events: Vec<E>,
}

impl<E> EventBuffer<E> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an event.
    pub fn raise(&mut self, event: E) {
        self.events.push(event);
    }

    /// Return every queued event (oldest first) and leave the buffer empty.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    /// Drop every queued event without returning them.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Queued events, oldest first, without draining.
    pub fn pending(&self) -> &[E] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability exposed by every aggregate that raises domain events.
///
/// Implementors only provide access to their [`EventBuffer`]; the rest is shared.
pub trait EventSource {
    type Event: Clone + core::fmt::Debug;

    fn event_buffer(&self) -> &EventBuffer<Self::Event>;

    fn event_buffer_mut(&mut self) -> &mut EventBuffer<Self::Event>;

    fn raise(&mut self, event: Self::Event) {
        self.event_buffer_mut().raise(event);
    }

    fn drain_events(&mut self) -> Vec<Self::Event> {
        self.event_buffer_mut().drain()
    }

    fn clear_events(&mut self) {
        self.event_buffer_mut().clear();
    }

    fn pending_events(&self) -> &[Self::Event] {
        self.event_buffer().pending()
    }

    fn has_pending_events(&self) -> bool {
        !self.event_buffer().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
        events: EventBuffer<u32>,
    }

    impl Counter {
        fn bump(&mut self) {
            self.value += 1;
            let value = self.value;
            self.raise(value);
        }
    }

    impl EventSource for Counter {
        type Event = u32;

        fn event_buffer(&self) -> &EventBuffer<u32> {
            &self.events
        }

        fn event_buffer_mut(&mut self) -> &mut EventBuffer<u32> {
            &mut self.events
        }
    }

    #[test]
    fn drain_returns_events_in_raise_order_then_empties() {
        let mut counter = Counter::default();
        counter.bump();
        counter.bump();
        counter.bump();

        assert_eq!(counter.pending_events(), &[1, 2, 3]);
        assert_eq!(counter.drain_events(), vec![1, 2, 3]);
        assert!(counter.drain_events().is_empty());
        assert!(!counter.has_pending_events());
    }

    #[test]
    fn drain_only_returns_events_since_last_drain() {
        let mut counter = Counter::default();
        counter.bump();
        let _ = counter.drain_events();

        counter.bump();
        assert_eq!(counter.drain_events(), vec![2]);
    }

    #[test]
    fn clear_drops_events() {
        let mut counter = Counter::default();
        counter.bump();
        counter.clear_events();
        assert!(counter.drain_events().is_empty());
        assert_eq!(counter.value, 1);
    }
}
