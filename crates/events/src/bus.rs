//! Event dispatch abstraction (mechanics only).
//!
//! The unit of work hands drained domain events to an [`EventBus`] **after** the
//! state change that raised them has been written. Each successful save dispatches
//! each event once; a failed save dispatches nothing.
//!
//! The bus makes no persistence promises: events are not stored by this layer, and a
//! subscriber that is not listening when an event is published never sees it.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to everything published on a bus from the moment it was created.
///
/// Subscriptions are designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Collect every message already delivered, without blocking.
    pub fn drain_ready(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Event dispatcher capability (pub/sub).
///
/// `publish()` can fail; the caller decides what a failed publication means. The
/// unit of work reports it without undoing the already-committed write.
///
/// Implementations must be `Send + Sync` so one bus can be shared by every
/// request-scoped unit of work in the process.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
