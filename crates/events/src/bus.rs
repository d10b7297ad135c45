//! Fan-out of committed warehouse events.
//!
//! Once the dispatcher has appended to the store it hands each envelope to
//! the bus, which copies it to every live subscriber (slot dashboards,
//! notification workers). Nothing published here is retained; a subscriber
//! that joins late replays from the store instead.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end handed out by [`EventBus::subscribe`].
///
/// Sees every message published after it was created, in publish order.
#[derive(Debug)]
pub struct Subscription<M> {
    inbox: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(inbox: Receiver<M>) -> Self {
        Self { inbox }
    }

    pub fn recv(&self) -> Result<M, RecvError> {
        self.inbox.recv()
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.inbox.try_recv()
    }

    pub fn recv_timeout(&self, wait: Duration) -> Result<M, RecvTimeoutError> {
        self.inbox.recv_timeout(wait)
    }

    /// Drains whatever is already queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.inbox.try_iter().collect()
    }
}

/// Publisher side of the pipeline.
///
/// A failed `publish` never undoes the append that preceded it; the caller
/// logs and moves on.
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
        B::publish(self, message)
    }

    fn subscribe(&self) -> Subscription<M> {
        B::subscribe(self)
    }
}
