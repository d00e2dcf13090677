//! Transport connection capability surface

use crate::events::{EventKind, Listener, ListenerId};

/// Terminal state tracking for a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open and usable
    Connected,

    /// Gracefully ended, or ended by the remote side
    Ended,

    /// Torn down immediately
    Destroyed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionState::Connected)
    }
}

/// A transport connection that can be leased from a pool
///
/// Implementations must emit [`ConnectionEvent::End`](crate::ConnectionEvent::End)
/// when the connection stops carrying traffic and
/// [`ConnectionEvent::Error`](crate::ConnectionEvent::Error) for transport
/// failures. [`EventListeners`](crate::EventListeners) covers the
/// subscription bookkeeping.
pub trait Connection: Send + Sync + 'static {
    /// Options the connection is built from
    type Options: Clone + Send + Sync;

    /// Build a connection from its options
    fn create(options: Self::Options) -> Self
    where
        Self: Sized;

    /// Register a lifecycle listener
    fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerId;

    /// Remove a listener. Removing an unknown id is a no-op returning false.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Close gracefully
    fn end(&self);

    /// Close immediately without a graceful shutdown
    fn destroy(&self);

    fn state(&self) -> ConnectionState;
}
