//! In-process transport used for demos, benches and tests

use crate::connection::{Connection, ConnectionState};
use crate::errors::TransportError;
use crate::events::{ConnectionEvent, EventKind, EventListeners, Listener, ListenerId};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Options for a [`MemoryConnection`]
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Free-form label, e.g. the database the connection stands in for
    pub label: String,
}

impl MemoryOptions {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Connection without a real socket behind it
///
/// Behaves like a network connection from the pool's point of view: `end`
/// emits an end event once, `destroy` tears down silently, and faults can be
/// injected with [`simulate_error`](Self::simulate_error) and
/// [`simulate_remote_end`](Self::simulate_remote_end).
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{
///     Connection, ConnectionState, MemoryConnection, MemoryOptions, TransportError,
/// };
///
/// let conn = MemoryConnection::create(MemoryOptions::new("orders"));
/// conn.simulate_error(TransportError::fatal("ECONNRESET", "connection reset by peer"));
///
/// assert_eq!(conn.state(), ConnectionState::Ended);
/// ```
pub struct MemoryConnection {
    options: MemoryOptions,
    state: Mutex<ConnectionState>,
    listeners: EventListeners,
    end_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
}

impl MemoryConnection {
    pub fn options(&self) -> &MemoryOptions {
        &self.options
    }

    /// Report a transport error; a fatal error also ends the connection
    pub fn simulate_error(&self, error: TransportError) {
        let fatal = error.is_fatal();
        self.listeners.emit(&ConnectionEvent::Error(error));

        if fatal && self.transition(ConnectionState::Ended) {
            self.listeners.emit(&ConnectionEvent::End);
        }
    }

    /// The remote side closed the connection
    pub fn simulate_remote_end(&self) {
        if self.transition(ConnectionState::Ended) {
            self.listeners.emit(&ConnectionEvent::End);
        }
    }

    /// Emit an event regardless of the current state
    pub fn emit(&self, event: &ConnectionEvent) -> usize {
        self.listeners.emit(event)
    }

    /// Number of times `end` was called
    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::Relaxed)
    }

    /// Number of times `destroy` was called
    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::Relaxed)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // Only a connected transport can move to a terminal state.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }
}

impl Connection for MemoryConnection {
    type Options = MemoryOptions;

    fn create(options: MemoryOptions) -> Self {
        Self {
            options,
            state: Mutex::new(ConnectionState::Connected),
            listeners: EventListeners::new(),
            end_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
        }
    }

    fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.listeners.subscribe(kind, listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn end(&self) {
        self.end_calls.fetch_add(1, Ordering::Relaxed);
        if self.transition(ConnectionState::Ended) {
            self.listeners.emit(&ConnectionEvent::End);
        }
    }

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::Relaxed);
        self.transition(ConnectionState::Destroyed);
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}
