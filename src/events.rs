//! Lifecycle events emitted by transport connections

use crate::errors::TransportError;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event emitted by a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection ended and will not carry further traffic
    End,

    /// The transport reported an error
    Error(TransportError),
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::End => EventKind::End,
            ConnectionEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Kind of event a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    End,
    Error,
}

/// Identifier returned by a subscription, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked for a connection event
pub type Listener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Listener registry for connection implementations
///
/// Listeners are invoked from a snapshot taken at emit time, so a listener
/// may unsubscribe itself or cause further events without deadlocking.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{ConnectionEvent, EventKind, EventListeners};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let listeners = EventListeners::new();
/// let ends = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&ends);
///
/// let id = listeners.subscribe(EventKind::End, Arc::new(move |_: &ConnectionEvent| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// }));
///
/// assert_eq!(listeners.emit(&ConnectionEvent::End), 1);
/// assert!(listeners.unsubscribe(id));
/// assert_eq!(listeners.emit(&ConnectionEvent::End), 0);
/// assert_eq!(ends.load(Ordering::Relaxed), 1);
/// ```
#[derive(Default)]
pub struct EventListeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, EventKind, Listener)>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one kind of event
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, kind, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _, _)| *entry_id != id);
        entries.len() != before
    }

    /// Deliver an event to every matching listener, returning how many ran
    pub fn emit(&self, event: &ConnectionEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry_kind, _)| *entry_kind == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
