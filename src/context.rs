//! Error correlation groups for pooled connections

use crate::errors::TransportError;

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

const CONTEXT_CHANNEL_CAPACITY: usize = 64;

/// Error reported into an [`ExecutionContext`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextError {
    /// Id of the handle the error occurred on
    pub connection_id: u64,

    /// The handle's consumer-assigned context label at the time of the error
    pub label: String,

    pub error: TransportError,
}

/// Group that collects errors from every connection of a pool
///
/// A pool configured with a context hands it to each connection it creates,
/// so errors surface through the pool's context instead of wherever the
/// connection happened to be created.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{ExecutionContext, TransportError};
///
/// let context = ExecutionContext::new("checkout-service");
/// let mut errors = context.subscribe();
///
/// let error = TransportError::recoverable("ER_QUERY_INTERRUPTED", "interrupted");
/// context.report(7, "nightly report", error);
///
/// let reported = errors.try_recv().unwrap();
/// assert_eq!(reported.connection_id, 7);
/// assert_eq!(context.reported_count(), 1);
/// ```
#[derive(Debug)]
pub struct ExecutionContext {
    name: String,
    sender: broadcast::Sender<ContextError>,
    reported: AtomicUsize,
}

impl ExecutionContext {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(CONTEXT_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            sender,
            reported: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive every error reported after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ContextError> {
        self.sender.subscribe()
    }

    /// Record an error for a connection in this context
    pub fn report(&self, connection_id: u64, label: impl Into<String>, error: TransportError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        let entry = ContextError {
            connection_id,
            label: label.into(),
            error,
        };
        if self.sender.send(entry).is_err() {
            debug!(context = %self.name, connection_id, "No subscribers for context error");
        }
    }

    /// Total number of errors reported, observed or not
    pub fn reported_count(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}
