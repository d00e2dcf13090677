//! Pooled connection handles and the pool surface they rely on

use crate::connection::Connection;
use crate::context::ExecutionContext;
use crate::errors::{PoolResult, TransportError};
use crate::events::{ConnectionEvent, EventKind, ListenerId};

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Borrow term of a connection nobody has classified
pub const DEFAULT_BORROW_TERM: &str = "unknown";

/// Borrow term for connections that are not expected to be released soon
pub const LONG_TERM: &str = "longterm";

const ERROR_CHANNEL_CAPACITY: usize = 16;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Result of returning a connection to its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The pool took the connection back into its free set
    Returned,

    /// Nothing happened: the handle is detached or the pool is closed
    NoOp,
}

/// What a pooled connection needs from the pool that owns it
pub trait Pool<C: Connection>: Send + Sync {
    /// Put a checked-out connection back into the free set
    fn release_connection(
        &self,
        connection: &Arc<PooledConnection<C>>,
    ) -> PoolResult<ReleaseOutcome>;

    /// Forget a connection for good. Must tolerate connections it does not track.
    fn purge_connection(&self, connection: &Arc<PooledConnection<C>>);

    fn is_closed(&self) -> bool;

    /// Context that errors of this pool's connections are reported to
    fn execution_context(&self) -> Option<Arc<ExecutionContext>> {
        None
    }
}

/// A connection leased from a pool
///
/// The handle returns itself with [`release`](Self::release) and detaches
/// from the pool when the connection ends, a fatal error occurs, or
/// [`destroy`](Self::destroy) is called. Detachment notifies the pool exactly
/// once; every later trigger is a no-op.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{ConnectionPool, MemoryConnection, PoolConfiguration, ReleaseOutcome};
///
/// let pool = ConnectionPool::<MemoryConnection>::new(PoolConfiguration::default());
///
/// let conn = pool.get_connection().unwrap();
/// conn.set_borrow_term("shortterm");
/// conn.set_context("Report for Finance");
///
/// assert_eq!(conn.release().unwrap(), ReleaseOutcome::Returned);
/// assert_eq!(pool.available_count(), 1);
/// ```
pub struct PooledConnection<C: Connection> {
    id: u64,
    connection: C,
    // None once detached.
    pool: Mutex<Option<Weak<dyn Pool<C>>>>,
    borrowed_at: Instant,
    borrow_term: RwLock<String>,
    context: RwLock<String>,
    execution_context: Option<Arc<ExecutionContext>>,
    errors: broadcast::Sender<TransportError>,
    listener_ids: [ListenerId; 2],
    terminated: AtomicBool,
}

impl<C: Connection> PooledConnection<C> {
    /// Build a connection from `options` and lease it from `pool`
    pub fn new<P>(pool: &Arc<P>, options: C::Options) -> Arc<Self>
    where
        P: Pool<C> + 'static,
    {
        let owner: Weak<P> = Arc::downgrade(pool);
        let owner: Weak<dyn Pool<C>> = owner;
        let execution_context = pool.execution_context();
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        let handle = Arc::new_cyclic(|this: &Weak<Self>| {
            let connection = C::create(options);

            let on_end = {
                let this = this.clone();
                connection.subscribe(
                    EventKind::End,
                    Arc::new(move |_: &ConnectionEvent| {
                        if let Some(handle) = this.upgrade() {
                            handle.on_end();
                        }
                    }),
                )
            };

            let on_error = {
                let this = this.clone();
                connection.subscribe(
                    EventKind::Error,
                    Arc::new(move |event: &ConnectionEvent| {
                        if let (Some(handle), ConnectionEvent::Error(error)) =
                            (this.upgrade(), event)
                        {
                            handle.on_error(error.clone());
                        }
                    }),
                )
            };

            Self {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                connection,
                pool: Mutex::new(Some(owner)),
                borrowed_at: Instant::now(),
                borrow_term: RwLock::new(DEFAULT_BORROW_TERM.to_string()),
                context: RwLock::new(String::new()),
                execution_context,
                errors,
                listener_ids: [on_end, on_error],
                terminated: AtomicBool::new(false),
            }
        });

        debug!(
            connection_id = handle.id,
            execution_context = handle.execution_context.as_ref().map(|ctx| ctx.name()),
            "Pooled connection created"
        );
        handle
    }

    /// Return the connection to its pool
    ///
    /// Safe to call any number of times. Returns [`ReleaseOutcome::NoOp`]
    /// when the handle is detached or the pool is closed; otherwise the
    /// pool's answer is passed through unchanged. Releasing does not detach.
    pub fn release(self: &Arc<Self>) -> PoolResult<ReleaseOutcome> {
        let Some(pool) = self.owner() else {
            return Ok(ReleaseOutcome::NoOp);
        };
        if pool.is_closed() {
            return Ok(ReleaseOutcome::NoOp);
        }

        debug!(connection_id = self.id, "Releasing connection to pool");
        pool.release_connection(self)
    }

    /// Return the connection to its pool
    ///
    /// This never closes the transport; use [`destroy`](Self::destroy) for that.
    #[deprecated(note = "use `release()` to return a pooled connection")]
    pub fn end(self: &Arc<Self>) -> PoolResult<ReleaseOutcome> {
        warn!(
            connection_id = self.id,
            "Calling end() to release a pooled connection is deprecated. \
             In a future version end() will close the connection. Use release() instead."
        );
        self.release()
    }

    /// Tear down the transport immediately and detach from the pool
    pub fn destroy(self: &Arc<Self>) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            debug!(connection_id = self.id, "Destroying connection");
            self.connection.destroy();
        }
        self.detach();
    }

    /// Gracefully end the transport unless it already ended or was destroyed
    ///
    /// Used by pools when they purge or close connections. Does not detach.
    pub fn close_transport(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            self.connection.end();
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The underlying transport
    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn borrowed_at(&self) -> Instant {
        self.borrowed_at
    }

    /// Time elapsed since the handle was created
    pub fn held_for(&self) -> Duration {
        self.borrowed_at.elapsed()
    }

    pub fn borrow_term(&self) -> String {
        self.borrow_term.read().clone()
    }

    /// Classify the borrow, e.g. [`LONG_TERM`]. Only used for reporting.
    pub fn set_borrow_term(&self, term: impl Into<String>) {
        *self.borrow_term.write() = term.into();
    }

    pub fn context(&self) -> String {
        self.context.read().clone()
    }

    /// Attach a free-form label such as "Report for Finance"
    pub fn set_context(&self, context: impl Into<String>) {
        *self.context.write() = context.into();
    }

    pub fn execution_context(&self) -> Option<&Arc<ExecutionContext>> {
        self.execution_context.as_ref()
    }

    /// Whether the handle has been removed from its pool
    ///
    /// Also true once the owning pool has been dropped; no purge notification
    /// is sent in that case because nobody is left to receive it.
    pub fn is_detached(&self) -> bool {
        self.pool.lock().is_none()
    }

    /// Whether the transport was ended or destroyed
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Receive the transport errors of this connection
    pub fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.errors.subscribe()
    }

    fn owner(&self) -> Option<Arc<dyn Pool<C>>> {
        let owner = self.pool.lock().clone()?;
        let pool = owner.upgrade();
        if pool.is_none() {
            *self.pool.lock() = None;
        }
        pool
    }

    fn on_end(self: &Arc<Self>) {
        self.terminated.store(true, Ordering::Release);
        self.detach();
    }

    fn on_error(self: &Arc<Self>, error: TransportError) {
        if error.is_fatal() {
            self.detach();
        }
        self.report_error(error);
    }

    fn report_error(&self, error: TransportError) {
        if let Some(execution_context) = &self.execution_context {
            execution_context.report(self.id, self.context(), error.clone());
        }

        let fatal = error.is_fatal();
        if let Err(broadcast::error::SendError(error)) = self.errors.send(error)
            && self.execution_context.is_none()
        {
            warn!(connection_id = self.id, fatal, error = %error, "Unobserved connection error");
        }
    }

    // The slot is cleared before the pool hears about it, so anything the
    // pool triggers from purge_connection finds the handle already detached.
    // No pool method runs while the slot lock is held.
    fn detach(self: &Arc<Self>) -> bool {
        let Some(pool) = self.owner() else {
            return false;
        };
        if pool.is_closed() {
            return false;
        }

        {
            let mut slot = self.pool.lock();
            // Only the first trigger still finds the slot set.
            if slot.is_none() {
                return false;
            }
            *slot = None;
        }

        debug!(connection_id = self.id, "Detaching connection from pool");
        pool.purge_connection(self);
        true
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        for id in self.listener_ids {
            self.connection.unsubscribe(id);
        }
    }
}

impl<C: Connection> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("borrow_term", &*self.borrow_term.read())
            .field("context", &*self.context.read())
            .field("detached", &self.is_detached())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::memory::{MemoryConnection, MemoryOptions};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingPool {
        closed: AtomicBool,
        released: AtomicUsize,
        purged: AtomicUsize,
    }

    impl Pool<MemoryConnection> for CountingPool {
        fn release_connection(
            &self,
            _connection: &Arc<PooledConnection<MemoryConnection>>,
        ) -> PoolResult<ReleaseOutcome> {
            self.released.fetch_add(1, Ordering::Relaxed);
            Ok(ReleaseOutcome::Returned)
        }

        fn purge_connection(&self, _connection: &Arc<PooledConnection<MemoryConnection>>) {
            self.purged.fetch_add(1, Ordering::Relaxed);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Relaxed)
        }
    }

    fn lease() -> (Arc<CountingPool>, Arc<PooledConnection<MemoryConnection>>) {
        let pool = Arc::new(CountingPool::default());
        let conn = PooledConnection::new(&pool, MemoryOptions::default());
        (pool, conn)
    }

    #[test]
    fn test_fresh_handle() {
        let before = Instant::now();
        let (_pool, conn) = lease();
        let after = Instant::now();

        assert!(!conn.is_detached());
        assert_eq!(conn.borrow_term(), "unknown");
        assert_eq!(conn.context(), "");
        assert!(conn.borrowed_at() >= before && conn.borrowed_at() <= after);
        assert!(conn.execution_context().is_none());
        assert_eq!(conn.connection().listener_count(), 2);
    }

    #[test]
    fn test_release_keeps_pool_reference() {
        let (pool, conn) = lease();

        assert_eq!(conn.release().unwrap(), ReleaseOutcome::Returned);
        assert_eq!(pool.released.load(Ordering::Relaxed), 1);
        assert!(!conn.is_detached());
    }

    #[test]
    fn test_release_on_closed_pool_is_noop() {
        let (pool, conn) = lease();
        pool.closed.store(true, Ordering::Relaxed);

        assert_eq!(conn.release().unwrap(), ReleaseOutcome::NoOp);
        assert_eq!(pool.released.load(Ordering::Relaxed), 0);
        assert!(!conn.is_detached());
    }

    #[test]
    fn test_release_after_pool_dropped_is_noop() {
        let (pool, conn) = lease();
        drop(pool);

        assert!(!conn.is_detached());
        assert_eq!(conn.release().unwrap(), ReleaseOutcome::NoOp);
        assert!(conn.is_detached());
    }

    #[test]
    fn test_destroy_after_pool_dropped_detaches() {
        let (pool, conn) = lease();
        drop(pool);

        conn.destroy();

        assert_eq!(conn.connection().destroy_calls(), 1);
        assert!(conn.is_detached());
    }

    #[test]
    fn test_detach_skipped_while_pool_closed() {
        let (pool, conn) = lease();
        pool.closed.store(true, Ordering::Relaxed);

        conn.connection().simulate_remote_end();

        assert_eq!(pool.purged.load(Ordering::Relaxed), 0);
        assert!(!conn.is_detached());
        assert!(conn.is_terminated());
    }

    #[test]
    #[allow(deprecated)]
    fn test_end_releases_without_closing() {
        let (pool, conn) = lease();

        assert_eq!(conn.end().unwrap(), ReleaseOutcome::Returned);
        assert_eq!(pool.released.load(Ordering::Relaxed), 1);
        assert_eq!(conn.connection().end_calls(), 0);
        assert_eq!(conn.connection().state(), ConnectionState::Connected);
    }

    #[test]
    fn test_close_transport_after_destroy_does_nothing() {
        let (_pool, conn) = lease();

        conn.destroy();
        conn.close_transport();

        assert_eq!(conn.connection().destroy_calls(), 1);
        assert_eq!(conn.connection().end_calls(), 0);
    }

    #[test]
    fn test_handle_does_not_keep_itself_alive() {
        let (pool, conn) = lease();
        let weak = Arc::downgrade(&conn);
        drop(conn);

        assert!(weak.upgrade().is_none());
        assert_eq!(pool.purged.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_recoverable_error_reaches_consumer() {
        let (pool, conn) = lease();
        let mut errors = conn.subscribe_errors();

        conn.connection()
            .simulate_error(TransportError::recoverable("ER_LOCK_DEADLOCK", "deadlock found"));

        let error = errors.recv().await.unwrap();
        assert_eq!(error.code, "ER_LOCK_DEADLOCK");
        assert!(!conn.is_detached());
        assert_eq!(pool.purged.load(Ordering::Relaxed), 0);
    }
}
