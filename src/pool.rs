//! Reference connection pool

use crate::config::PoolConfiguration;
use crate::connection::Connection;
use crate::context::ExecutionContext;
use crate::errors::{PoolError, PoolResult};
use crate::handle::{LONG_TERM, Pool, PooledConnection, ReleaseOutcome};
use crate::health::HealthStatus;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Snapshot of a checked-out connection, for finding long-held or abandoned ones
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct BorrowedConnection {
    pub id: u64,
    pub borrow_term: String,
    pub context: String,
    /// When the handle was created
    #[cfg_attr(feature = "metrics", serde(skip))]
    pub borrowed_at: Instant,
    /// When the current checkout started
    #[cfg_attr(feature = "metrics", serde(skip))]
    pub checked_out_at: Instant,
    /// Time since the current checkout started
    pub held_for: Duration,
}

/// Pool of transport connections with a fixed connection limit
///
/// Connections are created on demand up to the limit. Released connections
/// go back into a free set and are handed out again; connections that end or
/// fail fatally are purged. There is no waiting: when every connection is
/// checked out, [`get_connection`](Self::get_connection) fails with
/// [`PoolError::PoolFull`].
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{
///     ConnectionPool, MemoryConnection, MemoryOptions, PoolConfiguration, TransportError,
/// };
///
/// let config = PoolConfiguration::new(MemoryOptions::new("orders")).with_connection_limit(2);
/// let pool = ConnectionPool::<MemoryConnection>::new(config);
///
/// let conn = pool.get_connection().unwrap();
/// conn.connection().simulate_error(TransportError::fatal("ECONNRESET", "reset by peer"));
///
/// assert!(conn.is_detached());
/// assert_eq!(pool.total_count(), 0);
/// ```
pub struct ConnectionPool<C: Connection> {
    free: ArrayQueue<Arc<PooledConnection<C>>>,
    all: DashMap<u64, Arc<PooledConnection<C>>>,
    // Checked-out connections with the time of their current checkout.
    borrowed: DashMap<u64, (Arc<PooledConnection<C>>, Instant)>,
    config: PoolConfiguration<C::Options>,
    metrics: MetricsTracker,
    closed: AtomicBool,
}

impl<C: Connection> ConnectionPool<C> {
    /// Create an empty pool; connections are built on first use
    pub fn new(config: PoolConfiguration<C::Options>) -> Arc<Self> {
        Arc::new(Self {
            free: ArrayQueue::new(config.connection_limit.max(1)),
            all: DashMap::new(),
            borrowed: DashMap::new(),
            config,
            metrics: MetricsTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Check out a connection, reusing an idle one when possible
    pub fn get_connection(self: &Arc<Self>) -> PoolResult<Arc<PooledConnection<C>>> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        while let Some(connection) = self.free.pop() {
            // Purged while idle.
            if !self.all.contains_key(&connection.id()) {
                continue;
            }

            self.borrowed
                .insert(connection.id(), (Arc::clone(&connection), Instant::now()));
            self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = connection.id(), "Reusing pooled connection");
            return Ok(connection);
        }

        if self.all.len() >= self.config.connection_limit {
            self.metrics.pool_full_events.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::PoolFull(self.config.connection_limit));
        }

        let connection = PooledConnection::new(self, self.config.connection_options.clone());
        self.all.insert(connection.id(), Arc::clone(&connection));
        self.borrowed
            .insert(connection.id(), (Arc::clone(&connection), Instant::now()));
        self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
        self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
        debug!(
            connection_id = connection.id(),
            total = self.all.len(),
            "Created pooled connection"
        );

        Ok(connection)
    }

    /// Close the pool and gracefully end every connection it tracks
    ///
    /// Connections are not detached; their handles see a closed pool and
    /// treat every later release or failure as a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let connections: Vec<Arc<PooledConnection<C>>> =
            self.all.iter().map(|entry| Arc::clone(entry.value())).collect();
        self.all.clear();
        self.borrowed.clear();
        while self.free.pop().is_some() {}

        for connection in &connections {
            connection.close_transport();
        }
        info!(connections = connections.len(), "Connection pool closed");
    }

    /// Connections currently checked out
    pub fn borrowed_connections(&self) -> Vec<BorrowedConnection> {
        self.borrowed
            .iter()
            .map(|entry| {
                let (connection, checked_out_at) = entry.value();
                BorrowedConnection {
                    id: connection.id(),
                    borrow_term: connection.borrow_term(),
                    context: connection.context(),
                    borrowed_at: connection.borrowed_at(),
                    checked_out_at: *checked_out_at,
                    held_for: checked_out_at.elapsed(),
                }
            })
            .collect()
    }

    /// Connections checked out longer than `threshold`, except long-term borrows
    pub fn abandoned_connections(&self, threshold: Duration) -> Vec<BorrowedConnection> {
        self.borrowed_connections()
            .into_iter()
            .filter(|borrowed| {
                borrowed.held_for > threshold && borrowed.borrow_term != LONG_TERM
            })
            .collect()
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        let abandoned = self
            .config
            .abandon_threshold
            .map(|threshold| self.abandoned_connections(threshold).len())
            .unwrap_or(0);

        HealthStatus::new(
            self.available_count(),
            self.active_count(),
            self.config.connection_limit,
            abandoned,
            self.is_closed(),
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(
            self.active_count(),
            self.available_count(),
            self.total_count(),
            self.config.connection_limit,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Idle connections, including ones purged but not yet skipped
    pub fn available_count(&self) -> usize {
        self.free.len()
    }

    /// Checked-out connections
    pub fn active_count(&self) -> usize {
        self.borrowed.len()
    }

    /// Connections the pool tracks, idle or checked out
    pub fn total_count(&self) -> usize {
        self.all.len()
    }

    pub fn config(&self) -> &PoolConfiguration<C::Options> {
        &self.config
    }
}

impl<C: Connection> Pool<C> for ConnectionPool<C> {
    fn release_connection(
        &self,
        connection: &Arc<PooledConnection<C>>,
    ) -> PoolResult<ReleaseOutcome> {
        if self.is_closed() || !self.all.contains_key(&connection.id()) {
            return Ok(ReleaseOutcome::NoOp);
        }

        if self.borrowed.remove(&connection.id()).is_none() {
            return Err(PoolError::AlreadyReleased(connection.id()));
        }

        if self.free.push(Arc::clone(connection)).is_err() {
            // More connections than the limit allows; drop this one.
            connection.destroy();
            return Ok(ReleaseOutcome::NoOp);
        }

        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
        debug!(
            connection_id = connection.id(),
            available = self.free.len(),
            "Connection returned to pool"
        );
        Ok(ReleaseOutcome::Returned)
    }

    fn purge_connection(&self, connection: &Arc<PooledConnection<C>>) {
        self.borrowed.remove(&connection.id());
        if self.all.remove(&connection.id()).is_some() {
            self.metrics.total_purged.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = connection.id(), "Connection purged from pool");
        }
        connection.close_transport();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn execution_context(&self) -> Option<Arc<ExecutionContext>> {
        self.config.execution_context.clone()
    }
}
