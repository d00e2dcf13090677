//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use crate::errors::{PoolError, PoolResult};
#[cfg(feature = "metrics")]
use prometheus::{Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{ConnectionPool, MemoryConnection, PoolConfiguration};
///
/// let pool = ConnectionPool::<MemoryConnection>::new(PoolConfiguration::default());
///
/// let conn = pool.get_connection().unwrap();
/// conn.destroy();
///
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_acquired, 1);
/// assert_eq!(metrics.total_purged, 1);
/// assert_eq!(metrics.total_connections, 0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Connections built by the pool
    pub total_created: usize,

    /// Connections handed out, new or reused
    pub total_acquired: usize,

    /// Connections returned to the free set
    pub total_released: usize,

    /// Connections removed from the pool for good
    pub total_purged: usize,

    /// Acquisitions refused because the connection limit was reached
    pub pool_full_events: usize,

    /// Current checked-out connections
    pub active_connections: usize,

    /// Current idle connections
    pub available_connections: usize,

    /// Connections the pool currently tracks
    pub total_connections: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Connection limit
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_purged".to_string(), self.total_purged.to_string());
        metrics.insert("pool_full_events".to_string(), self.pool_full_events.to_string());
        metrics.insert("active_connections".to_string(), self.active_connections.to_string());
        metrics.insert("available_connections".to_string(), self.available_connections.to_string());
        metrics.insert("total_connections".to_string(), self.total_connections.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connectionpool::{ConnectionPool, MemoryConnection, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = ConnectionPool::<MemoryConnection>::new(PoolConfiguration::default());
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("orders", Some(&tags)).unwrap();
    /// assert!(output.contains("connectionpool_connections_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        Self::render(metrics, pool_name, tags).map_err(|e| PoolError::MetricsExport(e.to_string()))
    }

    fn render(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        let mut labels = tags.cloned().unwrap_or_default();
        labels.insert("pool".to_string(), pool_name.to_string());

        let registry = Registry::new();

        // Gauges
        let gauges = [
            (
                "connectionpool_connections_active",
                "Current checked-out connections",
                metrics.active_connections as f64,
            ),
            (
                "connectionpool_connections_available",
                "Current idle connections",
                metrics.available_connections as f64,
            ),
            (
                "connectionpool_connections_total",
                "Connections tracked by the pool",
                metrics.total_connections as f64,
            ),
            (
                "connectionpool_utilization",
                "Pool utilization ratio",
                metrics.utilization,
            ),
        ];
        for (name, help, value) in gauges {
            let opts = Opts::new(name, help).const_labels(labels.clone());
            let gauge = Gauge::with_opts(opts)?;
            gauge.set(value);
            registry.register(Box::new(gauge))?;
        }

        // Counters
        let counters = [
            (
                "connectionpool_connections_created_total",
                "Connections created",
                metrics.total_created,
            ),
            (
                "connectionpool_connections_acquired_total",
                "Connections acquired",
                metrics.total_acquired,
            ),
            (
                "connectionpool_connections_released_total",
                "Connections released",
                metrics.total_released,
            ),
            (
                "connectionpool_connections_purged_total",
                "Connections purged",
                metrics.total_purged,
            ),
            (
                "connectionpool_events_full_total",
                "Acquisitions refused at the connection limit",
                metrics.pool_full_events,
            ),
        ];
        for (name, help, value) in counters {
            let opts = Opts::new(name, help).const_labels(labels.clone());
            let counter = IntCounter::with_opts(opts)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
pub(crate) struct MetricsTracker {
    pub total_created: AtomicUsize,
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub total_purged: AtomicUsize,
    pub pool_full_events: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            total_created: AtomicUsize::new(0),
            total_acquired: AtomicUsize::new(0),
            total_released: AtomicUsize::new(0),
            total_purged: AtomicUsize::new(0),
            pool_full_events: AtomicUsize::new(0),
        }
    }

    pub fn get_metrics(
        &self,
        active: usize,
        available: usize,
        total: usize,
        capacity: usize,
    ) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            total_purged: self.total_purged.load(Ordering::Relaxed),
            pool_full_events: self.pool_full_events.load(Ordering::Relaxed),
            active_connections: active,
            available_connections: available,
            total_connections: total,
            utilization,
            max_capacity: capacity,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
