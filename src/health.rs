//! Health monitoring for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{ConnectionPool, MemoryConnection, PoolConfiguration};
///
/// let pool = ConnectionPool::<MemoryConnection>::new(PoolConfiguration::default());
/// let _conn = pool.get_connection().unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.active_connections, 1);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle connections in the free set
    pub available_connections: usize,

    /// Checked-out connections
    pub active_connections: usize,

    /// Connection limit
    pub total_capacity: usize,

    /// Checked-out connections held past the abandon threshold
    pub abandoned_connections: usize,

    /// Whether the pool was closed
    pub closed: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(
        available: usize,
        active: usize,
        capacity: usize,
        abandoned: usize,
        closed: bool,
    ) -> Self {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if abandoned > 0 {
            warnings.push(format!("{} connection(s) held past the abandon threshold", abandoned));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available_connections: available,
            active_connections: active,
            total_capacity: capacity,
            abandoned_connections: abandoned,
            closed,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
