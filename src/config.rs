//! Pool configuration options

use crate::context::ExecutionContext;

use std::sync::Arc;
use std::time::Duration;

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{MemoryOptions, PoolConfiguration};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new(MemoryOptions::new("orders"))
///     .with_connection_limit(20)
///     .with_abandon_threshold(Duration::from_secs(300));
///
/// assert_eq!(config.connection_limit, 20);
/// assert_eq!(config.abandon_threshold, Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfiguration<O> {
    /// Options every new connection is built from
    pub connection_options: O,

    /// Maximum number of connections the pool keeps open at once
    pub connection_limit: usize,

    /// Borrowed connections held longer than this are reported as abandoned
    pub abandon_threshold: Option<Duration>,

    /// Context that connection errors are reported to
    pub execution_context: Option<Arc<ExecutionContext>>,
}

impl<O: Default> Default for PoolConfiguration<O> {
    fn default() -> Self {
        Self::new(O::default())
    }
}

impl<O> PoolConfiguration<O> {
    /// Create a configuration with default limits for the given connection options
    pub fn new(connection_options: O) -> Self {
        Self {
            connection_options,
            connection_limit: 10,
            abandon_threshold: None,
            execution_context: None,
        }
    }

    /// Set the connection limit
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connectionpool::{MemoryOptions, PoolConfiguration};
    ///
    /// let config = PoolConfiguration::<MemoryOptions>::default()
    ///     .with_connection_limit(50);
    ///
    /// assert_eq!(config.connection_limit, 50);
    /// ```
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = limit;
        self
    }

    /// Report borrowed connections held longer than `threshold`
    pub fn with_abandon_threshold(mut self, threshold: Duration) -> Self {
        self.abandon_threshold = Some(threshold);
        self
    }

    /// Route connection errors to `context`
    pub fn with_execution_context(mut self, context: Arc<ExecutionContext>) -> Self {
        self.execution_context = Some(context);
        self
    }
}
