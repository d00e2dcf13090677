//! Error types for the connection pool

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool is closed")]
    PoolClosed,

    #[error("Pool reached its connection limit of {0}")]
    PoolFull(usize),

    #[error("Connection {0} is not checked out - it was already released")]
    AlreadyReleased(u64),

    #[error("Metrics export failed: {0}")]
    MetricsExport(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Error raised by a transport connection
///
/// A fatal error means the connection can no longer be trusted; the handle
/// detaches from its pool when it sees one. Non-fatal errors leave the
/// connection usable.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::TransportError;
///
/// let err = TransportError::fatal("PROTOCOL_CONNECTION_LOST", "server closed the connection");
/// assert!(err.is_fatal());
/// assert_eq!(err.to_string(), "PROTOCOL_CONNECTION_LOST: server closed the connection");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    /// Short machine-readable error code
    pub code: String,

    /// Human-readable description
    pub message: String,

    /// Whether the connection is unusable after this error
    pub fatal: bool,
}

impl TransportError {
    /// Create an error after which the connection cannot be used
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fatal: true,
        }
    }

    /// Create an error that leaves the connection usable
    pub fn recoverable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fatal: false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}
