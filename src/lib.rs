//! # EsoxSolutions.ConnectionPool (Rust Port)
//!
//! Pooled connection handles that return themselves to their pool, detach
//! when the transport fails, and never release or purge twice.
//!
//! ## Features
//!
//! - Explicit `release()` back to the pool, safe to call from any cleanup path
//! - Automatic detachment on connection end or fatal transport errors
//! - Exactly-once purge notification, even under re-entrant or concurrent triggers
//! - Explicit lifecycle listener registration on the transport
//! - Execution contexts that collect connection errors per pool
//! - Borrow term and context labels for finding abandoned connections
//! - Reference pool with health monitoring and metrics
//! - Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connectionpool::{ConnectionPool, MemoryConnection, PoolConfiguration};
//!
//! let pool = ConnectionPool::<MemoryConnection>::new(PoolConfiguration::default());
//! {
//!     let conn = pool.get_connection().unwrap();
//!     conn.set_context("Report for Finance");
//!     // ... use conn.connection() ...
//!     conn.release().unwrap();
//! }
//! assert_eq!(pool.available_count(), 1);
//! ```

mod pool;
mod handle;
mod connection;
mod events;
mod context;
mod memory;
mod config;
mod metrics;
mod health;
mod errors;

pub use pool::{ConnectionPool, BorrowedConnection};
pub use handle::{Pool, PooledConnection, ReleaseOutcome, DEFAULT_BORROW_TERM, LONG_TERM};
pub use connection::{Connection, ConnectionState};
pub use events::{ConnectionEvent, EventKind, EventListeners, Listener, ListenerId};
pub use context::{ContextError, ExecutionContext};
pub use memory::{MemoryConnection, MemoryOptions};
pub use config::PoolConfiguration;
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use errors::{PoolError, PoolResult, TransportError};
