// EsoxSolutions.ConnectionPool - Rust Port
// Pooled connection handles with exactly-once release and purge

// This is just a binary wrapper - the actual library is in lib.rs
// Set RUST_LOG=debug to follow the handle lifecycle

use esox_connectionpool::{
    ConnectionPool, MemoryConnection, MemoryOptions, PoolConfiguration, PoolResult, TransportError,
};
use tracing_subscriber::EnvFilter;

fn main() -> PoolResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== EsoxSolutions.ConnectionPool ===");
    println!();

    let config = PoolConfiguration::new(MemoryOptions::new("demo")).with_connection_limit(2);
    let pool = ConnectionPool::<MemoryConnection>::new(config);

    println!("Release:");
    let conn = pool.get_connection()?;
    conn.set_context("Quick demo");
    println!("  Checked out connection {}", conn.id());
    println!("  Release outcome: {:?}", conn.release()?);
    println!("  Available after release: {}", pool.available_count());
    println!();

    println!("Fatal error:");
    let conn = pool.get_connection()?;
    conn.connection().simulate_error(TransportError::fatal(
        "PROTOCOL_CONNECTION_LOST",
        "server closed the connection",
    ));
    println!("  Connection {} detached: {}", conn.id(), conn.is_detached());
    println!("  Release outcome afterwards: {:?}", conn.release()?);
    println!();

    pool.close();
    for (key, value) in pool.export_metrics() {
        println!("  {}: {}", key, value);
    }

    Ok(())
}
