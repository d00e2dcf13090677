//! Handle lifecycle against a pool that records every call

use esox_connectionpool::{
    ConnectionEvent, ExecutionContext, MemoryConnection, MemoryOptions, Pool, PoolResult,
    PooledConnection, ReleaseOutcome, TransportError,
};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Weak};
use std::time::Instant;

type Handle = Arc<PooledConnection<MemoryConnection>>;

#[derive(Default)]
struct RecordingPool {
    closed: AtomicBool,
    released: AtomicUsize,
    purged: AtomicUsize,
    destroy_on_purge: bool,
    context: Option<Arc<ExecutionContext>>,
}

impl RecordingPool {
    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn purged(&self) -> usize {
        self.purged.load(Ordering::SeqCst)
    }
}

impl Pool<MemoryConnection> for RecordingPool {
    fn release_connection(&self, _connection: &Handle) -> PoolResult<ReleaseOutcome> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(ReleaseOutcome::Returned)
    }

    fn purge_connection(&self, connection: &Handle) {
        self.purged.fetch_add(1, Ordering::SeqCst);
        if self.destroy_on_purge {
            connection.destroy();
            connection.connection().emit(&ConnectionEvent::End);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn execution_context(&self) -> Option<Arc<ExecutionContext>> {
        self.context.clone()
    }
}

// Looks at the handle's own state from inside is_closed.
#[derive(Default)]
struct InspectingPool {
    handle: Mutex<Weak<PooledConnection<MemoryConnection>>>,
    closed_checks: AtomicUsize,
    purged: AtomicUsize,
}

impl Pool<MemoryConnection> for InspectingPool {
    fn release_connection(&self, _connection: &Handle) -> PoolResult<ReleaseOutcome> {
        Ok(ReleaseOutcome::Returned)
    }

    fn purge_connection(&self, _connection: &Handle) {
        self.purged.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().upgrade() {
            let _ = handle.is_detached();
        }
        false
    }
}

fn lease(pool: RecordingPool) -> (Arc<RecordingPool>, Handle) {
    let pool = Arc::new(pool);
    let handle = PooledConnection::new(&pool, MemoryOptions::new("lifecycle"));
    (pool, handle)
}

fn fatal() -> TransportError {
    TransportError::fatal("PROTOCOL_CONNECTION_LOST", "connection lost")
}

#[test]
fn test_fresh_state_on_construction() {
    let before = Instant::now();
    let (_pool, handle) = lease(RecordingPool::default());
    let after = Instant::now();

    assert!(!handle.is_detached());
    assert_eq!(handle.borrow_term(), "unknown");
    assert_eq!(handle.context(), "");
    assert!(handle.borrowed_at() >= before);
    assert!(handle.borrowed_at() <= after);
}

#[test]
fn test_release_then_fatal_error_then_release() {
    let (pool, handle) = lease(RecordingPool::default());

    assert_eq!(handle.release().unwrap(), ReleaseOutcome::Returned);
    assert_eq!(pool.released(), 1);
    assert!(!handle.is_detached());

    handle.connection().simulate_error(fatal());
    assert_eq!(pool.purged(), 1);
    assert!(handle.is_detached());

    assert_eq!(handle.release().unwrap(), ReleaseOutcome::NoOp);
    assert_eq!(pool.released(), 1);
    assert_eq!(pool.purged(), 1);
}

#[test]
fn test_destroy_then_end_event() {
    let (pool, handle) = lease(RecordingPool::default());

    handle.destroy();
    handle.connection().emit(&ConnectionEvent::End);

    let conn = handle.connection();
    assert_eq!(conn.destroy_calls() + conn.end_calls(), 1);
    assert_eq!(pool.purged(), 1);
}

#[test]
fn test_every_trigger_combination_purges_once() {
    let triggers: [fn(&Handle); 3] = [
        |handle| {
            handle.connection().emit(&ConnectionEvent::Error(fatal()));
        },
        |handle| {
            handle.connection().emit(&ConnectionEvent::End);
        },
        |handle| handle.destroy(),
    ];
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

    for order in orders {
        let (pool, handle) = lease(RecordingPool::default());
        for index in order {
            triggers[index](&handle);
            triggers[index](&handle);
        }

        assert_eq!(pool.purged(), 1, "order {:?}", order);
        let conn = handle.connection();
        assert!(conn.destroy_calls() + conn.end_calls() <= 1, "order {:?}", order);
        assert!(handle.is_detached());
    }
}

#[test]
fn test_release_on_closed_pool_mutates_nothing() {
    let (pool, handle) = lease(RecordingPool::default());
    pool.closed.store(true, Ordering::SeqCst);

    assert_eq!(handle.release().unwrap(), ReleaseOutcome::NoOp);
    handle.destroy();

    assert_eq!(pool.released(), 0);
    assert_eq!(pool.purged(), 0);
    assert!(!handle.is_detached());
    assert_eq!(handle.connection().destroy_calls(), 1);
}

#[test]
fn test_reentrant_purge_detaches_once() {
    let (pool, handle) = lease(RecordingPool {
        destroy_on_purge: true,
        ..RecordingPool::default()
    });

    handle.connection().simulate_remote_end();

    assert_eq!(pool.purged(), 1);
    assert!(handle.is_detached());
}

#[test]
fn test_concurrent_triggers_purge_once() {
    for _ in 0..50 {
        let (pool, handle) = lease(RecordingPool::default());
        let barrier = Arc::new(Barrier::new(3));

        std::thread::scope(|scope| {
            let error_side = Arc::clone(&barrier);
            let end_side = Arc::clone(&barrier);
            let destroy_side = Arc::clone(&barrier);
            let (a, b, c) = (&handle, &handle, &handle);

            scope.spawn(move || {
                error_side.wait();
                a.connection().simulate_error(fatal());
            });
            scope.spawn(move || {
                end_side.wait();
                b.connection().emit(&ConnectionEvent::End);
            });
            scope.spawn(move || {
                destroy_side.wait();
                c.destroy();
            });
        });

        assert_eq!(pool.purged(), 1);
        assert!(handle.is_detached());
    }
}

#[test]
#[allow(deprecated)]
fn test_deprecated_end_only_releases() {
    let (pool, handle) = lease(RecordingPool::default());

    assert_eq!(handle.end().unwrap(), ReleaseOutcome::Returned);
    assert_eq!(handle.end().unwrap(), ReleaseOutcome::Returned);

    assert_eq!(pool.released(), 2);
    assert_eq!(pool.purged(), 0);
    assert_eq!(handle.connection().end_calls(), 0);
    assert!(!handle.is_terminated());
}

#[test]
fn test_recoverable_error_does_not_detach() {
    let (pool, handle) = lease(RecordingPool::default());

    handle
        .connection()
        .simulate_error(TransportError::recoverable("ER_PARSE_ERROR", "syntax error"));

    assert_eq!(pool.purged(), 0);
    assert!(!handle.is_detached());
    assert_eq!(handle.release().unwrap(), ReleaseOutcome::Returned);
}

#[tokio::test]
async fn test_fatal_error_reported_to_context_and_consumer() {
    let context = Arc::new(ExecutionContext::new("request-42"));
    let mut context_errors = context.subscribe();
    let (pool, handle) = lease(RecordingPool {
        context: Some(Arc::clone(&context)),
        ..RecordingPool::default()
    });
    let mut consumer_errors = handle.subscribe_errors();

    handle.connection().simulate_error(fatal());

    let reported = context_errors.recv().await.unwrap();
    assert_eq!(reported.connection_id, handle.id());
    assert!(reported.error.is_fatal());
    assert_eq!(consumer_errors.recv().await.unwrap(), fatal());
    assert_eq!(context.reported_count(), 1);
    assert_eq!(pool.purged(), 1);
}

#[test]
fn test_pool_may_inspect_handle_while_checking_closed() {
    let pool = Arc::new(InspectingPool::default());
    let handle = PooledConnection::new(&pool, MemoryOptions::new("inspect"));
    *pool.handle.lock() = Arc::downgrade(&handle);

    assert_eq!(handle.release().unwrap(), ReleaseOutcome::Returned);
    handle.connection().simulate_error(fatal());

    assert!(handle.is_detached());
    assert_eq!(pool.purged.load(Ordering::SeqCst), 1);
    assert!(pool.closed_checks.load(Ordering::SeqCst) >= 2);
}
