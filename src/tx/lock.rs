//! Per-client transaction serialization
//!
//! A chain client that accepts concurrent submissions risks nonce collisions
//! and conflicting in-flight state. Each client owns one `TransactionLock`;
//! every submission runs through it, one at a time, in arrival order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

/// FIFO lock over asynchronous operations
pub struct TransactionLock {
    /// Owning chain, for logs
    chain: String,
    /// Held for the full duration of an operation
    gate: Mutex<()>,
    /// Operations started so far
    started: AtomicU64,
}

impl TransactionLock {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            gate: Mutex::new(()),
            started: AtomicU64::new(0),
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Run `op` once every previously queued operation has settled.
    ///
    /// The lock is released when the operation's future completes, whatever
    /// its result; a failed operation never blocks the ones queued behind it.
    pub async fn run<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.gate.lock().await;
        let seq = self.started.fetch_add(1, Ordering::SeqCst);
        trace!(chain = %self.chain, seq, "transaction lock acquired");
        op().await
    }

    /// Number of operations that have started
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_operations_never_overlap() {
        let lock = Arc::new(TransactionLock::new("ethereum"));
        let busy = Arc::new(AtomicBool::new(false));
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u32 {
            let lock = lock.clone();
            let busy = busy.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                lock.run(|| async move {
                    assert!(!busy.swap(true, Ordering::SeqCst), "operations overlapped");
                    log.lock().unwrap().push(format!("start {i}"));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().unwrap().push(format!("end {i}"));
                    busy.store(false, Ordering::SeqCst);
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 10);
        for pair in log.chunks(2) {
            assert!(pair[0].starts_with("start"));
            assert_eq!(pair[0].replace("start", ""), pair[1].replace("end", ""));
        }
        assert_eq!(lock.started(), 5);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_next_operation() {
        let lock = Arc::new(TransactionLock::new("lightning"));
        let first_done = Arc::new(AtomicBool::new(false));

        let failing = {
            let lock = lock.clone();
            let first_done = first_done.clone();
            tokio::spawn(async move {
                lock.run(|| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    first_done.store(true, Ordering::SeqCst);
                    Err::<(), &str>("rpc unavailable")
                })
                .await
            })
        };
        // Let the failing operation take the lock first
        tokio::time::sleep(Duration::from_millis(5)).await;

        let observed = lock
            .run(|| {
                let first_done = first_done.clone();
                async move { first_done.load(Ordering::SeqCst) }
            })
            .await;

        assert!(observed, "second operation started before the first settled");
        assert_eq!(failing.await.unwrap(), Err("rpc unavailable"));
    }

    #[test]
    fn test_waiter_woken_when_holder_settles() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let lock = TransactionLock::new("solana");
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let mut holder = task::spawn(lock.run(|| async move {
            let _ = release_rx.await;
            1
        }));
        let mut waiter = task::spawn(lock.run(|| async { 2 }));

        assert_pending!(holder.poll());
        assert_pending!(waiter.poll());
        assert_eq!(lock.started(), 1);

        release_tx.send(()).unwrap();
        assert!(holder.is_woken());
        assert_ready_eq!(holder.poll(), 1);
        assert!(waiter.is_woken());
        assert_ready_eq!(waiter.poll(), 2);
        assert_eq!(lock.started(), 2);
    }

    #[tokio::test]
    async fn test_panicking_operation_releases_lock() {
        let lock = Arc::new(TransactionLock::new("bitcoin"));
        let panicked = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.run(|| async {
                    panic!("adapter bug");
                })
                .await
            })
        };
        assert!(panicked.await.is_err());

        let value = tokio::time::timeout(Duration::from_secs(1), lock.run(|| async { 42 }))
            .await
            .expect("lock stayed held after panic");
        assert_eq!(value, 42);
    }
}
