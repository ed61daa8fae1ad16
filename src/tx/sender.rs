//! Chain call submission with per-client serialization and deadlines

use super::lock::TransactionLock;
use crate::chain::{NativeChain, PortalChain};
use crate::error::{PortalError, PortalResult};
use crate::events::{EventSink, PORTAL_CHAIN};
use crate::swap::{Invoice, Leg, Liquidity, Party, SecretHash, Swap, SwapId, SwapOrder};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Sender for a native chain adapter
pub type NativeSender = TransactionSender<dyn NativeChain>;

/// Sender for the portal chain adapter
pub type PortalSender = TransactionSender<dyn PortalChain>;

/// Owns one chain adapter and serializes every state-changing call to it.
///
/// Submissions run one at a time through the client's `TransactionLock`;
/// read-only queries bypass the lock. Every call gets the same deadline, and
/// once the sender is closed further calls fail with `InstanceUnavailable`.
pub struct TransactionSender<C: ?Sized> {
    chain: String,
    client: Arc<C>,
    lock: TransactionLock,
    call_timeout: Duration,
    closed: AtomicBool,
    portal: bool,
}

impl<C: ?Sized + Send + Sync> TransactionSender<C> {
    fn with_client(chain: String, client: Arc<C>, call_timeout: Duration, portal: bool) -> Self {
        Self {
            lock: TransactionLock::new(chain.clone()),
            chain,
            client,
            call_timeout,
            closed: AtomicBool::new(false),
            portal,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Submissions started so far
    pub fn submissions(&self) -> u64 {
        self.lock.started()
    }

    /// Run a state-changing call once every earlier submission has settled
    pub async fn submit<F, Fut, T>(&self, operation: &'static str, op: F) -> PortalResult<T>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = PortalResult<T>>,
    {
        self.ensure_open(operation)?;
        let client = self.client.clone();
        let started = Instant::now();

        let result = self
            .lock
            .run(|| async move {
                // Calls queued behind a shutdown must not reach the adapter
                self.ensure_open(operation)?;
                self.call(operation, op(client)).await
            })
            .await;

        self.record(operation, started, &result);
        result
    }

    /// Run a read-only call without waiting for queued submissions
    pub async fn query<F, Fut, T>(&self, operation: &'static str, op: F) -> PortalResult<T>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = PortalResult<T>>,
    {
        self.ensure_open(operation)?;
        let started = Instant::now();
        let result = self.call(operation, op(self.client.clone())).await;
        self.record(operation, started, &result);
        result
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = PortalResult<T>>,
    ) -> PortalResult<T> {
        debug!(chain = %self.chain, operation, "chain call");
        match timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.wrap(operation, e)),
            Err(_) => Err(self.failure(
                operation,
                format!("no response within {}s", self.call_timeout.as_secs_f64()),
            )),
        }
    }

    fn ensure_open(&self, operation: &str) -> PortalResult<()> {
        if self.is_closed() {
            return Err(PortalError::InstanceUnavailable(format!(
                "{} client is stopped, refusing {}",
                self.chain, operation
            )));
        }
        Ok(())
    }

    /// Attach chain context to errors the adapter could not classify
    fn wrap(&self, operation: &str, err: PortalError) -> PortalError {
        match err {
            PortalError::Internal(message)
            | PortalError::EventParsing(message)
            | PortalError::Store(message)
            | PortalError::Config(message) => self.failure(operation, message),
            PortalError::Timeout { operation: inner } => {
                self.failure(operation, format!("timed out waiting for {}", inner))
            }
            other => other,
        }
    }

    fn failure(&self, operation: &str, message: String) -> PortalError {
        if self.portal {
            PortalError::PortalChain {
                operation: operation.to_string(),
                message,
            }
        } else {
            PortalError::NativeChain {
                chain: self.chain.clone(),
                operation: operation.to_string(),
                message,
            }
        }
    }

    fn record<T>(&self, operation: &str, started: Instant, result: &PortalResult<T>) {
        let elapsed = started.elapsed().as_secs_f64();
        crate::metrics::record_chain_call(&self.chain, operation, result.is_ok(), elapsed);
        if let Err(e) = result {
            warn!(chain = %self.chain, operation, kind = e.kind(), "chain call failed: {}", e);
        }
    }

    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

impl TransactionSender<dyn NativeChain> {
    pub fn native(
        chain: impl Into<String>,
        client: Arc<dyn NativeChain>,
        call_timeout: Duration,
    ) -> Self {
        Self::with_client(chain.into(), client, call_timeout, false)
    }

    pub async fn start(&self, from_height: u64, sink: EventSink) -> PortalResult<()> {
        self.ensure_open("start")?;
        info!(chain = %self.chain, from_height, "starting native chain adapter");
        self.client
            .start(from_height, sink)
            .await
            .map_err(|e| self.wrap("start", e))
    }

    /// Refuse further calls and stop the adapter
    pub async fn stop(&self) -> PortalResult<()> {
        if !self.close() {
            return Ok(());
        }
        info!(chain = %self.chain, "stopping native chain adapter");
        self.client.stop().await.map_err(|e| self.wrap("stop", e))
    }

    pub async fn deposit(&self, liquidity: &Liquidity) -> PortalResult<Liquidity> {
        self.submit("deposit", |c| async move { c.deposit(liquidity).await })
            .await
    }

    pub async fn create_invoice(&self, leg: &Leg) -> PortalResult<Invoice> {
        self.submit("create_invoice", |c| async move { c.create_invoice(leg).await })
            .await
    }

    pub async fn pay_invoice(&self, leg: &Leg) -> PortalResult<()> {
        self.submit("pay_invoice", |c| async move { c.pay_invoice(leg).await })
            .await
    }

    pub async fn settle_invoice(&self, leg: &Leg, secret: &[u8]) -> PortalResult<Party> {
        self.submit("settle_invoice", |c| async move {
            c.settle_invoice(leg, secret).await
        })
        .await
    }

    pub async fn recover_locked_funds(&self, swap: &Swap) -> PortalResult<()> {
        self.submit("recover_locked_funds", |c| async move {
            c.recover_locked_funds(swap).await
        })
        .await
    }

    pub async fn get_block_height(&self) -> PortalResult<u64> {
        self.query("get_block_height", |c| async move { c.get_block_height().await })
            .await
    }

    pub async fn fetch_invoice_timeout(&self, invoice_id: &str) -> PortalResult<u64> {
        self.query("fetch_invoice_timeout", |c| async move {
            c.fetch_invoice_timeout(invoice_id).await
        })
        .await
    }
}

impl TransactionSender<dyn PortalChain> {
    pub fn portal(client: Arc<dyn PortalChain>, call_timeout: Duration) -> Self {
        Self::with_client(PORTAL_CHAIN.to_string(), client, call_timeout, true)
    }

    pub async fn start(&self, from_height: u64, sink: EventSink) -> PortalResult<()> {
        self.ensure_open("start")?;
        info!(from_height, "starting portal chain adapter");
        self.client
            .start(from_height, sink)
            .await
            .map_err(|e| self.wrap("start", e))
    }

    pub async fn stop(&self) -> PortalResult<()> {
        if !self.close() {
            return Ok(());
        }
        info!("stopping portal chain adapter");
        self.client.stop().await.map_err(|e| self.wrap("stop", e))
    }

    pub async fn create_swap(&self, order: &SwapOrder, secret_hash: &SecretHash) -> PortalResult<Swap> {
        self.submit("create_swap", |c| async move {
            c.create_swap(order, secret_hash).await
        })
        .await
    }

    pub async fn register_invoice(
        &self,
        swap_id: &SwapId,
        secret_hash: &SecretHash,
        amount: u128,
        invoice: &Invoice,
    ) -> PortalResult<()> {
        self.submit("register_invoice", |c| async move {
            c.register_invoice(swap_id, secret_hash, amount, invoice).await
        })
        .await
    }

    pub async fn get_swap(&self, swap_id: &SwapId) -> PortalResult<Swap> {
        self.query("get_swap", |c| async move { c.get_swap(swap_id).await })
            .await
    }
}
