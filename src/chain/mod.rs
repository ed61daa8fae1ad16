//! Chain module - handles the portal chain and native chain clients
//!
//! This module provides:
//! - The adapter traits the relayer drives chains through
//! - Per-chain timing parameters
//! - A registry of chain clients sharing one event bus
//! - Start from persisted checkpoints and health monitoring

mod adapter;
mod params;

pub use adapter::{NativeChain, PortalChain};
#[cfg(test)]
pub use adapter::{MockNativeChain, MockPortalChain};
pub use params::{default_params, ChainParams, ChainParamsTable};

use crate::error::{PortalError, PortalResult};
use crate::events::{ChainEvent, EventSink, PORTAL_CHAIN};
use crate::state::SwapStore;
use crate::tx::{NativeSender, PortalSender};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_BUS_CAPACITY: usize = 10000;

/// Manages the portal client and every native chain client
pub struct ChainManager {
    /// Portal chain client
    portal: Arc<PortalSender>,
    /// Native chain clients indexed by ledger name
    natives: DashMap<String, Arc<NativeSender>>,
    /// Timing parameters per ledger
    params: ChainParamsTable,
    /// Event broadcast channel
    event_tx: broadcast::Sender<ChainEvent>,
    /// Deadline applied to each adapter call
    call_timeout: Duration,
}

impl ChainManager {
    pub fn new(portal: Arc<dyn PortalChain>, params: ChainParamsTable, call_timeout: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            portal: Arc::new(PortalSender::portal(portal, call_timeout)),
            natives: DashMap::new(),
            params,
            event_tx,
            call_timeout,
        }
    }

    /// Register a native chain client; its name must have known parameters
    pub fn register_native(&self, chain: impl Into<String>, client: Arc<dyn NativeChain>) -> PortalResult<()> {
        let chain = chain.into();
        self.params.get(&chain)?;
        if chain == PORTAL_CHAIN {
            return Err(PortalError::Config(format!(
                "{} is reserved for the portal chain",
                PORTAL_CHAIN
            )));
        }

        info!("Registering native chain {}", chain);
        let sender = NativeSender::native(chain.clone(), client, self.call_timeout);
        if self.natives.insert(chain.clone(), Arc::new(sender)).is_some() {
            warn!("Native chain {} was registered twice; keeping the latest client", chain);
        }
        Ok(())
    }

    /// Start every adapter from its last persisted block height
    pub async fn start_all(&self, store: &dyn SwapStore) -> PortalResult<()> {
        let from_height = store.get_block_height(PORTAL_CHAIN).await?;
        self.portal
            .start(from_height, EventSink::portal(self.event_tx.clone()))
            .await?;

        let senders: Vec<_> = self
            .natives
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (chain, sender) in senders {
            let from_height = store.get_block_height(&chain).await?;
            sender
                .start(from_height, EventSink::native(chain.clone(), self.event_tx.clone()))
                .await?;
            info!("Chain {} started from block {}", chain, from_height);
        }
        Ok(())
    }

    /// Subscribe to finalized events from all chains
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChainEvent> {
        self.event_tx.subscribe()
    }

    /// Event sender, for hosts that feed events in directly
    pub fn event_sender(&self) -> broadcast::Sender<ChainEvent> {
        self.event_tx.clone()
    }

    pub fn portal(&self) -> Arc<PortalSender> {
        self.portal.clone()
    }

    /// Get the client for a native chain
    pub fn get(&self, chain: &str) -> PortalResult<Arc<NativeSender>> {
        self.natives
            .get(chain)
            .map(|c| c.clone())
            .ok_or_else(|| PortalError::InvalidChain {
                chain: chain.to_string(),
            })
    }

    pub fn params(&self, chain: &str) -> PortalResult<ChainParams> {
        self.params.get(chain)
    }

    /// Health check for all native chains: a chain is healthy if it reports its height
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let senders: Vec<_> = self
            .natives
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let checks = senders.into_iter().map(|(chain, sender)| async move {
            let healthy = match sender.get_block_height().await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Chain {} health check failed: {}", chain, e);
                    false
                }
            };
            crate::metrics::record_chain_health(&chain, healthy);
            (chain, healthy)
        });

        let mut results = futures::future::join_all(checks).await;
        results.sort();
        results
    }

    /// Get all registered native chain names
    pub fn connected_chains(&self) -> Vec<String> {
        let mut chains: Vec<String> = self.natives.iter().map(|e| e.key().clone()).collect();
        chains.sort();
        chains
    }

    /// Stop every adapter; later calls fail with `InstanceUnavailable`
    pub async fn stop(&self) {
        let senders: Vec<_> = self.natives.iter().map(|e| e.value().clone()).collect();
        for sender in senders {
            if let Err(e) = sender.stop().await {
                warn!("Failed to stop chain {}: {}", sender.chain(), e);
            }
        }
        if let Err(e) = self.portal.stop().await {
            warn!("Failed to stop portal chain: {}", e);
        }
        info!("Chain manager stopped");
    }
}
