//! Swap persistence
//!
//! Handles:
//! - Swap snapshots and their store-level status
//! - Locally generated secrets, keyed by hash
//! - Per-chain block height checkpoints for restart recovery

mod memory;

pub use memory::MemoryStore;

use crate::error::PortalResult;
use crate::swap::{SecretHash, Swap, SwapId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Store-level outcome of a swap, independent of its protocol state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SwapStatus {
    Active,
    Completed,
    Failed { reason: String },
}

impl SwapStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, SwapStatus::Active)
    }
}

/// A swap together with its bookkeeping
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSwap {
    pub swap: Swap,
    #[serde(flatten)]
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Swap counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwapStats {
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Persistence used by the orchestrator
#[async_trait]
pub trait SwapStore: Send + Sync {
    async fn get(&self, id: &SwapId) -> PortalResult<Option<Swap>>;

    /// Insert a swap, or replace it if already present
    async fn put(&self, swap: &Swap) -> PortalResult<()>;

    /// Replace an existing swap; it may never move backwards
    async fn update(&self, swap: &Swap) -> PortalResult<()>;

    async fn status(&self, id: &SwapId) -> PortalResult<Option<SwapStatus>>;

    async fn mark_failed(&self, id: &SwapId, reason: &str) -> PortalResult<()>;

    async fn mark_completed(&self, id: &SwapId) -> PortalResult<()>;

    /// Preimage for a locally generated secret
    async fn get_secret(&self, secret_hash: &SecretHash) -> PortalResult<Option<Vec<u8>>>;

    /// Generate and keep a fresh secret, returning its hash
    async fn create_secret(&self) -> PortalResult<SecretHash>;

    /// Last finalized block height seen on a chain, 0 if none
    async fn get_block_height(&self, chain: &str) -> PortalResult<u64>;

    /// Record a block height; lower heights than the stored one are ignored
    async fn set_block_height(&self, chain: &str, height: u64) -> PortalResult<()>;

    async fn has_unfinished_swaps(&self) -> PortalResult<bool>;

    async fn list(&self) -> PortalResult<Vec<StoredSwap>>;

    async fn stats(&self) -> PortalResult<SwapStats>;

    async fn health_check(&self) -> PortalResult<()>;
}
