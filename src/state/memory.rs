//! In-memory swap store

use super::{StoredSwap, SwapStats, SwapStatus, SwapStore};
use crate::error::{PortalError, PortalResult};
use crate::swap::{generate_secret, SecretHash, Swap, SwapId};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// Store backed by concurrent maps; contents are lost on restart
#[derive(Default)]
pub struct MemoryStore {
    swaps: DashMap<SwapId, StoredSwap>,
    secrets: DashMap<SecretHash, Vec<u8>>,
    checkpoints: DashMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_status(&self, id: &SwapId, status: SwapStatus) -> PortalResult<()> {
        let mut entry = self
            .swaps
            .get_mut(id)
            .ok_or_else(|| PortalError::Store(format!("swap {} not found", hex::encode(id))))?;
        // The first terminal status sticks
        if !entry.status.is_finished() {
            entry.status = status;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl SwapStore for MemoryStore {
    async fn get(&self, id: &SwapId) -> PortalResult<Option<Swap>> {
        Ok(self.swaps.get(id).map(|s| s.swap.clone()))
    }

    async fn put(&self, swap: &Swap) -> PortalResult<()> {
        let now = Utc::now();
        self.swaps
            .entry(swap.id)
            .and_modify(|stored| {
                stored.swap = swap.clone();
                stored.updated_at = now;
            })
            .or_insert_with(|| StoredSwap {
                swap: swap.clone(),
                status: SwapStatus::Active,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn update(&self, swap: &Swap) -> PortalResult<()> {
        let mut stored = self.swaps.get_mut(&swap.id).ok_or_else(|| {
            PortalError::Store(format!("swap {} not found", swap.id_hex()))
        })?;
        if swap.state < stored.swap.state {
            return Err(PortalError::InvalidTransition {
                from: stored.swap.state.to_string(),
                to: swap.state.to_string(),
            });
        }
        stored.swap = swap.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn status(&self, id: &SwapId) -> PortalResult<Option<SwapStatus>> {
        Ok(self.swaps.get(id).map(|s| s.status.clone()))
    }

    async fn mark_failed(&self, id: &SwapId, reason: &str) -> PortalResult<()> {
        self.set_status(
            id,
            SwapStatus::Failed {
                reason: reason.to_string(),
            },
        )
    }

    async fn mark_completed(&self, id: &SwapId) -> PortalResult<()> {
        self.set_status(id, SwapStatus::Completed)
    }

    async fn get_secret(&self, secret_hash: &SecretHash) -> PortalResult<Option<Vec<u8>>> {
        Ok(self.secrets.get(secret_hash).map(|s| s.clone()))
    }

    async fn create_secret(&self) -> PortalResult<SecretHash> {
        let (secret, secret_hash) = generate_secret();
        self.secrets.insert(secret_hash, secret);
        debug!(secret_hash = %hex::encode(secret_hash), "created swap secret");
        Ok(secret_hash)
    }

    async fn get_block_height(&self, chain: &str) -> PortalResult<u64> {
        Ok(self.checkpoints.get(chain).map(|h| *h).unwrap_or(0))
    }

    async fn set_block_height(&self, chain: &str, height: u64) -> PortalResult<()> {
        let mut current = self.checkpoints.entry(chain.to_string()).or_insert(0);
        if height > *current {
            *current = height;
            debug!("Saved checkpoint for chain {}: block {}", chain, height);
        }
        Ok(())
    }

    async fn has_unfinished_swaps(&self) -> PortalResult<bool> {
        Ok(self.swaps.iter().any(|s| !s.status.is_finished()))
    }

    async fn list(&self) -> PortalResult<Vec<StoredSwap>> {
        let mut swaps: Vec<StoredSwap> = self.swaps.iter().map(|s| s.value().clone()).collect();
        swaps.sort_by_key(|s| s.created_at);
        Ok(swaps)
    }

    async fn stats(&self) -> PortalResult<SwapStats> {
        let mut stats = SwapStats::default();
        for entry in self.swaps.iter() {
            match entry.status {
                SwapStatus::Active => stats.active += 1,
                SwapStatus::Completed => stats.completed += 1,
                SwapStatus::Failed { .. } => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn health_check(&self) -> PortalResult<()> {
        Ok(())
    }
}
