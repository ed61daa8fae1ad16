//! Per-chain timing parameters
//!
//! Different ledgers produce blocks at very different rates and need
//! different confirmation depths before an event can be treated as final:
//! - Ethereum: ~12s blocks, probabilistic finality after tens of blocks
//! - Bitcoin / Lightning: ~10min blocks, 6 confirmations
//! - Solana: sub-second slots, 32 for practical finality

use crate::config::ChainConfig;
use crate::error::{PortalError, PortalResult};

use std::collections::HashMap;

/// Timing constants for one ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// Average block time in seconds
    pub avg_block_time: u64,
    /// Blocks after which an event is treated as irreversible
    pub safety_depth: u64,
}

impl ChainParams {
    pub const fn new(avg_block_time: u64, safety_depth: u64) -> Self {
        Self {
            avg_block_time,
            safety_depth,
        }
    }

    /// Wall-clock time until an event on this chain is reorg-safe
    pub fn safety_time(&self) -> u64 {
        self.avg_block_time * self.safety_depth
    }

    /// Convert a block count to seconds
    pub fn blocks_to_secs(&self, blocks: i64) -> i64 {
        blocks * self.avg_block_time as i64
    }

    /// Convert seconds to blocks, rounding up
    pub fn secs_to_blocks(&self, secs: u64) -> u64 {
        secs.div_ceil(self.avg_block_time.max(1))
    }
}

/// Built-in parameters for a ledger name
pub fn default_params(chain: &str) -> Option<ChainParams> {
    let params = match chain {
        "ethereum" => ChainParams::new(12, 32),
        "sepolia" | "goerli" => ChainParams::new(12, 12),
        "polygon" => ChainParams::new(2, 128),
        "arbitrum" | "optimism" | "base" => ChainParams::new(2, 64),
        "avalanche" => ChainParams::new(2, 1),
        "bitcoin" | "lightning" => ChainParams::new(600, 6),
        "solana" => ChainParams::new(1, 32),
        _ => return None,
    };
    Some(params)
}

/// Lookup table of chain parameters: built-in defaults with configured overrides
#[derive(Debug, Clone, Default)]
pub struct ChainParamsTable {
    params: HashMap<String, ChainParams>,
}

impl ChainParamsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from configured chains
    pub fn from_config<'a>(
        chains: impl IntoIterator<Item = (&'a String, &'a ChainConfig)>,
    ) -> PortalResult<Self> {
        let mut table = Self::new();
        for (name, config) in chains {
            let defaults = default_params(name);
            let avg_block_time = config
                .avg_block_time_secs
                .or(defaults.map(|p| p.avg_block_time));
            let safety_depth = config.safety_depth.or(defaults.map(|p| p.safety_depth));

            match (avg_block_time, safety_depth) {
                (Some(avg_block_time), Some(safety_depth)) if avg_block_time > 0 => {
                    table.insert(name, ChainParams::new(avg_block_time, safety_depth));
                }
                _ => {
                    return Err(PortalError::Config(format!(
                        "chain {} needs a positive avg_block_time_secs and a safety_depth",
                        name
                    )))
                }
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, chain: impl Into<String>, params: ChainParams) {
        self.params.insert(chain.into(), params);
    }

    /// Parameters for a chain, falling back to the built-in table
    pub fn get(&self, chain: &str) -> PortalResult<ChainParams> {
        self.params
            .get(chain)
            .copied()
            .or_else(|| default_params(chain))
            .ok_or_else(|| PortalError::InvalidChain {
                chain: chain.to_string(),
            })
    }
}
