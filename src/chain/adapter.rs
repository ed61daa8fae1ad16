//! Chain adapter interfaces
//!
//! Concrete adapters (transaction construction, signing, RPC polling, log
//! decoding) live outside this crate. The relayer drives them through these
//! traits and receives their finalized events through an `EventSink`.

use crate::error::PortalResult;
use crate::events::EventSink;
use crate::swap::{Invoice, Leg, Liquidity, Party, SecretHash, Swap, SwapId, SwapOrder};

use async_trait::async_trait;

/// A ledger where a party's funds actually move
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NativeChain: Send + Sync {
    /// Start publishing finalized events from `from_height` onwards
    async fn start(&self, from_height: u64, sink: EventSink) -> PortalResult<()>;

    async fn stop(&self) -> PortalResult<()>;

    /// Lock funds for minting on the portal chain
    async fn deposit(&self, liquidity: &Liquidity) -> PortalResult<Liquidity>;

    /// Create an HTLC invoice for the leg's party, bound to the swap's secret hash
    async fn create_invoice(&self, leg: &Leg) -> PortalResult<Invoice>;

    /// Pay the invoice held by the leg's party
    async fn pay_invoice(&self, leg: &Leg) -> PortalResult<()>;

    /// Claim the leg's invoice with the preimage
    async fn settle_invoice(&self, leg: &Leg, secret: &[u8]) -> PortalResult<Party>;

    async fn get_block_height(&self) -> PortalResult<u64>;

    /// Block height at which the invoice's HTLC expires
    async fn fetch_invoice_timeout(&self, invoice_id: &str) -> PortalResult<u64>;

    /// Reclaim funds locked for a swap after its timeout
    async fn recover_locked_funds(&self, swap: &Swap) -> PortalResult<()>;
}

/// The coordination ledger where orders are matched and invoices registered
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortalChain: Send + Sync {
    async fn start(&self, from_height: u64, sink: EventSink) -> PortalResult<()>;

    async fn stop(&self) -> PortalResult<()>;

    async fn create_swap(&self, order: &SwapOrder, secret_hash: &SecretHash) -> PortalResult<Swap>;

    async fn register_invoice(
        &self,
        swap_id: &SwapId,
        secret_hash: &SecretHash,
        amount: u128,
        invoice: &Invoice,
    ) -> PortalResult<()>;

    async fn get_swap(&self, swap_id: &SwapId) -> PortalResult<Swap>;
}
