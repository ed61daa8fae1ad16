//! Chain event types
//!
//! Events emitted by the portal (coordination) chain and by native chain
//! adapters. Adapters only surface events once they are past the chain's
//! safety depth, so everything arriving here is treated as final.

mod decode;

pub use decode::{decode_native, decode_portal, RawEvent};

use crate::error::{PortalError, PortalResult};
use crate::swap::{hex32, hex_bytes, Invoice, Liquidity, Receipt, Swap, SwapId};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Name under which portal chain events are reported
pub const PORTAL_CHAIN: &str = "portal";

/// Events emitted by the portal chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PortalEvent {
    /// Two orders were matched into a swap
    SwapMatched { swap: Swap },

    /// The seeker registered its invoice
    #[serde(rename_all = "camelCase")]
    SwapHolderInvoiced {
        #[serde(with = "hex32")]
        swap_id: SwapId,
        invoice: Invoice,
    },

    /// The holder registered its invoice
    #[serde(rename_all = "camelCase")]
    SwapSeekerInvoiced {
        #[serde(with = "hex32")]
        swap_id: SwapId,
        invoice: Invoice,
    },

    /// Deposited liquidity was minted on the portal chain
    AssetMinted { liquidity: Liquidity },

    /// Liquidity was burned on the portal chain for withdrawal
    AssetBurned { liquidity: Liquidity },

    /// New finalized portal block height
    BlockHeight { height: u64 },
}

/// Events emitted by a native chain adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum NativeEvent {
    Deposit { liquidity: Liquidity },

    Withdraw { liquidity: Liquidity },

    /// The holder's invoice was paid
    #[serde(rename_all = "camelCase")]
    SwapHolderPaid {
        #[serde(with = "hex32")]
        swap_id: SwapId,
        receipt: Receipt,
    },

    /// The seeker's invoice was paid
    #[serde(rename_all = "camelCase")]
    SwapSeekerPaid {
        #[serde(with = "hex32")]
        swap_id: SwapId,
        receipt: Receipt,
    },

    /// The seeker's invoice was settled, revealing the secret
    #[serde(rename_all = "camelCase")]
    SwapHolderSettled {
        #[serde(with = "hex32")]
        swap_id: SwapId,
        #[serde(with = "hex_bytes")]
        secret: Vec<u8>,
        #[serde(default)]
        receipt: Option<Receipt>,
    },

    /// The holder's invoice was settled
    #[serde(rename_all = "camelCase")]
    SwapSeekerSettled {
        #[serde(with = "hex32")]
        swap_id: SwapId,
        receipt: Receipt,
    },

    /// New finalized block height
    BlockHeight { height: u64 },
}

/// An event from any chain, as delivered on the chain manager's bus
#[derive(Debug, Clone)]
pub enum ChainEvent {
    Portal(PortalEvent),
    Native { chain: String, event: NativeEvent },
}

impl ChainEvent {
    /// Chain this event was observed on
    pub fn chain(&self) -> &str {
        match self {
            ChainEvent::Portal(_) => PORTAL_CHAIN,
            ChainEvent::Native { chain, .. } => chain,
        }
    }

    /// Event name for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::Portal(event) => match event {
                PortalEvent::SwapMatched { .. } => "swap_matched",
                PortalEvent::SwapHolderInvoiced { .. } => "swap_holder_invoiced",
                PortalEvent::SwapSeekerInvoiced { .. } => "swap_seeker_invoiced",
                PortalEvent::AssetMinted { .. } => "asset_minted",
                PortalEvent::AssetBurned { .. } => "asset_burned",
                PortalEvent::BlockHeight { .. } => "block_height",
            },
            ChainEvent::Native { event, .. } => match event {
                NativeEvent::Deposit { .. } => "deposit",
                NativeEvent::Withdraw { .. } => "withdraw",
                NativeEvent::SwapHolderPaid { .. } => "swap_holder_paid",
                NativeEvent::SwapSeekerPaid { .. } => "swap_seeker_paid",
                NativeEvent::SwapHolderSettled { .. } => "swap_holder_settled",
                NativeEvent::SwapSeekerSettled { .. } => "swap_seeker_settled",
                NativeEvent::BlockHeight { .. } => "block_height",
            },
        }
    }

    /// Swap this event refers to, if any
    pub fn swap_id(&self) -> Option<SwapId> {
        match self {
            ChainEvent::Portal(event) => match event {
                PortalEvent::SwapMatched { swap } => Some(swap.id),
                PortalEvent::SwapHolderInvoiced { swap_id, .. }
                | PortalEvent::SwapSeekerInvoiced { swap_id, .. } => Some(*swap_id),
                _ => None,
            },
            ChainEvent::Native { event, .. } => match event {
                NativeEvent::SwapHolderPaid { swap_id, .. }
                | NativeEvent::SwapSeekerPaid { swap_id, .. }
                | NativeEvent::SwapHolderSettled { swap_id, .. }
                | NativeEvent::SwapSeekerSettled { swap_id, .. } => Some(*swap_id),
                _ => None,
            },
        }
    }
}

/// Where a sink's events come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOrigin {
    Portal,
    Native(String),
}

/// Handle given to a chain adapter on start, through which it publishes
/// finalized events onto the chain manager's bus.
#[derive(Debug, Clone)]
pub struct EventSink {
    origin: EventOrigin,
    tx: broadcast::Sender<ChainEvent>,
}

impl EventSink {
    pub fn portal(tx: broadcast::Sender<ChainEvent>) -> Self {
        Self {
            origin: EventOrigin::Portal,
            tx,
        }
    }

    pub fn native(chain: impl Into<String>, tx: broadcast::Sender<ChainEvent>) -> Self {
        Self {
            origin: EventOrigin::Native(chain.into()),
            tx,
        }
    }

    pub fn origin(&self) -> &EventOrigin {
        &self.origin
    }

    /// Publish a portal chain event
    pub fn emit_portal(&self, event: PortalEvent) -> PortalResult<()> {
        match &self.origin {
            EventOrigin::Portal => {
                self.publish(ChainEvent::Portal(event));
                Ok(())
            }
            EventOrigin::Native(chain) => Err(PortalError::EventParsing(format!(
                "portal event emitted by native chain {}",
                chain
            ))),
        }
    }

    /// Publish a native chain event
    pub fn emit_native(&self, event: NativeEvent) -> PortalResult<()> {
        match &self.origin {
            EventOrigin::Native(chain) => {
                self.publish(ChainEvent::Native {
                    chain: chain.clone(),
                    event,
                });
                Ok(())
            }
            EventOrigin::Portal => Err(PortalError::EventParsing(
                "native event emitted by the portal chain".to_string(),
            )),
        }
    }

    /// Decode, validate and publish a raw adapter payload
    pub fn emit_raw(&self, raw: &RawEvent) -> PortalResult<()> {
        match &self.origin {
            EventOrigin::Portal => self.emit_portal(decode_portal(raw)?),
            EventOrigin::Native(_) => self.emit_native(decode_native(raw)?),
        }
    }

    fn publish(&self, event: ChainEvent) {
        trace!(chain = event.chain(), event = event.name(), "publishing chain event");
        // No subscribers is fine; nothing is listening yet
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_tags_native_events_with_chain() {
        let (tx, mut rx) = broadcast::channel(8);
        let sink = EventSink::native("lightning", tx);

        sink.emit_native(NativeEvent::BlockHeight { height: 42 }).unwrap();
        match rx.recv().await.unwrap() {
            ChainEvent::Native { chain, event } => {
                assert_eq!(chain, "lightning");
                assert!(matches!(event, NativeEvent::BlockHeight { height: 42 }));
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert!(sink
            .emit_portal(PortalEvent::BlockHeight { height: 1 })
            .is_err());
    }

    #[test]
    fn test_event_metadata() {
        let event = ChainEvent::Native {
            chain: "ethereum".into(),
            event: NativeEvent::SwapSeekerPaid {
                swap_id: [3u8; 32],
                receipt: Receipt {
                    id: "0xabc".into(),
                    detail: None,
                },
            },
        };
        assert_eq!(event.name(), "swap_seeker_paid");
        assert_eq!(event.chain(), "ethereum");
        assert_eq!(event.swap_id(), Some([3u8; 32]));

        let height = ChainEvent::Portal(PortalEvent::BlockHeight { height: 9 });
        assert_eq!(height.chain(), PORTAL_CHAIN);
        assert_eq!(height.swap_id(), None);
    }
}
