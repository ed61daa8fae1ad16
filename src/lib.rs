//! Portal Relayer - cross-chain HTLC atomic swap coordination
//!
//! The relayer follows swaps on the Portal chain and drives the local
//! party's side of each one on the native chains: creating and registering
//! invoices, paying the counterparty once its timeout is safe, and settling
//! with the swap secret.
//!
//! Hosts provide the chain adapters ([`NativeChain`], [`PortalChain`]) and a
//! [`SwapStore`]; [`runtime::Relayer`] wires them together.

pub mod api;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod metrics;
pub mod runtime;
pub mod state;
pub mod swap;
pub mod tx;

pub use chain::{ChainManager, ChainParams, NativeChain, PortalChain};
pub use config::Settings;
pub use coordination::{Orchestrator, SwapNotification};
pub use error::{PortalError, PortalResult};
pub use events::{ChainEvent, EventSink, NativeEvent, PortalEvent};
pub use runtime::Relayer;
pub use state::{MemoryStore, SwapStore};
pub use swap::{Party, Swap, SwapState};
