//! Notifications published by the orchestrator

use crate::error::PortalError;
use crate::swap::{Liquidity, Swap, SwapId, SwapState};

/// Outcome of handling chain events, for hosts and waiters
#[derive(Debug, Clone)]
pub enum SwapNotification {
    /// A swap advanced, possibly by several states at once
    Transitioned {
        swap_id: SwapId,
        from: SwapState,
        to: SwapState,
    },
    /// A swap reached `seekerSettled`
    Completed { swap: Swap },
    /// A swap was halted and marked failed
    Failed { swap_id: SwapId, error: PortalError },
    /// Liquidity deposited by the local party was minted on the portal chain
    Deposited { liquidity: Liquidity },
    /// Liquidity was withdrawn to the local party on a native chain
    Withdrawn { liquidity: Liquidity },
    /// Any error raised while handling an event
    Error {
        swap_id: Option<SwapId>,
        error: PortalError,
    },
}

impl SwapNotification {
    pub fn swap_id(&self) -> Option<SwapId> {
        match self {
            SwapNotification::Transitioned { swap_id, .. }
            | SwapNotification::Failed { swap_id, .. } => Some(*swap_id),
            SwapNotification::Completed { swap } => Some(swap.id),
            SwapNotification::Error { swap_id, .. } => *swap_id,
            SwapNotification::Deposited { .. } | SwapNotification::Withdrawn { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SwapNotification::Transitioned { .. } => "transitioned",
            SwapNotification::Completed { .. } => "completed",
            SwapNotification::Failed { .. } => "failed",
            SwapNotification::Deposited { .. } => "deposited",
            SwapNotification::Withdrawn { .. } => "withdrawn",
            SwapNotification::Error { .. } => "error",
        }
    }
}
