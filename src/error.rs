//! Error types for the Portal relayer

use thiserror::Error;

/// Main error type for swap coordination
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown chain: {chain}")]
    InvalidChain { chain: String },

    #[error("Asset {symbol} not found on the portal chain")]
    InvalidAsset { symbol: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid swap {swap_id}: {message}")]
    InvalidSwap { swap_id: String, message: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Secret does not match hash {secret_hash}")]
    SecretMismatch { secret_hash: String },

    #[error(
        "Unsafe counterparty timeout for swap {swap_id}: {reason} \
         (required buffer {required_secs}s, actual {actual_secs}s)"
    )]
    UnsafeTimeout {
        swap_id: String,
        reason: String,
        required_secs: i64,
        actual_secs: i64,
    },

    #[error("Insufficient balance on chain {chain}: have {have}, need {need}")]
    InsufficientBalance {
        chain: String,
        have: String,
        need: String,
    },

    #[error("Invalid receipt: {0}")]
    InvalidReceipt(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Native chain {chain} error during {operation}: {message}")]
    NativeChain {
        chain: String,
        operation: String,
        message: String,
    },

    #[error("Portal chain error during {operation}: {message}")]
    PortalChain { operation: String, message: String },

    #[error("Instance unavailable: {0}")]
    InstanceUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Event parsing error: {0}")]
    EventParsing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Stable kind label, used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Config(_) => "config",
            PortalError::InvalidChain { .. } => "invalid-chain",
            PortalError::InvalidAsset { .. } => "invalid-asset",
            PortalError::InvalidAmount(_) => "invalid-amount",
            PortalError::InvalidOrder(_) => "invalid-order",
            PortalError::InvalidSwap { .. } => "invalid-swap",
            PortalError::InvalidTransition { .. } => "invalid-transition",
            PortalError::SecretMismatch { .. } => "secret-mismatch",
            PortalError::UnsafeTimeout { .. } => "unsafe-timeout",
            PortalError::InsufficientBalance { .. } => "insufficient-balance",
            PortalError::InvalidReceipt(_) => "invalid-receipt",
            PortalError::Timeout { .. } => "timed-out",
            PortalError::NativeChain { .. } => "native-chain-error",
            PortalError::PortalChain { .. } => "portal-chain-error",
            PortalError::InstanceUnavailable(_) => "instance-unavailable",
            PortalError::Store(_) => "store",
            PortalError::EventParsing(_) => "event-parsing",
            PortalError::Internal(_) => "internal",
        }
    }

    /// Chain the error originated on, if any
    pub fn chain(&self) -> Option<&str> {
        match self {
            PortalError::InvalidChain { chain }
            | PortalError::InsufficientBalance { chain, .. }
            | PortalError::NativeChain { chain, .. } => Some(chain),
            _ => None,
        }
    }

    /// Check if the error halts the swap leg it occurred on.
    ///
    /// Halting errors mark the swap failed and are never retried: retrying a
    /// timing-unsafe or contract-violating action could still be unsafe, and
    /// chain failures reaching this layer have already exhausted the
    /// adapter's own retries.
    pub fn halts_swap(&self) -> bool {
        matches!(
            self,
            PortalError::InvalidChain { .. }
                | PortalError::InvalidSwap { .. }
                | PortalError::InvalidTransition { .. }
                | PortalError::SecretMismatch { .. }
                | PortalError::UnsafeTimeout { .. }
                | PortalError::InsufficientBalance { .. }
                | PortalError::InvalidReceipt(_)
                | PortalError::NativeChain { .. }
                | PortalError::PortalChain { .. }
        )
    }

    pub(crate) fn invalid_swap(swap_id: impl Into<String>, message: impl Into<String>) -> Self {
        PortalError::InvalidSwap {
            swap_id: swap_id.into(),
            message: message.into(),
        }
    }
}

/// Result type for relayer operations
pub type PortalResult<T> = Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halting_classification() {
        let unsafe_timeout = PortalError::UnsafeTimeout {
            swap_id: "ab".into(),
            reason: "gap too small".into(),
            required_secs: 72,
            actual_secs: 10,
        };
        assert!(unsafe_timeout.halts_swap());
        assert!(PortalError::InvalidTransition {
            from: "matched".into(),
            to: "holderPaid".into()
        }
        .halts_swap());

        assert!(!PortalError::Store("disk full".into()).halts_swap());
        assert!(!PortalError::Timeout {
            operation: "deposit".into()
        }
        .halts_swap());
        assert!(!PortalError::InstanceUnavailable("stopped".into()).halts_swap());
    }

    #[test]
    fn test_chain_context() {
        let err = PortalError::NativeChain {
            chain: "lightning".into(),
            operation: "pay_invoice".into(),
            message: "no route".into(),
        };
        assert_eq!(err.chain(), Some("lightning"));
        assert_eq!(err.kind(), "native-chain-error");
        assert_eq!(PortalError::Internal("x".into()).chain(), None);
    }
}
