//! Swap progress states and the diffs that advance them

use super::party::{Invoice, Receipt};
use super::secret::hex_bytes;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered swap progress.
///
/// The numeric order is the canonical progress measure: transitions only
/// ever move to the immediate successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum SwapState {
    Matched = 0,
    HolderInvoiced = 1,
    SeekerInvoiced = 2,
    HolderPaid = 3,
    SeekerPaid = 4,
    HolderSettled = 5,
    SeekerSettled = 6,
}

impl SwapState {
    pub const ALL: [SwapState; 7] = [
        SwapState::Matched,
        SwapState::HolderInvoiced,
        SwapState::SeekerInvoiced,
        SwapState::HolderPaid,
        SwapState::SeekerPaid,
        SwapState::HolderSettled,
        SwapState::SeekerSettled,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// The single state that directly follows this one
    pub fn next(self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    /// Check if `other` is the immediate successor of this state
    pub fn is_followed_by(self, other: SwapState) -> bool {
        self.next() == Some(other)
    }

    pub fn is_terminal(self) -> bool {
        self == SwapState::SeekerSettled
    }

    pub fn name(self) -> &'static str {
        match self {
            SwapState::Matched => "matched",
            SwapState::HolderInvoiced => "holderInvoiced",
            SwapState::SeekerInvoiced => "seekerInvoiced",
            SwapState::HolderPaid => "holderPaid",
            SwapState::SeekerPaid => "seekerPaid",
            SwapState::HolderSettled => "holderSettled",
            SwapState::SeekerSettled => "seekerSettled",
        }
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Incremental update to a swap, carrying only the fields of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SwapDiff {
    /// The seeker's invoice was registered; the holder now owes it
    HolderInvoiced { invoice: Invoice },
    /// The holder's invoice was registered; the seeker now owes it
    SeekerInvoiced { invoice: Invoice },
    /// The holder's invoice was paid
    HolderPaid { receipt: Receipt },
    /// The seeker's invoice was paid
    SeekerPaid { receipt: Receipt },
    /// The seeker's invoice was settled, revealing the secret
    HolderSettled {
        #[serde(with = "hex_bytes")]
        secret: Vec<u8>,
        #[serde(default)]
        receipt: Option<Receipt>,
    },
    /// The holder's invoice was settled
    SeekerSettled { receipt: Receipt },
}

impl SwapDiff {
    /// The state this diff asserts
    pub fn state(&self) -> SwapState {
        match self {
            SwapDiff::HolderInvoiced { .. } => SwapState::HolderInvoiced,
            SwapDiff::SeekerInvoiced { .. } => SwapState::SeekerInvoiced,
            SwapDiff::HolderPaid { .. } => SwapState::HolderPaid,
            SwapDiff::SeekerPaid { .. } => SwapState::SeekerPaid,
            SwapDiff::HolderSettled { .. } => SwapState::HolderSettled,
            SwapDiff::SeekerSettled { .. } => SwapState::SeekerSettled,
        }
    }
}
