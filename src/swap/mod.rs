//! Swap aggregate and its state machine
//!
//! A `Swap` is the authoritative in-memory record of one swap's progress.
//! It is only ever mutated through `update` (one diff, one step forward) or
//! `update_from_swap` (merging a newer snapshot of the same swap); both
//! validate the transition and the secret binding before touching anything.

mod party;
mod secret;
mod state;

pub use party::{Invoice, Leg, Liquidity, Party, Receipt, Role};
pub use secret::{generate_secret, hash_secret, parse_hex32, verify_secret, SecretHash, SwapId};
pub use state::{SwapDiff, SwapState};

pub(crate) use secret::{hex32, hex_bytes, hex_bytes_opt};

use crate::error::{PortalError, PortalResult};

use serde::{Deserialize, Serialize};

/// One atomic swap between a secret holder and a secret seeker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    #[serde(with = "hex32")]
    pub id: SwapId,
    #[serde(with = "hex32")]
    pub secret_hash: SecretHash,
    pub state: SwapState,
    pub secret_holder: Party,
    pub secret_seeker: Party,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    secret: Option<Vec<u8>>,
}

impl PartialEq for Swap {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Swap {}

impl Swap {
    /// Create a swap in the `matched` state
    pub fn new(id: SwapId, secret_hash: SecretHash, secret_holder: Party, secret_seeker: Party) -> Self {
        Self {
            id,
            secret_hash,
            state: SwapState::Matched,
            secret_holder,
            secret_seeker,
            secret: None,
        }
    }

    /// Hex form of the swap id, for logs and errors
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// The revealed secret, once a verified preimage has been applied
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    /// Check a secret that arrived with a deserialized swap against its hash
    pub fn check_secret(&self) -> PortalResult<()> {
        match &self.secret {
            Some(secret) if !verify_secret(secret, &self.secret_hash) => {
                Err(PortalError::SecretMismatch {
                    secret_hash: hex::encode(self.secret_hash),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn has_party(&self, address: &str) -> bool {
        self.is_secret_holder(address) || self.is_secret_seeker(address)
    }

    pub fn is_secret_holder(&self, address: &str) -> bool {
        self.secret_holder.is(address)
    }

    pub fn is_secret_seeker(&self, address: &str) -> bool {
        self.secret_seeker.is(address)
    }

    /// Role played by `address` in this swap, if any
    pub fn role_of(&self, address: &str) -> Option<Role> {
        if self.is_secret_holder(address) {
            Some(Role::Holder)
        } else if self.is_secret_seeker(address) {
            Some(Role::Seeker)
        } else {
            None
        }
    }

    pub fn party(&self, role: Role) -> &Party {
        match role {
            Role::Holder => &self.secret_holder,
            Role::Seeker => &self.secret_seeker,
        }
    }

    /// The party in the context of this swap, for native chain calls
    pub fn leg(&self, role: Role) -> Leg {
        Leg {
            swap_id: self.id,
            secret_hash: self.secret_hash,
            role,
            party: self.party(role).clone(),
        }
    }

    /// Apply a diff that moves the swap exactly one state forward.
    ///
    /// On error the swap is left untouched.
    pub fn update(&mut self, diff: &SwapDiff) -> PortalResult<()> {
        let target = diff.state();
        if !self.state.is_followed_by(target) {
            return Err(PortalError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }

        match diff {
            SwapDiff::HolderInvoiced { invoice } => {
                self.secret_seeker.invoice = Some(invoice.clone());
            }
            SwapDiff::SeekerInvoiced { invoice } => {
                self.secret_holder.invoice = Some(invoice.clone());
            }
            SwapDiff::HolderPaid { receipt } => {
                self.secret_holder.receipt = Some(receipt.clone());
            }
            SwapDiff::SeekerPaid { receipt } => {
                self.secret_seeker.receipt = Some(receipt.clone());
            }
            SwapDiff::HolderSettled { secret, receipt } => {
                self.set_secret(secret)?;
                if let Some(receipt) = receipt {
                    self.secret_seeker.receipt = Some(receipt.clone());
                }
            }
            SwapDiff::SeekerSettled { receipt } => {
                self.secret_holder.receipt = Some(receipt.clone());
            }
        }

        self.state = target;
        Ok(())
    }

    /// Merge a remote snapshot of the same swap.
    ///
    /// Returns `Ok(false)` when the snapshot is not ahead of the local state.
    pub fn update_from_swap(&mut self, remote: &Swap) -> PortalResult<bool> {
        if remote.id != self.id || remote.secret_hash != self.secret_hash {
            return Err(PortalError::invalid_swap(
                self.id_hex(),
                format!("snapshot {} does not describe this swap", remote.id_hex()),
            ));
        }
        if remote.state <= self.state {
            return Ok(false);
        }
        if let Some(secret) = remote.secret() {
            self.set_secret(secret)?;
        }

        merge_party(&mut self.secret_holder, &remote.secret_holder);
        merge_party(&mut self.secret_seeker, &remote.secret_seeker);
        self.state = remote.state;
        Ok(true)
    }

    fn set_secret(&mut self, secret: &[u8]) -> PortalResult<()> {
        if !verify_secret(secret, &self.secret_hash) {
            return Err(PortalError::SecretMismatch {
                secret_hash: hex::encode(self.secret_hash),
            });
        }
        match &self.secret {
            Some(existing) if existing.as_slice() != secret => Err(PortalError::invalid_swap(
                self.id_hex(),
                "secret already set to a different value",
            )),
            _ => {
                self.secret = Some(secret.to_vec());
                Ok(())
            }
        }
    }
}

fn merge_party(local: &mut Party, remote: &Party) {
    if local.invoice.is_none() {
        local.invoice = remote.invoice.clone();
    }
    if remote.receipt.is_some() {
        local.receipt = remote.receipt.clone();
    }
}

/// Swap request submitted to the portal chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOrder {
    pub secret_holder: Party,
    pub secret_seeker: Party,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const HOLDER: &str = "0xHolder00000000000000000000000000000000aa";
    pub const SEEKER: &str = "0xSeeker00000000000000000000000000000000bb";
    pub const SECRET: &[u8] = b"correct horse battery staple";

    pub fn sample_swap() -> Swap {
        Swap::new(
            [7u8; 32],
            hash_secret(SECRET),
            Party::new(HOLDER, "ethereum", "ETH", "0xc0ffee", 1_000_000),
            Party::new(SEEKER, "lightning", "BTC", "", 50_000),
        )
    }

    fn invoice(id: &str) -> Invoice {
        Invoice {
            id: id.to_string(),
            request: format!("req-{id}"),
        }
    }

    fn receipt(id: &str) -> Receipt {
        Receipt {
            id: id.to_string(),
            detail: None,
        }
    }

    /// Diffs for every transition, in order
    pub fn full_diffs() -> Vec<SwapDiff> {
        vec![
            SwapDiff::HolderInvoiced { invoice: invoice("seeker-inv") },
            SwapDiff::SeekerInvoiced { invoice: invoice("holder-inv") },
            SwapDiff::HolderPaid { receipt: receipt("pay-1") },
            SwapDiff::SeekerPaid { receipt: receipt("pay-2") },
            SwapDiff::HolderSettled {
                secret: SECRET.to_vec(),
                receipt: Some(receipt("settle-1")),
            },
            SwapDiff::SeekerSettled { receipt: receipt("settle-2") },
        ]
    }

    /// Advance a fresh swap to `state`
    pub fn swap_at(state: SwapState) -> Swap {
        let mut swap = sample_swap();
        for diff in full_diffs() {
            if swap.state == state {
                break;
            }
            swap.update(&diff).unwrap();
        }
        swap
    }

    #[test]
    fn test_update_succeeds_only_for_immediate_successor() {
        let diffs = full_diffs();
        for current in SwapState::ALL {
            for diff in &diffs {
                let mut swap = swap_at(current);
                let result = swap.update(diff);
                if current.is_followed_by(diff.state()) {
                    assert!(result.is_ok(), "{current} -> {}", diff.state());
                    assert_eq!(swap.state, diff.state());
                } else {
                    assert!(matches!(result, Err(PortalError::InvalidTransition { .. })));
                    assert_eq!(swap.state, current);
                }
            }
        }
    }

    #[test]
    fn test_full_lifecycle_fills_slots() {
        let swap = swap_at(SwapState::SeekerSettled);
        assert_eq!(swap.secret_seeker.invoice.as_ref().unwrap().id, "seeker-inv");
        assert_eq!(swap.secret_holder.invoice.as_ref().unwrap().id, "holder-inv");
        assert_eq!(swap.secret_seeker.receipt.as_ref().unwrap().id, "settle-1");
        assert_eq!(swap.secret_holder.receipt.as_ref().unwrap().id, "settle-2");
        assert_eq!(swap.secret(), Some(SECRET));
        assert!(swap.state.is_terminal());
    }

    #[test]
    fn test_secret_binding() {
        let mut swap = swap_at(SwapState::SeekerPaid);
        let wrong = SwapDiff::HolderSettled {
            secret: b"not the secret".to_vec(),
            receipt: None,
        };
        assert!(matches!(swap.update(&wrong), Err(PortalError::SecretMismatch { .. })));
        assert_eq!(swap.secret(), None);
        assert_eq!(swap.state, SwapState::SeekerPaid);

        let right = SwapDiff::HolderSettled {
            secret: SECRET.to_vec(),
            receipt: None,
        };
        swap.update(&right).unwrap();
        assert_eq!(swap.secret(), Some(SECRET));
        assert_eq!(swap.state, SwapState::HolderSettled);
    }

    #[test]
    fn test_decoded_secret_checked_against_hash() {
        let mut json = serde_json::to_value(swap_at(SwapState::HolderSettled)).unwrap();
        let swap: Swap = serde_json::from_value(json.clone()).unwrap();
        assert!(swap.check_secret().is_ok());

        json["secret"] = serde_json::Value::String(hex::encode(b"forged preimage"));
        let forged: Swap = serde_json::from_value(json).unwrap();
        assert!(matches!(
            forged.check_secret(),
            Err(PortalError::SecretMismatch { .. })
        ));

        // A snapshot carrying a forged secret never merges into a local swap
        let mut local = swap_at(SwapState::SeekerPaid);
        assert!(local.update_from_swap(&forged).is_err());
        assert_eq!(local.secret(), None);
        assert_eq!(local.state, SwapState::SeekerPaid);
    }

    #[test]
    fn test_transition_checked_before_secret() {
        let mut swap = swap_at(SwapState::HolderPaid);
        let diff = SwapDiff::HolderSettled {
            secret: SECRET.to_vec(),
            receipt: None,
        };
        assert!(matches!(swap.update(&diff), Err(PortalError::InvalidTransition { .. })));
        assert_eq!(swap.secret(), None);
    }

    #[test]
    fn test_roles_and_equality() {
        let swap = sample_swap();
        assert!(swap.is_secret_holder(&HOLDER.to_lowercase()));
        assert!(swap.is_secret_seeker(&SEEKER.to_uppercase()));
        assert!(!swap.has_party("0xsomeoneelse"));
        assert_eq!(swap.role_of(SEEKER), Some(Role::Seeker));
        assert_eq!(swap.role_of("0xnobody"), None);

        let mut other = swap_at(SwapState::HolderPaid);
        assert_eq!(swap, other);
        other.id = [8u8; 32];
        assert_ne!(swap, other);
    }

    #[test]
    fn test_update_from_swap() {
        let mut local = sample_swap();
        let remote = swap_at(SwapState::HolderSettled);
        assert!(local.update_from_swap(&remote).unwrap());
        assert_eq!(local.state, SwapState::HolderSettled);
        assert_eq!(local.secret(), Some(SECRET));
        assert!(local.secret_holder.invoice.is_some());

        // A snapshot that is not ahead is ignored
        let stale = swap_at(SwapState::HolderPaid);
        assert!(!local.update_from_swap(&stale).unwrap());
        assert_eq!(local.state, SwapState::HolderSettled);

        let mut foreign = swap_at(SwapState::SeekerSettled);
        foreign.id = [9u8; 32];
        assert!(matches!(
            local.update_from_swap(&foreign),
            Err(PortalError::InvalidSwap { .. })
        ));
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let swap = swap_at(SwapState::HolderSettled);
        let json = serde_json::to_string(&swap).unwrap();
        let decoded: Swap = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.state, SwapState::HolderSettled);
        assert_eq!(decoded.secret(), Some(SECRET));
        assert_eq!(decoded.secret_hash, swap.secret_hash);
    }
}
