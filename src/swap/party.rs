//! Swap parties, invoices and liquidity

use super::secret::{hex32, SecretHash, SwapId};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment request issued on a party's native chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Chain-local identifier, used to look up the invoice's HTLC timeout
    pub id: String,
    /// Opaque chain-specific payment request
    pub request: String,
}

/// Proof of payment or settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One side of a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Identity on the portal chain
    pub portal_address: String,
    /// Ledger name, e.g. `ethereum` or `lightning`
    pub chain: String,
    pub symbol: String,
    pub contract_address: String,
    #[serde(with = "amount")]
    pub amount: u128,
    #[serde(default)]
    pub invoice: Option<Invoice>,
    #[serde(default)]
    pub receipt: Option<Receipt>,
}

impl Party {
    pub fn new(
        portal_address: impl Into<String>,
        chain: impl Into<String>,
        symbol: impl Into<String>,
        contract_address: impl Into<String>,
        amount: u128,
    ) -> Self {
        Self {
            portal_address: portal_address.into(),
            chain: chain.into(),
            symbol: symbol.into(),
            contract_address: contract_address.into(),
            amount,
            invoice: None,
            receipt: None,
        }
    }

    /// Case-insensitive address comparison
    pub fn is(&self, address: &str) -> bool {
        self.portal_address.eq_ignore_ascii_case(address)
    }
}

/// Role of a party within a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Holder,
    Seeker,
}

impl Role {
    pub fn counterparty(self) -> Role {
        match self {
            Role::Holder => Role::Seeker,
            Role::Seeker => Role::Holder,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Holder => f.write_str("secretHolder"),
            Role::Seeker => f.write_str("secretSeeker"),
        }
    }
}

/// A party in the context of its swap, as handed to native chain adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leg {
    #[serde(with = "hex32")]
    pub swap_id: SwapId,
    #[serde(with = "hex32")]
    pub secret_hash: SecretHash,
    pub role: Role,
    pub party: Party,
}

/// Funds moved between a native chain and the portal chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liquidity {
    pub chain: String,
    pub symbol: String,
    /// Portal address credited with the minted asset
    pub owner: String,
    #[serde(with = "amount")]
    pub amount: u128,
    #[serde(default)]
    pub receipt: Option<Receipt>,
}

/// Amounts travel as decimal strings; plain JSON numbers are accepted on input.
pub(crate) mod amount {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = u128;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer amount")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
                Ok(v as u128)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
                u128::try_from(v).map_err(|_| E::custom(format!("negative amount {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
                v.parse::<u128>().map_err(|e| E::custom(format!("invalid amount {v}: {e}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
