//! Secret generation and hash binding

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Swap identifier as assigned by the portal chain
pub type SwapId = [u8; 32];

/// SHA-256 of the swap secret, binding the HTLC on both chains
pub type SecretHash = [u8; 32];

const SECRET_LEN: usize = 32;

/// Hash a secret (preimage)
pub fn hash_secret(secret: &[u8]) -> SecretHash {
    let digest = Sha256::digest(secret);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// Check that a preimage hashes to the expected secret hash
pub fn verify_secret(secret: &[u8], secret_hash: &SecretHash) -> bool {
    !secret.is_empty() && hash_secret(secret) == *secret_hash
}

/// Generate a fresh random secret and its hash
pub fn generate_secret() -> (Vec<u8>, SecretHash) {
    let mut secret = vec![0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    let hash = hash_secret(&secret);
    (secret, hash)
}

/// Parse a 32-byte hex identifier, with or without `0x` prefix
pub fn parse_hex32(input: &str) -> Option<[u8; 32]> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed).ok()?;
    bytes.try_into().ok()
}

/// Serde adapter for 32-byte identifiers as hex strings
pub(crate) mod hex32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_hex32(&s).ok_or_else(|| D::Error::custom(format!("invalid 32-byte hex: {s}")))
    }
}

/// Serde adapter for byte strings as hex
pub(crate) mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom)
    }
}

/// Serde adapter for optional byte strings as hex
pub(crate) mod hex_bytes_opt {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom))
            .transpose()
    }
}
