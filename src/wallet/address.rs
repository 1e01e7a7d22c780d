// Address derivation and validation
//
// address = Base58(version ++ RIPEMD160(SHA256(pub_key)) ++ checksum)

use crate::core::{double_sha256, hash160};
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address version byte
pub const VERSION: u8 = 0x00;
/// Trailing checksum length in bytes
pub const ADDRESS_CHECKSUM_LEN: usize = 4;
/// Length of a public key hash
pub const PUB_KEY_HASH_LEN: usize = 20;

/// RIPEMD160(SHA256(pub_key))
pub fn hash_pub_key(pub_key: &[u8]) -> [u8; PUB_KEY_HASH_LEN] {
    hash160(pub_key)
}

/// First four bytes of SHA256(SHA256(payload))
pub fn checksum(payload: &[u8]) -> [u8; ADDRESS_CHECKSUM_LEN] {
    let hash = double_sha256(payload);
    let mut sum = [0u8; ADDRESS_CHECKSUM_LEN];
    sum.copy_from_slice(&hash[..ADDRESS_CHECKSUM_LEN]);
    sum
}

/// Check that an address decodes and carries a matching checksum
pub fn validate_address(address: &str) -> bool {
    Address::new(address).decode().is_ok()
}

/// Base58Check-encoded address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Encode a public key hash
    pub fn from_pub_key_hash(pub_key_hash: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + ADDRESS_CHECKSUM_LEN);
        payload.push(VERSION);
        payload.extend_from_slice(pub_key_hash);
        let sum = checksum(&payload);
        payload.extend_from_slice(&sum);
        Self(bs58::encode(payload).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.decode().is_ok()
    }

    /// Recover the public key hash, verifying the checksum
    pub fn to_pub_key_hash(&self) -> Result<Vec<u8>> {
        self.decode()
    }

    fn decode(&self) -> Result<Vec<u8>> {
        let payload = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", self.0, e)))?;

        if payload.len() <= 1 + ADDRESS_CHECKSUM_LEN {
            return Err(ChainError::InvalidAddress(format!("{}: too short", self.0)));
        }

        let (versioned, actual) = payload.split_at(payload.len() - ADDRESS_CHECKSUM_LEN);
        if checksum(versioned) != actual {
            return Err(ChainError::InvalidAddress(format!("{}: checksum mismatch", self.0)));
        }

        if versioned.len() != 1 + PUB_KEY_HASH_LEN {
            return Err(ChainError::InvalidAddress(format!(
                "{}: payload of {} bytes",
                self.0,
                versioned.len() - 1
            )));
        }
        if versioned[0] != VERSION {
            return Err(ChainError::InvalidAddress(format!(
                "{}: unknown version {:#04x}",
                self.0, versioned[0]
            )));
        }

        Ok(versioned[1..].to_vec())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
