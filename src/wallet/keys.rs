// Key material (P-256)

use crate::error::{ChainError, Result};
use crate::wallet::address::{hash_pub_key, Address, PUB_KEY_HASH_LEN};
use p256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;

/// Width of one affine coordinate in bytes
pub const COORDINATE_LEN: usize = 32;
/// Raw public key: X ++ Y, each zero padded to COORDINATE_LEN
pub const PUBLIC_KEY_LEN: usize = 2 * COORDINATE_LEN;
/// Raw signature: r ++ s, each zero padded to COORDINATE_LEN
pub const SIGNATURE_LEN: usize = 2 * COORDINATE_LEN;

/// SEC1 tag for an uncompressed point
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Encode a verifying key as fixed-width X ++ Y
pub fn encode_public_key(key: &VerifyingKey) -> Vec<u8> {
    let point = key.to_encoded_point(false);
    // Uncompressed SEC1 points are always tag ++ X ++ Y at full width
    point.as_bytes()[1..].to_vec()
}

/// Decode fixed-width X ++ Y; None when the bytes are not a curve point
pub fn decode_public_key(bytes: &[u8]) -> Option<VerifyingKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return None;
    }
    let mut sec1 = Vec::with_capacity(PUBLIC_KEY_LEN + 1);
    sec1.push(UNCOMPRESSED_TAG);
    sec1.extend_from_slice(bytes);
    VerifyingKey::from_sec1_bytes(&sec1).ok()
}

/// A keypair able to receive and spend outputs
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

impl Wallet {
    /// Generate a fresh keypair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| ChainError::Wallet(format!("Invalid secret key: {}", e)))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = encode_public_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn pub_key_hash(&self) -> [u8; PUB_KEY_HASH_LEN] {
        hash_pub_key(&self.public_key)
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key_hash(&self.pub_key_hash())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
