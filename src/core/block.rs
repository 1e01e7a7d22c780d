// Block data structures

use crate::consensus::ProofOfWork;
use crate::core::serialize::{read_hash, read_i64_le, read_u64_le, read_varint, write_varint};
use crate::core::{sha256, Hash256, Serializable, Transaction};
use crate::error::{CodecError, Result};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

/// Block - a sealed, timestamped batch of transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Unix seconds at construction
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    /// Hash of the previous block; None for genesis
    pub prev_hash: Option<Hash256>,
    pub hash: Hash256,
    pub nonce: u64,
}

impl Block {
    /// Build a block on `prev_hash` and run proof-of-work over it
    pub fn new(
        transactions: Vec<Transaction>,
        prev_hash: Option<Hash256>,
        pow: &ProofOfWork,
    ) -> Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let digest = Self::calculate_merkle_root(&transactions);
        let result = pow.run(prev_hash.as_ref(), &digest, timestamp)?;

        log::debug!(
            "Sealed block {} after {} attempts ({:.0} H/s)",
            result.hash,
            result.attempts,
            result.hash_rate()
        );

        Ok(Self {
            timestamp,
            transactions,
            prev_hash,
            hash: result.hash,
            nonce: result.nonce,
        })
    }

    /// First block of a chain, carrying a single coinbase
    pub fn genesis(coinbase: Transaction, pow: &ProofOfWork) -> Result<Self> {
        Self::new(vec![coinbase], None, pow)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }

    pub fn transactions_digest(&self) -> Hash256 {
        Self::calculate_merkle_root(&self.transactions)
    }

    /// Merkle root over transaction ids (single SHA256 per node)
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash256 {
        if transactions.is_empty() {
            return Hash256::zero();
        }

        let mut hashes: Vec<Hash256> = transactions.iter().map(|tx| tx.id).collect();

        while hashes.len() > 1 {
            let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));

            for chunk in hashes.chunks(2) {
                let left = chunk[0];
                let right = if chunk.len() == 2 { chunk[1] } else { chunk[0] };

                let mut combined = Vec::with_capacity(64);
                combined.extend_from_slice(left.as_bytes());
                combined.extend_from_slice(right.as_bytes());
                next_level.push(sha256(&combined));
            }

            hashes = next_level;
        }

        hashes[0]
    }

    /// prev_hash ++ digest ++ timestamp, the part of the header fixed
    /// during a nonce search
    pub fn header_prefix(prev_hash: Option<&Hash256>, digest: &Hash256, timestamp: i64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 32 + 8 + 8);
        if let Some(prev) = prev_hash {
            buf.extend_from_slice(prev.as_bytes());
        }
        buf.extend_from_slice(digest.as_bytes());
        buf.extend_from_slice(&timestamp.to_be_bytes());
        buf
    }

    /// Bytes hashed for proof-of-work
    pub fn header_bytes(
        prev_hash: Option<&Hash256>,
        digest: &Hash256,
        timestamp: i64,
        nonce: u64,
    ) -> Vec<u8> {
        let mut buf = Self::header_prefix(prev_hash, digest, timestamp);
        buf.extend_from_slice(&nonce.to_be_bytes());
        buf
    }
}

impl Serializable for Block {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        match &self.prev_hash {
            Some(prev) => {
                buf.push(1);
                buf.extend_from_slice(prev.as_bytes());
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());

        write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.serialize());
        }

        buf
    }

    fn from_reader<R: Read>(reader: &mut R) -> std::result::Result<Self, CodecError> {
        let timestamp = read_i64_le(reader)?;

        let mut flag = [0u8; 1];
        reader.read_exact(&mut flag)?;
        let prev_hash = match flag[0] {
            0 => None,
            _ => Some(read_hash(reader)?),
        };

        let hash = read_hash(reader)?;
        let nonce = read_u64_le(reader)?;

        let tx_count = read_varint(reader)?;
        let mut transactions = Vec::new();
        for _ in 0..tx_count {
            transactions.push(Transaction::from_reader(reader)?);
        }

        Ok(Self {
            timestamp,
            transactions,
            prev_hash,
            hash,
            nonce,
        })
    }
}
