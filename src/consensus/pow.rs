// Proof of Work implementation

use crate::core::{sha256, Block, Hash256};
use crate::error::{ChainError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of leading zero bits required of a block hash
pub const DEFAULT_DIFFICULTY: u32 = 24;

/// Difficulty target: a hash is valid when, read as a big-endian
/// integer, it is strictly below 2^(256 - difficulty)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// None when difficulty is zero and every hash is accepted
    bound: Option<Hash256>,
}

impl Target {
    pub fn from_difficulty(difficulty: u32) -> Result<Self> {
        if difficulty > 256 {
            return Err(ChainError::Config(format!(
                "difficulty {} exceeds 256 bits",
                difficulty
            )));
        }

        let bound = (difficulty > 0).then(|| {
            let bit = 256 - difficulty as usize;
            let mut bytes = [0u8; 32];
            bytes[31 - bit / 8] = 1 << (bit % 8);
            Hash256::new(bytes)
        });

        Ok(Self { bound })
    }

    /// Check if a hash meets this target (hash < target)
    #[inline]
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        match &self.bound {
            // Hash256 orders bytewise, which is big-endian integer order
            Some(bound) => hash < bound,
            None => true,
        }
    }
}

/// Outcome of a successful nonce search
#[derive(Debug)]
pub struct MiningResult {
    pub nonce: u64,
    pub hash: Hash256,
    pub attempts: u64,
    pub duration: Duration,
}

impl MiningResult {
    /// Hashes per second
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}

/// Nonce search over a block header with a fixed target
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: Target,
    max_nonce: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl ProofOfWork {
    pub fn new(difficulty: u32, max_nonce: u64) -> Result<Self> {
        Ok(Self {
            target: Target::from_difficulty(difficulty)?,
            max_nonce,
            cancel: None,
        })
    }

    /// Abort the search once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Search nonces 0..=max_nonce for a hash below the target
    pub fn run(
        &self,
        prev_hash: Option<&Hash256>,
        transactions_digest: &Hash256,
        timestamp: i64,
    ) -> Result<MiningResult> {
        let start_time = Instant::now();
        let mut header = Block::header_prefix(prev_hash, transactions_digest, timestamp);
        let prefix_len = header.len();
        let mut attempts = 0u64;

        for nonce in 0..=self.max_nonce {
            if self.is_cancelled() {
                return Err(ChainError::MiningCancelled);
            }

            header.truncate(prefix_len);
            header.extend_from_slice(&nonce.to_be_bytes());
            let hash = sha256(&header);
            attempts += 1;

            if self.target.is_met_by(&hash) {
                return Ok(MiningResult {
                    nonce,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                });
            }

            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        Err(ChainError::MiningExhausted(attempts))
    }

    /// Recompute a sealed block's header hash and check it against the target
    pub fn validate(&self, block: &Block) -> bool {
        let digest = block.transactions_digest();
        let header = Block::header_bytes(block.prev_hash.as_ref(), &digest, block.timestamp, block.nonce);
        let hash = sha256(&header);
        hash == block.hash && self.target.is_met_by(&hash)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
