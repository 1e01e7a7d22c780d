// Stored block validation

use crate::consensus::pow::ProofOfWork;
use crate::core::{Block, Hash256};
use thiserror::Error;

/// Reasons a stored block is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Block hash doesn't meet the target or doesn't match its header
    #[error("invalid proof of work in block {0}")]
    InvalidProofOfWork(Hash256),
    /// Block stored under a key other than its own hash
    #[error("block {found} stored under key {key}")]
    KeyMismatch { key: Hash256, found: Hash256 },
    /// Genesis block must carry exactly one coinbase transaction
    #[error("genesis block {0} does not hold a single coinbase")]
    InvalidGenesis(Hash256),
}

/// Checks sealed blocks read back from the store
pub struct BlockValidator<'a> {
    pow: &'a ProofOfWork,
}

impl<'a> BlockValidator<'a> {
    pub fn new(pow: &'a ProofOfWork) -> Self {
        Self { pow }
    }

    /// Validate a block that was stored under `key`
    pub fn validate_block(&self, key: &Hash256, block: &Block) -> Result<(), ValidationError> {
        if block.hash != *key {
            return Err(ValidationError::KeyMismatch {
                key: *key,
                found: block.hash,
            });
        }

        if !self.pow.validate(block) {
            return Err(ValidationError::InvalidProofOfWork(block.hash));
        }

        if block.is_genesis()
            && !(block.transactions.len() == 1 && block.transactions[0].is_coinbase())
        {
            return Err(ValidationError::InvalidGenesis(block.hash));
        }

        Ok(())
    }
}
