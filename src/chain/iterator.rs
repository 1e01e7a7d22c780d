// Backward walk over stored blocks

use crate::core::{Block, Hash256};
use crate::error::{ChainError, Result};
use crate::storage::BlockchainDB;

/// Yields blocks from a starting hash back to genesis
///
/// Single-pass: each call to `next` reads one block from the store. A read
/// failure or a dangling `prev_hash` is yielded once as an error, after
/// which the iterator is exhausted.
pub struct BlockchainIterator<'a> {
    db: &'a BlockchainDB,
    current: Option<Hash256>,
}

impl<'a> BlockchainIterator<'a> {
    pub(crate) fn new(db: &'a BlockchainDB, start: Hash256) -> Self {
        Self {
            db,
            current: Some(start),
        }
    }
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;

        match self.db.get_block(&hash) {
            Ok(Some(block)) => {
                self.current = block.prev_hash;
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::CorruptChain(format!(
                "block {} is missing from the store",
                hash
            )))),
            Err(e) => Some(Err(e)),
        }
    }
}
