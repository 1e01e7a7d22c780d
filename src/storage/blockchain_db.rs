// Block store using sled

use crate::config::Config;
use crate::core::{Block, Hash256, Serializable};
use crate::error::{ChainError, Result};
use crate::storage::UtxoSet;
use sled::transaction::ConflictableTransactionResult;
use sled::{Db, Transactional, Tree};

/// Tree holding `hash -> block` and the tip pointer
pub const BLOCKS_TREE: &str = "blocks";
/// Tree holding the UTXO index
pub const CHAINSTATE_TREE: &str = "chainstate";
/// Sentinel key under which the tip hash is stored
pub const TIP_KEY: &[u8] = b"l";

/// Blockchain database
pub struct BlockchainDB {
    db: Db,
    blocks: Tree,
    chainstate: Tree,
}

impl BlockchainDB {
    /// Open (creating if needed) the store described by `config`
    pub fn open(config: &Config) -> Result<Self> {
        let db = if config.ephemeral {
            sled::Config::new().temporary(true).open()?
        } else {
            sled::open(config.db_path())?
        };
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let chainstate = db.open_tree(CHAINSTATE_TREE)?;
        Ok(Self {
            db,
            blocks,
            chainstate,
        })
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>> {
        match self.blocks.get(hash.as_bytes())? {
            Some(data) => Ok(Some(Block::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Get the chain tip
    pub fn get_tip(&self) -> Result<Option<Hash256>> {
        match self.blocks.get(TIP_KEY)? {
            Some(data) => Ok(Some(Hash256::from_slice(&data).map_err(|e| {
                ChainError::CorruptChain(format!("tip pointer: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    /// Store `block` and make it the tip in one transaction; with
    /// `index_utxos` the UTXO index is updated in the same transaction
    pub fn append_block(&self, block: &Block, index_utxos: bool) -> Result<()> {
        let encoded = block.serialize();

        (&self.blocks, &self.chainstate).transaction(
            |(blocks, chainstate)| -> ConflictableTransactionResult<(), ChainError> {
                blocks.insert(block.hash.as_bytes().as_slice(), encoded.as_slice())?;
                blocks.insert(TIP_KEY, block.hash.as_bytes().as_slice())?;

                if index_utxos {
                    UtxoSet::apply_block(chainstate, block)?;
                }

                Ok(())
            },
        )?;

        self.db.flush()?;
        Ok(())
    }

    pub fn utxo_set(&self) -> UtxoSet {
        UtxoSet::new(self.chainstate.clone())
    }
}
