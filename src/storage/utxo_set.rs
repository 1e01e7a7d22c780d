// Materialized UTXO index
//
// Keys: 'u' ++ txid ++ vout (u32 big-endian) -> Utxo
//       "height" -> height of the last indexed block (u64 little-endian)
//       "l"      -> hash of the last indexed block

use crate::core::{Block, Hash256, TxOutput};
use crate::error::{ChainError, CodecError, Result};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::{Batch, Tree};
use std::io::Cursor;

const UTXO_PREFIX: u8 = b'u';
const HEIGHT_KEY: &[u8] = b"height";
const TIP_KEY: &[u8] = b"l";

/// UTXO identifier - transaction id + output index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Database key
    pub fn to_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(37);
        key.push(UTXO_PREFIX);
        key.extend_from_slice(self.txid.as_bytes());
        key.extend_from_slice(&self.vout.to_be_bytes());
        key
    }

    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() != 37 || key[0] != UTXO_PREFIX {
            return Err(ChainError::CorruptChain(format!(
                "Invalid outpoint key length: {}",
                key.len()
            )));
        }

        let txid = Hash256::from_slice(&key[1..33])?;
        let mut vout_bytes = [0u8; 4];
        vout_bytes.copy_from_slice(&key[33..37]);

        Ok(Self {
            txid,
            vout: u32::from_be_bytes(vout_bytes),
        })
    }
}

/// Indexed output with its position in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub output: TxOutput,
    /// Height of the block holding the transaction (genesis = 0)
    pub height: u64,
    /// Position of the transaction inside its block
    pub position: u32,
}

impl Utxo {
    pub fn new(output: TxOutput, height: u64, position: u32) -> Self {
        Self {
            output,
            height,
            position,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.output.to_bytes();
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.position.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // output ++ height (8) ++ position (4)
        const META_LEN: usize = 12;
        if bytes.len() < META_LEN {
            return Err(ChainError::Decode(CodecError::LengthOverflow(bytes.len() as u64)));
        }

        let (output_bytes, meta) = bytes.split_at(bytes.len() - META_LEN);
        let mut cursor = Cursor::new(output_bytes);
        let output = TxOutput::read_from(&mut cursor)?;
        if cursor.position() as usize != output_bytes.len() {
            return Err(ChainError::Decode(CodecError::TrailingBytes(
                output_bytes.len() - cursor.position() as usize,
                "Utxo",
            )));
        }

        let mut height = [0u8; 8];
        height.copy_from_slice(&meta[..8]);
        let mut position = [0u8; 4];
        position.copy_from_slice(&meta[8..12]);

        Ok(Self {
            output,
            height: u64::from_le_bytes(height),
            position: u32::from_le_bytes(position),
        })
    }
}

/// UTXO index over the `chainstate` tree
#[derive(Clone)]
pub struct UtxoSet {
    tree: Tree,
}

impl UtxoSet {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Hash of the last block folded into the index
    pub fn indexed_tip(&self) -> Result<Option<Hash256>> {
        match self.tree.get(TIP_KEY)? {
            Some(data) => Ok(Some(Hash256::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// All entries locked to `pub_key_hash`, newest block first, then
    /// by transaction position and output index
    pub fn utxos_for_key(&self, pub_key_hash: &[u8]) -> Result<Vec<(OutPoint, Utxo)>> {
        let mut utxos = Vec::new();

        for item in self.tree.scan_prefix([UTXO_PREFIX]) {
            let (key, value) = item?;
            let utxo = Utxo::from_bytes(&value)?;

            if utxo.output.is_locked_with_key(pub_key_hash) {
                utxos.push((OutPoint::from_key(&key)?, utxo));
            }
        }

        utxos.sort_by(|(a_point, a), (b_point, b)| {
            b.height
                .cmp(&a.height)
                .then(a.position.cmp(&b.position))
                .then(a_point.vout.cmp(&b_point.vout))
        });

        Ok(utxos)
    }

    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.tree.scan_prefix([UTXO_PREFIX]) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Fold a block into the index inside a store transaction
    pub(crate) fn apply_block(
        tree: &TransactionalTree,
        block: &Block,
    ) -> ConflictableTransactionResult<(), ChainError> {
        let height = match tree.get(HEIGHT_KEY)? {
            None => 0,
            Some(data) => {
                let bytes: [u8; 8] = data.as_ref().try_into().map_err(|_| {
                    ConflictableTransactionError::Abort(ChainError::CorruptChain(
                        "Invalid index height".to_string(),
                    ))
                })?;
                u64::from_le_bytes(bytes) + 1
            }
        };

        for (position, tx) in block.transactions.iter().enumerate() {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let (Ok(txid), Ok(vout)) = (Hash256::from_slice(&input.txid), u32::try_from(input.vout)) else {
                        continue;
                    };
                    tree.remove(OutPoint::new(txid, vout).to_key())?;
                }
            }

            for (vout, output) in tx.outputs.iter().enumerate() {
                let utxo = Utxo::new(output.clone(), height, position as u32);
                tree.insert(OutPoint::new(tx.id, vout as u32).to_key(), utxo.to_bytes())?;
            }
        }

        tree.insert(HEIGHT_KEY, &height.to_le_bytes()[..])?;
        tree.insert(TIP_KEY, &block.hash.as_bytes()[..])?;
        Ok(())
    }

    /// Replace the whole index with one rebuilt from `blocks`, given
    /// genesis first
    pub fn rebuild(&self, blocks: &[Block]) -> Result<()> {
        let mut entries: Vec<(OutPoint, Utxo)> = Vec::new();

        for (height, block) in blocks.iter().enumerate() {
            for (position, tx) in block.transactions.iter().enumerate() {
                if !tx.is_coinbase() {
                    entries.retain(|(point, _)| {
                        !tx.inputs.iter().any(|input| {
                            input.txid.as_slice() == point.txid.as_bytes()
                                && input.vout == i64::from(point.vout)
                        })
                    });
                }

                for (vout, output) in tx.outputs.iter().enumerate() {
                    entries.push((
                        OutPoint::new(tx.id, vout as u32),
                        Utxo::new(output.clone(), height as u64, position as u32),
                    ));
                }
            }
        }

        let mut batch = Batch::default();
        for key in self.tree.iter().keys() {
            batch.remove(key?);
        }
        for (point, utxo) in &entries {
            batch.insert(point.to_key(), utxo.to_bytes());
        }
        if let Some(tip) = blocks.last() {
            let height = (blocks.len() - 1) as u64;
            batch.insert(HEIGHT_KEY, &height.to_le_bytes()[..]);
            batch.insert(TIP_KEY, &tip.hash.as_bytes()[..]);
        }

        self.tree.apply_batch(batch)?;
        Ok(())
    }
}
