// Unspent output lookup strategies
//
// Both strategies return outputs in chain-scan order: newest block first,
// then transaction position, then output index.

use crate::chain::Blockchain;
use crate::core::{Hash256, Transaction, TxOutput};
use crate::error::Result;
use crate::storage::UtxoSet;
use std::collections::{HashMap, HashSet};

/// An output not referenced by any input on the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: Hash256,
    pub vout: usize,
    pub output: TxOutput,
}

/// Source of the unspent outputs locked to a key
pub trait UnspentOutputs {
    fn unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentOutput>>;
}

/// Recomputes unspent outputs by walking the chain from tip to genesis
pub struct ChainScan<'a> {
    chain: &'a Blockchain,
}

impl<'a> ChainScan<'a> {
    pub fn new(chain: &'a Blockchain) -> Self {
        Self { chain }
    }
}

impl UnspentOutputs for ChainScan<'_> {
    fn unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentOutput>> {
        let mut unspent = Vec::new();
        walk_unspent(self.chain, pub_key_hash, |tx, vout, output| {
            unspent.push(UnspentOutput {
                txid: tx.id,
                vout,
                output: output.clone(),
            });
        })?;
        Ok(unspent)
    }
}

/// Walk the chain from tip to genesis and call `visit` for every unspent
/// output locked to `pub_key_hash`
///
/// The spent set is built during the same walk. Each transaction's outputs
/// are checked against it before the transaction's own inputs are folded
/// in, so an input is always recorded before the walk reaches the older
/// transaction it spends.
pub(crate) fn walk_unspent<F>(chain: &Blockchain, pub_key_hash: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(&Transaction, usize, &TxOutput),
{
    // txid -> output indices already seen spent by a later input
    let mut spent: HashMap<Vec<u8>, HashSet<i64>> = HashMap::new();

    for block in chain.iter() {
        let block = block?;

        for tx in &block.transactions {
            let spent_here = spent.get(tx.id.as_bytes().as_slice());

            for (vout, output) in tx.outputs.iter().enumerate() {
                if spent_here.is_some_and(|outs| outs.contains(&(vout as i64))) {
                    continue;
                }
                if output.is_locked_with_key(pub_key_hash) {
                    visit(tx, vout, output);
                }
            }

            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    spent.entry(input.txid.clone()).or_default().insert(input.vout);
                }
            }
        }
    }

    Ok(())
}

/// Reads unspent outputs from the materialized index
pub struct UtxoIndex {
    set: UtxoSet,
}

impl UtxoIndex {
    pub fn new(set: UtxoSet) -> Self {
        Self { set }
    }
}

impl UnspentOutputs for UtxoIndex {
    fn unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentOutput>> {
        Ok(self
            .set
            .utxos_for_key(pub_key_hash)?
            .into_iter()
            .map(|(point, utxo)| UnspentOutput {
                txid: point.txid,
                vout: point.vout as usize,
                output: utxo.output,
            })
            .collect())
    }
}
