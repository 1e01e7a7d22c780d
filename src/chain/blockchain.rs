// Append-only chain of blocks with UTXO queries

use crate::chain::iterator::BlockchainIterator;
use crate::chain::unspent::{walk_unspent, ChainScan, UnspentOutput, UnspentOutputs, UtxoIndex};
use crate::config::Config;
use crate::consensus::{BlockValidator, ProofOfWork};
use crate::core::{Block, Hash256, PrevTransactions, Transaction, TxOutput};
use crate::error::{ChainError, Result};
use crate::storage::BlockchainDB;
use crate::wallet::Wallet;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Data carried by the coinbase of a chain created from the command line
pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// Handle on a stored chain
pub struct Blockchain {
    tip: Hash256,
    db: BlockchainDB,
    pow: ProofOfWork,
    utxo_index: bool,
    cancel: Arc<AtomicBool>,
}

impl Blockchain {
    /// Create a new chain whose genesis block carries `coinbase`
    pub fn create(config: &Config, coinbase: Transaction) -> Result<Self> {
        if !coinbase.is_coinbase() {
            return Err(ChainError::InvalidTransaction(format!(
                "{} is not a coinbase transaction",
                coinbase.id
            )));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let pow = config.proof_of_work()?.with_cancel(cancel.clone());
        let db = BlockchainDB::open(config)?;

        if db.get_tip()?.is_some() {
            return Err(ChainError::StoreAlreadyExists);
        }

        let genesis = Block::genesis(coinbase, &pow)?;
        db.append_block(&genesis, config.utxo_index)?;

        log::info!("Created blockchain with genesis block {}", genesis.hash);

        Ok(Self {
            tip: genesis.hash,
            db,
            pow,
            utxo_index: config.utxo_index,
            cancel,
        })
    }

    /// Open an existing chain
    pub fn open(config: &Config) -> Result<Self> {
        if !config.ephemeral && !config.db_path().exists() {
            return Err(ChainError::StoreMissing);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let pow = config.proof_of_work()?.with_cancel(cancel.clone());
        let db = BlockchainDB::open(config)?;
        let tip = db.get_tip()?.ok_or(ChainError::StoreMissing)?;

        let chain = Self {
            tip,
            db,
            pow,
            utxo_index: config.utxo_index,
            cancel,
        };

        if chain.utxo_index && chain.db.utxo_set().indexed_tip()? != Some(tip) {
            log::info!("UTXO index does not match tip {}, rebuilding", tip);
            chain.reindex()?;
        }

        Ok(chain)
    }

    pub fn tip(&self) -> Hash256 {
        self.tip
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Flag that aborts an in-progress `mine_block` when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Walk from the tip back to genesis
    pub fn iter(&self) -> BlockchainIterator<'_> {
        BlockchainIterator::new(&self.db, self.tip)
    }

    /// Verify `transactions`, mine a block holding them on the current tip
    /// and append it
    ///
    /// Nothing is written when any transaction is rejected or mining fails.
    /// Transaction ids must be unique across the chain and the batch.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let mut batch_ids = HashSet::new();

        for tx in &transactions {
            if !batch_ids.insert(tx.id) || self.contains_transaction(&tx.id)? {
                log::warn!("Rejected transaction {}: duplicate id", tx.id);
                return Err(ChainError::InvalidTransaction(format!(
                    "{} is already on the chain or in the batch",
                    tx.id
                )));
            }

            match self.verify_transaction(tx) {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("Rejected transaction {}: invalid signature", tx.id);
                    return Err(ChainError::InvalidTransaction(tx.id.to_hex()));
                }
                Err(e) => {
                    log::warn!("Rejected transaction {}: {}", tx.id, e);
                    return Err(e);
                }
            }
        }

        let block = match Block::new(transactions, Some(self.tip), &self.pow) {
            Err(ChainError::MiningCancelled) => {
                self.cancel.store(false, Ordering::Relaxed);
                return Err(ChainError::MiningCancelled);
            }
            result => result?,
        };

        self.db.append_block(&block, self.utxo_index)?;
        self.tip = block.hash;

        log::info!(
            "Appended block {} with {} transactions",
            block.hash,
            block.transactions.len()
        );

        Ok(block)
    }

    /// First transaction with `id`, searching from the tip
    pub fn find_transaction(&self, id: &[u8]) -> Result<Transaction> {
        for block in self.iter() {
            let block = block?;
            if let Some(tx) = block
                .transactions
                .into_iter()
                .find(|tx| tx.id.as_bytes().as_slice() == id)
            {
                return Ok(tx);
            }
        }

        Err(ChainError::TransactionNotFound(hex::encode(id)))
    }

    fn contains_transaction(&self, id: &Hash256) -> Result<bool> {
        match self.find_transaction(id.as_bytes()) {
            Ok(_) => Ok(true),
            Err(ChainError::TransactionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Transactions holding at least one unspent output locked to
    /// `pub_key_hash`
    ///
    /// A transaction appears once per matching unspent output.
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        let mut unspent_txs = Vec::new();
        walk_unspent(self, pub_key_hash, |tx, _, _| unspent_txs.push(tx.clone()))?;
        Ok(unspent_txs)
    }

    /// Unspent outputs locked to `pub_key_hash` in chain-scan order, read
    /// from the index when enabled
    pub fn unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentOutput>> {
        if self.utxo_index {
            UtxoIndex::new(self.db.utxo_set()).unspent_outputs(pub_key_hash)
        } else {
            ChainScan::new(self).unspent_outputs(pub_key_hash)
        }
    }

    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TxOutput>> {
        Ok(self
            .unspent_outputs(pub_key_hash)?
            .into_iter()
            .map(|utxo| utxo.output)
            .collect())
    }

    /// Sum of the unspent outputs locked to `pub_key_hash`
    pub fn balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self.find_utxo(pub_key_hash)?.iter().map(|out| out.value).sum())
    }

    /// Collect unspent outputs until their total reaches `amount`
    ///
    /// Returns the accumulated total (which may fall short of `amount`) and
    /// the selected output indices keyed by hex transaction id.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, BTreeMap<String, Vec<usize>>)> {
        let mut accumulated = 0u64;
        let mut selected: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for utxo in self.unspent_outputs(pub_key_hash)? {
            if accumulated >= amount {
                break;
            }
            accumulated += utxo.output.value;
            selected.entry(utxo.txid.to_hex()).or_default().push(utxo.vout);
        }

        Ok((accumulated, selected))
    }

    /// Sign every input of `tx` with the wallet's key
    pub fn sign_transaction(&self, tx: &mut Transaction, wallet: &Wallet) -> Result<()> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.sign(wallet.signing_key(), &prev_txs)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    /// Check every stored block from tip to genesis; returns the chain length
    pub fn verify_chain(&self) -> Result<usize> {
        let validator = BlockValidator::new(&self.pow);
        let mut key = self.tip;
        let mut length = 0;

        for block in self.iter() {
            let block = block?;
            validator
                .validate_block(&key, &block)
                .map_err(|e| ChainError::CorruptChain(e.to_string()))?;

            length += 1;
            if let Some(prev) = block.prev_hash {
                key = prev;
            }
        }

        log::debug!("Verified {} blocks", length);
        Ok(length)
    }

    /// Rebuild the UTXO index from a full chain scan; returns the number of
    /// indexed outputs
    pub fn reindex(&self) -> Result<usize> {
        let mut blocks = self.iter().collect::<Result<Vec<_>>>()?;
        blocks.reverse();

        let utxo_set = self.db.utxo_set();
        utxo_set.rebuild(&blocks)?;
        let count = utxo_set.count()?;

        log::info!("Reindexed {} unspent outputs over {} blocks", count, blocks.len());
        Ok(count)
    }

    /// Prior transactions referenced by the inputs of `tx`
    fn prev_transactions(&self, tx: &Transaction) -> Result<PrevTransactions> {
        let mut prev_txs = PrevTransactions::new();
        if tx.is_coinbase() {
            return Ok(prev_txs);
        }

        for input in &tx.inputs {
            let prev_tx = self.find_transaction(&input.txid).map_err(|e| match e {
                ChainError::TransactionNotFound(id) => ChainError::PriorTransactionNotFound(id),
                other => other,
            })?;
            prev_txs.insert(prev_tx.id.to_hex(), prev_tx);
        }

        Ok(prev_txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput};
    use crate::wallet::new_utxo_transaction;

    fn new_chain(config: &Config) -> (Blockchain, Wallet) {
        let alice = Wallet::generate();
        let coinbase = Transaction::new_coinbase(&alice.address(), "", config.subsidy).unwrap();
        (Blockchain::create(config, coinbase).unwrap(), alice)
    }

    #[test]
    fn test_create_writes_genesis() {
        let (chain, alice) = new_chain(&Config::ephemeral());

        let blocks: Vec<Block> = chain.iter().map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_genesis());
        assert_eq!(blocks[0].hash, chain.tip());
        assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 10);
    }

    #[test]
    fn test_create_rejects_non_coinbase() {
        let alice = Wallet::generate();
        let tx = Transaction::new(
            vec![TxInput::new(vec![1; 32], 0, alice.public_key().to_vec())],
            vec![TxOutput::new(1, alice.pub_key_hash().to_vec())],
        );

        let result = Blockchain::create(&Config::ephemeral(), tx);
        assert!(matches!(result, Err(ChainError::InvalidTransaction(_))));
    }

    #[test]
    fn test_open_without_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().join("missing"),
            ephemeral: false,
            ..Config::ephemeral()
        };
        assert!(matches!(Blockchain::open(&config), Err(ChainError::StoreMissing)));

        // An ephemeral store is always empty
        assert!(matches!(
            Blockchain::open(&Config::ephemeral()),
            Err(ChainError::StoreMissing)
        ));
    }

    #[test]
    fn test_mine_block_extends_tip() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let bob = Wallet::generate();
        let genesis = chain.tip();

        let tx = new_utxo_transaction(&alice, &bob.address(), 3, &chain).unwrap();
        let block = chain.mine_block(vec![tx.clone()]).unwrap();

        assert_eq!(block.prev_hash, Some(genesis));
        assert_eq!(chain.tip(), block.hash);
        assert!(chain.proof_of_work().validate(&block));
        assert_eq!(chain.find_transaction(tx.id.as_bytes()).unwrap(), tx);
        assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 7);
        assert_eq!(chain.balance(&bob.pub_key_hash()).unwrap(), 3);
    }

    #[test]
    fn test_find_transaction_not_found() {
        let (chain, _) = new_chain(&Config::ephemeral());
        let err = chain.find_transaction(&[7u8; 32]).unwrap_err();
        assert!(matches!(err, ChainError::TransactionNotFound(id) if id == hex::encode([7u8; 32])));
    }

    #[test]
    fn test_rejected_transaction_writes_nothing() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let bob = Wallet::generate();
        let tip = chain.tip();

        let mut tx = new_utxo_transaction(&alice, &bob.address(), 3, &chain).unwrap();
        tx.inputs[0].signature[10] ^= 0xff;

        let err = chain.mine_block(vec![tx]).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
        assert_eq!(chain.tip(), tip);
        assert_eq!(chain.iter().count(), 1);
        assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 10);
    }

    #[test]
    fn test_unknown_prior_transaction_rejected() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let input = TxInput::new(vec![9; 32], 0, alice.public_key().to_vec());
        let tx = Transaction::new(vec![input], vec![TxOutput::new(1, alice.pub_key_hash().to_vec())]);

        let err = chain.mine_block(vec![tx]).unwrap_err();
        assert!(matches!(err, ChainError::PriorTransactionNotFound(_)));
        assert_eq!(chain.iter().count(), 1);
    }

    #[test]
    fn test_duplicate_transaction_id_rejected() {
        let config = Config {
            utxo_index: true,
            ..Config::ephemeral()
        };
        let (mut chain, alice) = new_chain(&config);
        let tip = chain.tip();

        // Same recipient and data give the genesis coinbase's id again
        let repeat = Transaction::new_coinbase(&alice.address(), "", config.subsidy).unwrap();
        let err = chain.mine_block(vec![repeat]).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
        assert_eq!(chain.tip(), tip);

        let pkh = alice.pub_key_hash();
        assert_eq!(
            chain.unspent_outputs(&pkh).unwrap(),
            ChainScan::new(&chain).unspent_outputs(&pkh).unwrap()
        );
        assert_eq!(chain.balance(&pkh).unwrap(), 10);
    }

    #[test]
    fn test_duplicate_within_batch_rejected() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let reward = Transaction::new_coinbase(&alice.address(), "block reward", 10).unwrap();

        let err = chain.mine_block(vec![reward.clone(), reward]).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
        assert_eq!(chain.iter().count(), 1);
        assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 10);
    }

    #[test]
    fn test_transaction_without_inputs_rejected() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let minted = Transaction::new(vec![], vec![TxOutput::new(1_000_000, alice.pub_key_hash().to_vec())]);

        let err = chain.mine_block(vec![minted]).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
        assert_eq!(chain.iter().count(), 1);
        assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 10);
    }

    #[test]
    fn test_find_unspent_transactions_repeats_per_output() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let genesis = chain.iter().next().unwrap().unwrap();
        let coinbase = &genesis.transactions[0];

        // Split the coinbase into two outputs for Alice
        let input = TxInput::new(coinbase.id.as_bytes().to_vec(), 0, alice.public_key().to_vec());
        let outputs = vec![
            TxOutput::new(4, alice.pub_key_hash().to_vec()),
            TxOutput::new(6, alice.pub_key_hash().to_vec()),
        ];
        let mut tx = Transaction::new(vec![input], outputs);
        chain.sign_transaction(&mut tx, &alice).unwrap();
        chain.mine_block(vec![tx.clone()]).unwrap();

        let unspent = chain.find_unspent_transactions(&alice.pub_key_hash()).unwrap();
        assert_eq!(unspent.len(), 2);
        assert!(unspent.iter().all(|t| t.id == tx.id));

        let values: Vec<u64> = chain
            .find_utxo(&alice.pub_key_hash())
            .unwrap()
            .iter()
            .map(|out| out.value)
            .collect();
        assert_eq!(values, vec![4, 6]);
    }

    #[test]
    fn test_find_spendable_outputs_stops_at_amount() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let bob = Wallet::generate();

        for amount in [1, 2] {
            let tx = new_utxo_transaction(&alice, &bob.address(), amount, &chain).unwrap();
            chain.mine_block(vec![tx]).unwrap();
        }

        let pkh = bob.pub_key_hash();
        let (total, selected) = chain.find_spendable_outputs(&pkh, 2).unwrap();
        assert_eq!(total, 2);
        assert_eq!(selected.values().map(Vec::len).sum::<usize>(), 1);

        let (total, selected) = chain.find_spendable_outputs(&pkh, 3).unwrap();
        assert_eq!(total, 3);
        assert_eq!(selected.len(), 2);

        let (total, _) = chain.find_spendable_outputs(&pkh, 100).unwrap();
        assert_eq!(total, 3);

        let (total, selected) = chain.find_spendable_outputs(&pkh, 0).unwrap();
        assert_eq!(total, 0);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_cancelled_mining_writes_nothing() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let bob = Wallet::generate();
        let tip = chain.tip();
        let tx = new_utxo_transaction(&alice, &bob.address(), 3, &chain).unwrap();

        chain.cancel_handle().store(true, Ordering::Relaxed);
        let err = chain.mine_block(vec![tx.clone()]).unwrap_err();
        assert!(matches!(err, ChainError::MiningCancelled));
        assert_eq!(chain.tip(), tip);

        // The flag is cleared so the next attempt runs
        chain.mine_block(vec![tx]).unwrap();
        assert_eq!(chain.iter().count(), 2);
    }

    #[test]
    fn test_mining_exhausted() {
        let config = Config {
            max_nonce: 0,
            ..Config::ephemeral()
        };
        let alice = Wallet::generate();
        let coinbase = Transaction::new_coinbase(&alice.address(), "", 10).unwrap();

        // Difficulty 8 with a single nonce fails unless that nonce happens to hit
        match Blockchain::create(&config, coinbase) {
            Ok(chain) => assert_eq!(chain.iter().count(), 1),
            Err(e) => assert!(matches!(e, ChainError::MiningExhausted(1))),
        }
    }

    #[test]
    fn test_verify_chain() {
        let (mut chain, alice) = new_chain(&Config::ephemeral());
        let bob = Wallet::generate();
        let tx = new_utxo_transaction(&alice, &bob.address(), 5, &chain).unwrap();
        chain.mine_block(vec![tx]).unwrap();

        assert_eq!(chain.verify_chain().unwrap(), 2);
    }

    #[test]
    fn test_index_matches_scan() {
        let config = Config {
            utxo_index: true,
            ..Config::ephemeral()
        };
        let (mut chain, alice) = new_chain(&config);
        let bob = Wallet::generate();

        for amount in [2, 3] {
            let tx = new_utxo_transaction(&alice, &bob.address(), amount, &chain).unwrap();
            chain.mine_block(vec![tx]).unwrap();
        }
        let tx = new_utxo_transaction(&bob, &alice.address(), 4, &chain).unwrap();
        chain.mine_block(vec![tx]).unwrap();

        for wallet in [&alice, &bob] {
            let pkh = wallet.pub_key_hash();
            let indexed = chain.unspent_outputs(&pkh).unwrap();
            let scanned = ChainScan::new(&chain).unspent_outputs(&pkh).unwrap();
            assert_eq!(indexed, scanned);
        }
        assert_eq!(chain.balance(&alice.pub_key_hash()).unwrap(), 9);
        assert_eq!(chain.balance(&bob.pub_key_hash()).unwrap(), 1);

        let before = chain.db.utxo_set().count().unwrap();
        assert_eq!(chain.reindex().unwrap(), before);
        assert_eq!(
            chain.unspent_outputs(&alice.pub_key_hash()).unwrap(),
            ChainScan::new(&chain).unspent_outputs(&alice.pub_key_hash()).unwrap()
        );
    }
}
