// Storage layer for blocks and the UTXO index

mod blockchain_db;
mod utxo_set;

pub use blockchain_db::{BlockchainDB, BLOCKS_TREE, CHAINSTATE_TREE, TIP_KEY};
pub use utxo_set::{OutPoint, Utxo, UtxoSet};
