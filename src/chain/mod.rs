// Chain of blocks and UTXO queries

mod blockchain;
mod iterator;
mod unspent;

pub use blockchain::{Blockchain, GENESIS_COINBASE_DATA};
pub use iterator::BlockchainIterator;
pub use unspent::{ChainScan, UnspentOutput, UnspentOutputs, UtxoIndex};
