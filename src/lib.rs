// Proof-of-work ledger with a UTXO model

pub mod core;
pub mod consensus;
pub mod storage;
pub mod chain;
pub mod wallet;
pub mod config;
pub mod error;
pub mod cli;

// Re-exports for convenience
pub use crate::core::{Block, Hash256, Transaction, TxInput, TxOutput};
pub use consensus::{BlockValidator, ProofOfWork, Target, ValidationError};
pub use storage::{BlockchainDB, OutPoint, Utxo, UtxoSet};
pub use chain::{Blockchain, BlockchainIterator, UnspentOutput};
pub use wallet::{validate_address, Address, Wallet, Wallets};
pub use config::Config;
pub use error::{ChainError, CodecError, Result};
pub use cli::{Cli, CliHandler};
