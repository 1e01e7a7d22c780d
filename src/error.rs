// Error types for the ledger

use thiserror::Error;

/// Failures while decoding consensus bytes
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unexpected end of input: {0}")]
    Truncated(#[from] std::io::Error),

    #[error("invalid hash length: expected 32, got {0}")]
    HashLength(usize),

    #[error("{0} trailing bytes after {1}")]
    TrailingBytes(usize, &'static str),

    #[error("length prefix {0} exceeds remaining input")]
    LengthOverflow(u64),
}

/// Ledger error taxonomy
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("no existing blockchain found, create one first")]
    StoreMissing,

    #[error("blockchain already exists")]
    StoreAlreadyExists,

    #[error("invalid transaction {0}")]
    InvalidTransaction(String),

    #[error("previous transaction {0} is not known")]
    PriorTransactionNotFound(String),

    #[error("transaction {0} is not found")]
    TransactionNotFound(String),

    #[error("not enough funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no valid nonce found after {0} attempts")]
    MiningExhausted(u64),

    #[error("mining cancelled")]
    MiningCancelled,

    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("corrupt chain: {0}")]
    CorruptChain(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;

impl From<sled::transaction::TransactionError<ChainError>> for ChainError {
    fn from(err: sled::transaction::TransactionError<ChainError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => ChainError::Store(e),
        }
    }
}
