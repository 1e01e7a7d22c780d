// Wallets, addresses and transaction building

pub mod address;
pub mod keys;
mod tx_builder;
mod wallets;

pub use address::{checksum, hash_pub_key, validate_address, Address};
pub use keys::Wallet;
pub use tx_builder::new_utxo_transaction;
pub use wallets::Wallets;
