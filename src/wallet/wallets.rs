// Wallet file

use crate::error::{ChainError, Result};
use crate::wallet::{Address, Wallet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// On-disk form of a wallet
#[derive(Serialize, Deserialize)]
struct StoredWallet {
    /// Hex-encoded P-256 secret scalar
    secret_key: String,
}

#[derive(Serialize, Deserialize, Default)]
struct WalletFile {
    wallets: BTreeMap<Address, StoredWallet>,
}

/// Wallets keyed by address
#[derive(Default)]
pub struct Wallets {
    wallets: BTreeMap<Address, Wallet>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a wallet and return its address
    pub fn create_wallet(&mut self) -> Address {
        let wallet = Wallet::generate();
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    pub fn get_wallet(&self, address: &Address) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    /// All addresses, sorted
    pub fn addresses(&self) -> Vec<Address> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Load wallets from `path`; a missing file gives an empty set
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let json = fs::read_to_string(path)
            .map_err(|e| ChainError::Wallet(format!("Failed to read {}: {}", path.display(), e)))?;
        let file: WalletFile = serde_json::from_str(&json)
            .map_err(|e| ChainError::Wallet(format!("Failed to parse {}: {}", path.display(), e)))?;

        let mut wallets = BTreeMap::new();
        for (address, stored) in file.wallets {
            let secret = hex::decode(&stored.secret_key)
                .map_err(|e| ChainError::Wallet(format!("Invalid secret key for {}: {}", address, e)))?;
            let wallet = Wallet::from_secret_bytes(&secret)?;

            if wallet.address() != address {
                return Err(ChainError::Wallet(format!(
                    "Secret key does not belong to {}",
                    address
                )));
            }
            wallets.insert(address, wallet);
        }

        log::debug!("Loaded {} wallets from {}", wallets.len(), path.display());
        Ok(Self { wallets })
    }

    /// Write all wallets to `path` as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = WalletFile {
            wallets: self
                .wallets
                .iter()
                .map(|(address, wallet)| {
                    let stored = StoredWallet {
                        secret_key: hex::encode(wallet.secret_bytes()),
                    };
                    (address.clone(), stored)
                })
                .collect(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ChainError::Wallet(format!("Failed to serialize wallets: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ChainError::Wallet(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        fs::write(path, json)
            .map_err(|e| ChainError::Wallet(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(())
    }
}
