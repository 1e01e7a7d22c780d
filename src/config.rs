// Ledger configuration

use crate::consensus::{ProofOfWork, DEFAULT_DIFFICULTY};
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Coins minted by a coinbase transaction
pub const DEFAULT_SUBSIDY: u64 = 10;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
/// Configuration for the ledger and its store.
pub struct Config {
    /// Directory holding the block store and the wallet file.
    pub data_dir: PathBuf,

    /// Leading zero bits required of every block hash.
    pub difficulty: u32,

    /// Largest nonce tried before mining gives up.
    pub max_nonce: u64,

    /// Value of each coinbase output.
    pub subsidy: u64,

    /// Maintain a materialized UTXO index next to the blocks.
    pub utxo_index: bool,

    /// Use a temporary store that is deleted when dropped.
    pub ephemeral: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            difficulty: DEFAULT_DIFFICULTY,
            max_nonce: u64::MAX,
            subsidy: DEFAULT_SUBSIDY,
            utxo_index: false,
            ephemeral: false,
        }
    }
}

impl Config {
    /// Returns a config for a temporary store with an easy target.
    pub fn ephemeral() -> Self {
        Self {
            difficulty: 8,
            ephemeral: true,
            ..Self::default()
        }
    }

    /// Read a JSON config file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ChainError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| ChainError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.proof_of_work().map(|_| ())
    }

    /// The block store location.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    /// The wallet file location.
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join("wallets.json")
    }

    pub fn proof_of_work(&self) -> Result<ProofOfWork> {
        ProofOfWork::new(self.difficulty, self.max_nonce)
    }
}
