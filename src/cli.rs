// CLI commands

use crate::chain::{Blockchain, GENESIS_COINBASE_DATA};
use crate::config::Config;
use crate::core::{Block, Transaction};
use crate::error::{ChainError, Result};
use crate::wallet::{new_utxo_transaction, validate_address, Address, Wallets};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pow-ledger")]
#[command(about = "Single-node proof-of-work ledger", long_about = None)]
pub struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the block store and wallet file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a blockchain and send the genesis reward to ADDRESS
    CreateBlockchain {
        #[arg(long)]
        address: String,
    },

    /// Get the balance of ADDRESS
    GetBalance {
        #[arg(long)]
        address: String,
    },

    /// Send AMOUNT of coins from FROM to TO
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },

    /// Print all blocks from tip to genesis
    PrintChain,

    /// Generate a new wallet
    CreateWallet,

    /// List wallet addresses
    ListAddresses,

    /// Rebuild the UTXO index
    ReindexUtxo,
}

/// CLI handler
pub struct CliHandler {
    config: Config,
}

impl CliHandler {
    /// Resolve the configuration from the global flags
    pub fn new(config_path: Option<&PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }

        log::debug!("Using data directory {}", config.data_dir.display());
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle CLI command
    pub fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::CreateBlockchain { address } => self.create_blockchain(&address),
            Commands::GetBalance { address } => self.get_balance(&address),
            Commands::Send { from, to, amount } => self.send(&from, &to, amount),
            Commands::PrintChain => self.print_chain(),
            Commands::CreateWallet => self.create_wallet(),
            Commands::ListAddresses => self.list_addresses(),
            Commands::ReindexUtxo => self.reindex_utxo(),
        }
    }

    fn create_blockchain(&self, address: &str) -> Result<()> {
        let address = parse_address(address)?;
        let coinbase = Transaction::new_coinbase(&address, GENESIS_COINBASE_DATA, self.config.subsidy)?;
        let chain = Blockchain::create(&self.config, coinbase)?;

        println!("Done! Genesis block {}", chain.tip());
        Ok(())
    }

    fn get_balance(&self, address: &str) -> Result<()> {
        let address = parse_address(address)?;
        let chain = Blockchain::open(&self.config)?;
        let balance = chain.balance(&address.to_pub_key_hash()?)?;

        println!("Balance of '{}': {}", address, balance);
        Ok(())
    }

    fn send(&self, from: &str, to: &str, amount: u64) -> Result<()> {
        let from = parse_address(from)?;
        let to = parse_address(to)?;

        let wallets = Wallets::load(self.config.wallet_path())?;
        let wallet = wallets
            .get_wallet(&from)
            .ok_or_else(|| ChainError::Wallet(format!("No wallet for {}", from)))?;

        let mut chain = Blockchain::open(&self.config)?;
        let tx = new_utxo_transaction(wallet, &to, amount, &chain)?;
        let block = chain.mine_block(vec![tx])?;

        println!("Success! Sent {} in block {}", amount, block.hash);
        Ok(())
    }

    fn print_chain(&self) -> Result<()> {
        let chain = Blockchain::open(&self.config)?;
        let pow = chain.proof_of_work();

        for block in chain.iter() {
            let block = block?;
            print_block(&block, pow.validate(&block));
        }

        Ok(())
    }

    fn create_wallet(&self) -> Result<()> {
        let path = self.config.wallet_path();
        let mut wallets = Wallets::load(&path)?;
        let address = wallets.create_wallet();
        wallets.save(&path)?;

        println!("Your new address: {}", address);
        Ok(())
    }

    fn list_addresses(&self) -> Result<()> {
        let wallets = Wallets::load(self.config.wallet_path())?;
        for address in wallets.addresses() {
            println!("{}", address);
        }
        Ok(())
    }

    fn reindex_utxo(&self) -> Result<()> {
        let chain = Blockchain::open(&self.config)?;
        let count = chain.reindex()?;

        println!("Done! There are {} transaction outputs in the UTXO set.", count);
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<Address> {
    if !validate_address(address) {
        return Err(ChainError::InvalidAddress(address.to_string()));
    }
    Ok(Address::from(address))
}

/// Print block information
fn print_block(block: &Block, pow_valid: bool) {
    println!("============ Block {} ============", block.hash);
    match &block.prev_hash {
        Some(prev) => println!("Prev. block: {}", prev),
        None => println!("Prev. block: (genesis)"),
    }
    println!("Timestamp: {}", block.timestamp);
    println!("Nonce: {}", block.nonce);
    println!("PoW: {}", pow_valid);

    for tx in &block.transactions {
        println!("--- Transaction {}:", tx.id);
        for (i, input) in tx.inputs.iter().enumerate() {
            if input.is_coinbase() {
                println!("     Input {}: coinbase", i);
            } else {
                println!("     Input {}:", i);
                println!("       TXID:      {}", input.txid_hex());
                println!("       Out:       {}", input.vout);
                println!("       Signature: {}", hex::encode(&input.signature));
                println!("       PubKey:    {}", hex::encode(&input.pub_key));
            }
        }
        for (i, output) in tx.outputs.iter().enumerate() {
            println!("     Output {}:", i);
            println!("       Value:  {}", output.value);
            println!("       Script: {}", hex::encode(&output.pub_key_hash));
        }
    }
    println!();
}
