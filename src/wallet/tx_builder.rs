// Transaction builder

use crate::chain::Blockchain;
use crate::core::{Transaction, TxInput, TxOutput};
use crate::error::{ChainError, Result};
use crate::wallet::{Address, Wallet};

/// Build and sign a transaction moving `amount` from `from` to `to`
///
/// Spends outputs in chain-scan order until they cover `amount`; any excess
/// returns to the sender as a change output.
pub fn new_utxo_transaction(
    from: &Wallet,
    to: &Address,
    amount: u64,
    chain: &Blockchain,
) -> Result<Transaction> {
    let payment = TxOutput::lock(amount, to)?;

    let (accumulated, spendable) = chain.find_spendable_outputs(&from.pub_key_hash(), amount)?;
    if accumulated < amount {
        return Err(ChainError::InsufficientFunds {
            available: accumulated,
            required: amount,
        });
    }

    let mut inputs = Vec::new();
    for (txid, outs) in &spendable {
        let txid = hex::decode(txid)
            .map_err(|e| ChainError::CorruptChain(format!("Invalid transaction id {}: {}", txid, e)))?;
        for &vout in outs {
            inputs.push(TxInput::new(txid.clone(), vout as i64, from.public_key().to_vec()));
        }
    }

    let mut outputs = vec![payment];
    if accumulated > amount {
        outputs.push(TxOutput::new(accumulated - amount, from.pub_key_hash().to_vec()));
    }

    let mut tx = Transaction::new(inputs, outputs);
    chain.sign_transaction(&mut tx, from)?;

    log::debug!(
        "Built transaction {} sending {} to {} ({} inputs)",
        tx.id,
        amount,
        to,
        tx.inputs.len()
    );

    Ok(tx)
}
