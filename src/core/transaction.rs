// Transaction data structures and the signing protocol

use crate::core::serialize::{read_hash, read_i64_le, read_u64_le, read_var_bytes, read_varint, write_var_bytes, write_varint};
use crate::core::{sha256, Hash256, Serializable};
use crate::error::{ChainError, CodecError, Result};
use crate::wallet::keys::{decode_public_key, SIGNATURE_LEN};
use crate::wallet::{hash_pub_key, Address};
use p256::ecdsa::signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner};
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::io::Read;

/// Output index carried by a coinbase input
pub const COINBASE_VOUT: i64 = -1;

/// Prior transactions keyed by hex-encoded id
pub type PrevTransactions = HashMap<String, Transaction>;

/// Transaction input - references one output of an earlier transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Id of the transaction holding the referenced output (empty for coinbase)
    pub txid: Vec<u8>,
    /// Index of the referenced output (-1 for coinbase)
    pub vout: i64,
    /// Raw r ++ s
    pub signature: Vec<u8>,
    /// Raw X ++ Y of the spender; free-form data in a coinbase
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// Create an unsigned input
    pub fn new(txid: Vec<u8>, vout: i64, pub_key: Vec<u8>) -> Self {
        Self {
            txid,
            vout,
            signature: Vec::new(),
            pub_key,
        }
    }

    pub fn coinbase(data: Vec<u8>) -> Self {
        Self {
            txid: Vec::new(),
            vout: COINBASE_VOUT,
            signature: Vec::new(),
            pub_key: data,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.txid.is_empty() && self.vout == COINBASE_VOUT
    }

    /// Whether this input was created by the owner of `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(&self.pub_key).as_slice() == pub_key_hash
    }

    pub fn txid_hex(&self) -> String {
        hex::encode(&self.txid)
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        write_var_bytes(buf, &self.txid);
        buf.extend_from_slice(&self.vout.to_le_bytes());
        write_var_bytes(buf, &self.signature);
        write_var_bytes(buf, &self.pub_key);
    }

    fn read_from<R: Read>(reader: &mut R) -> std::result::Result<Self, CodecError> {
        let txid = read_var_bytes(reader)?;
        let vout = read_i64_le(reader)?;
        let signature = read_var_bytes(reader)?;
        let pub_key = read_var_bytes(reader)?;
        Ok(Self {
            txid,
            vout,
            signature,
            pub_key,
        })
    }
}

/// Transaction output - an amount locked to a public key hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: Vec<u8>) -> Self {
        Self {
            value,
            pub_key_hash,
        }
    }

    /// Create an output locked to an address
    pub fn lock(value: u64, address: &Address) -> Result<Self> {
        Ok(Self::new(value, address.to_pub_key_hash()?))
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(buf, &self.pub_key_hash);
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> std::result::Result<Self, CodecError> {
        let value = read_u64_le(reader)?;
        let pub_key_hash = read_var_bytes(reader)?;
        Ok(Self {
            value,
            pub_key_hash,
        })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// SHA256 of the serialized inputs and outputs
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a transaction and compute its id
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();
        tx
    }

    /// Create a coinbase transaction paying `subsidy` to `to`
    ///
    /// `data` is carried in the input's public key field; an empty string
    /// is replaced by a reward note naming the recipient.
    pub fn new_coinbase(to: &Address, data: &str, subsidy: u64) -> Result<Self> {
        let data = if data.is_empty() {
            format!("Reward to '{}'", to)
        } else {
            data.to_string()
        };

        let input = TxInput::coinbase(data.into_bytes());
        let output = TxOutput::lock(subsidy, to)?;
        Ok(Self::new(vec![input], vec![output]))
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Hash of the inputs and outputs; the id field is not covered
    pub fn hash(&self) -> Hash256 {
        sha256(&self.body_bytes())
    }

    /// Copy with every input's signature and public key cleared
    pub fn trimmed(&self) -> Self {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput::new(input.txid.clone(), input.vout, Vec::new()))
            .collect();

        Self {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|out| out.value).sum()
    }

    /// Sign every input with `key`
    ///
    /// Each input signs its own digest of the trimmed copy, taken with that
    /// input's public key field temporarily set to the hash locking the
    /// output it spends.
    pub fn sign(&mut self, key: &SigningKey, prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        for input in &self.inputs {
            referenced_output(prev_txs, input)?;
        }

        let mut trimmed = self.trimmed();

        for index in 0..trimmed.inputs.len() {
            let locking_hash = referenced_output(prev_txs, &trimmed.inputs[index])?
                .pub_key_hash
                .clone();
            let digest = trimmed.input_digest(index, locking_hash);

            let signature: Signature = key
                .sign_prehash_with_rng(&mut OsRng, digest.as_bytes())
                .map_err(|e| ChainError::InvalidTransaction(format!("{}: {}", self.id, e)))?;

            self.inputs[index].signature = signature.to_bytes().to_vec();
        }

        Ok(())
    }

    /// Check every input's signature; stops at the first failure
    ///
    /// A non-coinbase transaction without inputs spends nothing and is
    /// never valid.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }
        if self.inputs.is_empty() {
            return Ok(false);
        }

        for input in &self.inputs {
            if !prev_txs.contains_key(&input.txid_hex()) {
                return Err(ChainError::PriorTransactionNotFound(input.txid_hex()));
            }
        }

        let mut trimmed = self.trimmed();

        for (index, input) in self.inputs.iter().enumerate() {
            let Ok(prev_output) = referenced_output(prev_txs, input) else {
                return Ok(false);
            };

            if !input.uses_key(&prev_output.pub_key_hash) {
                return Ok(false);
            }

            let digest = trimmed.input_digest(index, prev_output.pub_key_hash.clone());

            if input.signature.len() != SIGNATURE_LEN {
                return Ok(false);
            }
            let Ok(signature) = Signature::from_slice(&input.signature) else {
                return Ok(false);
            };
            let Some(verifying_key) = decode_public_key(&input.pub_key) else {
                return Ok(false);
            };

            if verifying_key.verify_prehash(digest.as_bytes(), &signature).is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Digest signed by input `index`: hash of this (trimmed) transaction
    /// with that input's public key field set to `locking_hash`
    fn input_digest(&mut self, index: usize, locking_hash: Vec<u8>) -> Hash256 {
        self.inputs[index].signature.clear();
        self.inputs[index].pub_key = locking_hash;
        self.id = self.hash();
        self.inputs[index].pub_key.clear();
        self.id
    }

    fn body_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_to(&mut buf);
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_to(&mut buf);
        }

        buf
    }
}

/// Look up the output an input spends
fn referenced_output<'a>(prev_txs: &'a PrevTransactions, input: &TxInput) -> Result<&'a TxOutput> {
    let prev_tx = prev_txs
        .get(&input.txid_hex())
        .ok_or_else(|| ChainError::PriorTransactionNotFound(input.txid_hex()))?;

    usize::try_from(input.vout)
        .ok()
        .and_then(|vout| prev_tx.outputs.get(vout))
        .ok_or_else(|| {
            ChainError::InvalidTransaction(format!(
                "output {} of {} does not exist",
                input.vout,
                input.txid_hex()
            ))
        })
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(&self.body_bytes());
        buf
    }

    fn from_reader<R: Read>(reader: &mut R) -> std::result::Result<Self, CodecError> {
        let id = read_hash(reader)?;

        let input_count = read_varint(reader)?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            inputs.push(TxInput::read_from(reader)?);
        }

        let output_count = read_varint(reader)?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOutput::read_from(reader)?);
        }

        Ok(Self {
            id,
            inputs,
            outputs,
        })
    }
}
