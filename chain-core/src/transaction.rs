use crate::error::{ChainError, ChainResult};
use crate::ledger::{Ledger, Output};
use serde::{Deserialize, Serialize};
use shared::codec::{f64_be_bytes, hex_decode, varint8};
use shared::{Hash256, PrivateKey, PublicKey};
use std::collections::HashSet;

/// Authorizes spending a referenced output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub prev_tx_hash: String,
    pub index: u64,
    pub signature: Vec<u8>,
}

impl Input {
    #[must_use]
    pub const fn new(prev_tx_hash: String, index: u64, signature: Vec<u8>) -> Self {
        Self {
            prev_tx_hash,
            index,
            signature,
        }
    }

    /// The canonical byte encoding of this input, signature excluded.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::BadEncoding`] if `prev_tx_hash` is not valid hex.
    pub fn canonical_bytes(&self) -> ChainResult<Vec<u8>> {
        let mut bytes = hex_decode(&self.prev_tx_hash)?;
        bytes.extend_from_slice(&varint8(self.index as i64));
        Ok(bytes)
    }
}

/// A transaction: coinbase transactions have zero inputs and exactly one
/// output; regular transactions have at least one of each. `height` is only
/// meaningful for coinbase transactions, where it makes otherwise-identical
/// coinbases at different heights hash differently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub height: u64,
}

impl Transaction {
    #[must_use]
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        let mut tx = Self {
            hash: String::new(),
            inputs,
            outputs,
            height: 0,
        };
        let _ = tx.fill_hash();
        tx
    }

    /// Builds the per-block coinbase transaction minting `reward` to
    /// `miner_key` at `height`.
    #[must_use]
    pub fn coinbase(reward: f64, miner_key: &[u8], height: u64) -> Self {
        let mut tx = Self {
            hash: String::new(),
            inputs: Vec::new(),
            outputs: vec![Output::new(reward, miner_key.to_vec())],
            height,
        };
        let _ = tx.fill_hash();
        tx
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty() && self.outputs.len() == 1
    }

    /// The canonical byte encoding used for both hashing and signing.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::BadEncoding`] if any input's `prev_tx_hash` is
    /// not valid hex.
    pub fn canonical_bytes(&self) -> ChainResult<Vec<u8>> {
        let mut bytes = Vec::new();
        for input in &self.inputs {
            bytes.extend_from_slice(&input.canonical_bytes()?);
        }
        for output in &self.outputs {
            bytes.extend_from_slice(&f64_be_bytes(output.value));
            bytes.extend_from_slice(&output.public_key);
        }
        bytes.extend_from_slice(&varint8(self.height as i64));
        Ok(bytes)
    }

    /// Computes and stores this transaction's hash. Idempotent: calling it
    /// twice without mutating inputs/outputs/height produces the same hash.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::BadEncoding`] if the canonical bytes cannot be
    /// computed.
    pub fn fill_hash(&mut self) -> ChainResult<()> {
        let bytes = self.canonical_bytes()?;
        self.hash = Hash256::sha256(&bytes).to_string();
        Ok(())
    }

    /// Signs input `index` with `private_key`, storing the signature on the
    /// input. The signed message is `input_i_bytes ‖ concat(output bytes)`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range, encoding fails, or
    /// signing fails.
    pub fn sign_input(&mut self, index: usize, private_key: &PrivateKey) -> ChainResult<()> {
        let message = self.input_signing_bytes(index)?;
        let signature = private_key.sign_message(&message)?;
        self.inputs
            .get_mut(index)
            .ok_or(ChainError::UnknownInput)?
            .signature = signature;
        Ok(())
    }

    fn input_signing_bytes(&self, index: usize) -> ChainResult<Vec<u8>> {
        let input = self.inputs.get(index).ok_or(ChainError::UnknownInput)?;
        let mut bytes = input.canonical_bytes()?;
        for output in &self.outputs {
            bytes.extend_from_slice(&f64_be_bytes(output.value));
            bytes.extend_from_slice(&output.public_key);
        }
        Ok(bytes)
    }

    /// Validates this transaction against `ledger`, in the order specified:
    /// hash, then per-input existence/signature/double-spend, then
    /// non-negative outputs, then sufficient funds.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant's [`ChainError`] variant.
    pub fn verify(&self, ledger: &Ledger) -> ChainResult<()> {
        let recomputed = Hash256::sha256(&self.canonical_bytes()?).to_string();
        if recomputed != self.hash {
            return Err(ChainError::HashMismatch);
        }

        let mut seen = HashSet::new();
        let mut input_total = 0.0_f64;
        for (i, input) in self.inputs.iter().enumerate() {
            let key = (input.prev_tx_hash.clone(), input.index);
            if !seen.insert(key.clone()) {
                return Err(ChainError::DoubleSpend);
            }
            let referenced = ledger.get(&key).ok_or(ChainError::UnknownInput)?;

            let public_key = PublicKey::from_bytes(referenced.public_key.clone())?;
            let message = self.input_signing_bytes(i)?;
            if !public_key.verify_message(&message, &input.signature)? {
                return Err(ChainError::BadSignature);
            }
            input_total += referenced.value;
        }

        let mut output_total = 0.0_f64;
        for output in &self.outputs {
            if output.value < 0.0 {
                return Err(ChainError::NegativeOutput);
            }
            output_total += output.value;
        }

        if input_total < output_total {
            return Err(ChainError::InsufficientFunds);
        }

        Ok(())
    }

    /// `sum(input values) - sum(output values)`, resolving input values
    /// against `ledger`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::UnknownInput`] if an input's UTXO is missing,
    /// and [`ChainError::InsufficientFunds`] if the fee would be negative.
    pub fn fee(&self, ledger: &Ledger) -> ChainResult<f64> {
        let mut input_total = 0.0_f64;
        for input in &self.inputs {
            let key = (input.prev_tx_hash.clone(), input.index);
            let referenced = ledger.get(&key).ok_or(ChainError::UnknownInput)?;
            input_total += referenced.value;
        }
        let output_total: f64 = self.outputs.iter().map(|o| o.value).sum();
        let fee = input_total - output_total;
        if fee < 0.0 {
            return Err(ChainError::InsufficientFunds);
        }
        Ok(fee)
    }
}

/// Validates a coinbase transaction: hash matches, exactly zero inputs and
/// one output, and the output does not exceed `max_payout` (reward + fees).
///
/// # Errors
///
/// Returns [`ChainError::BadCoinbase`] on any violation.
pub fn validate_coinbase(tx: &Transaction, max_payout: f64) -> ChainResult<()> {
    let recomputed = Hash256::sha256(&tx.canonical_bytes()?).to_string();
    if recomputed != tx.hash {
        return Err(ChainError::BadCoinbase("hash mismatch".to_string()));
    }
    if !tx.inputs.is_empty() {
        return Err(ChainError::BadCoinbase("coinbase has inputs".to_string()));
    }
    if tx.outputs.len() != 1 {
        return Err(ChainError::BadCoinbase(
            "coinbase must have exactly one output".to_string(),
        ));
    }
    if tx.outputs[0].value > max_payout {
        return Err(ChainError::BadCoinbase(format!(
            "coinbase pays {} but reward + fees is {}",
            tx.outputs[0].value, max_payout
        )));
    }
    Ok(())
}

/// Sum over `txs` of `fee(tx, ledger)`, honoring same-block chaining: a
/// later transaction's fee may depend on an earlier transaction's output
/// in the same call, so fees are accumulated against a scratch copy of
/// `ledger` updated in array order. `ledger` itself is left untouched.
///
/// # Errors
///
/// Propagates the first transaction's fee-computation error.
pub fn compute_fee(txs: &[Transaction], ledger: &Ledger) -> ChainResult<f64> {
    let mut scratch = ledger.clone();
    let mut total = 0.0_f64;
    for tx in txs {
        total += tx.fee(&scratch)?;
        for input in &tx.inputs {
            scratch.remove(&(input.prev_tx_hash.clone(), input.index));
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            scratch.insert((tx.hash.clone(), index as u64), output.clone());
        }
    }
    Ok(total)
}

/// Validates and applies each transaction in order against `ledger`,
/// mutating it in place: spent UTXOs are removed and each output is stored
/// keyed by `(tx.hash, output_index)`. A later transaction may spend an
/// earlier transaction's outputs within the same call.
///
/// # Errors
///
/// Returns the first transaction's validation error; `ledger` is left
/// exactly as it was after the last successfully applied transaction.
pub fn apply_transactions(txs: &[Transaction], ledger: &mut Ledger) -> ChainResult<()> {
    for tx in txs {
        tx.verify(ledger)?;
        for input in &tx.inputs {
            ledger.remove(&(input.prev_tx_hash.clone(), input.index));
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            ledger.insert((tx.hash.clone(), index as u64), output.clone());
        }
    }
    Ok(())
}
