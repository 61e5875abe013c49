use crate::error::{ChainError, ChainResult};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::codec::{hex_decode, varint8};
use shared::Hash256;

/// A mined block: a coinbase transaction, zero or more regular
/// transactions, a link to the previous block and the nonce that made the
/// block's hash satisfy the difficulty predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub prev_hash: String,
    pub coinbase: Transaction,
    pub txs: Vec<Transaction>,
    pub nonce: u64,
}

impl Block {
    #[must_use]
    pub fn new(prev_hash: String, coinbase: Transaction, txs: Vec<Transaction>, nonce: u64) -> Self {
        let mut block = Self {
            hash: String::new(),
            prev_hash,
            coinbase,
            txs,
            nonce,
        };
        let _ = block.fill_hash();
        block
    }

    /// The canonical byte encoding used for hashing:
    /// `varint8(nonce) ‖ prev_hash ‖ per-tx(tx bytes ‖ tx hash) ‖ (coinbase bytes ‖ coinbase hash)`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::BadEncoding`] if `prev_hash` or any transaction
    /// hash is not valid hex, or a transaction's own canonical bytes cannot
    /// be computed.
    pub fn canonical_bytes(&self) -> ChainResult<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&varint8(self.nonce as i64));
        bytes.extend_from_slice(&hex_decode(&self.prev_hash)?);

        for tx in &self.txs {
            bytes.extend_from_slice(&tx.canonical_bytes()?);
            bytes.extend_from_slice(&hex_decode(&tx.hash)?);
        }

        bytes.extend_from_slice(&self.coinbase.canonical_bytes()?);
        bytes.extend_from_slice(&hex_decode(&self.coinbase.hash)?);

        Ok(bytes)
    }

    /// Computes and stores this block's hash.
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

    /// Returns `true` if this block's stored hash both matches its
    /// recomputed canonical hash and satisfies `difficulty`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::BadEncoding`] if the canonical bytes cannot be
    /// computed.
    pub fn verify_pow(&self, difficulty: u32) -> ChainResult<()> {
        let recomputed = Hash256::sha256(&self.canonical_bytes()?);
        if recomputed.to_string() != self.hash {
            return Err(ChainError::HashMismatch);
        }
        if !recomputed.meets_difficulty(difficulty) {
            return Err(ChainError::BadDifficulty);
        }
        Ok(())
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.coinbase.height
    }
}
