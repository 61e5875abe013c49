use crate::block::Block;
use crate::config::NodeConfig;
use crate::error::{ChainError, ChainResult};
use crate::ledger::Ledger;
use crate::pool::TransactionPool;
use crate::transaction::{apply_transactions, compute_fee, validate_coinbase};
use std::collections::HashMap;

/// Sentinel hash identifying the genesis node. Not a SHA-256 digest: the
/// genesis node has no mined block behind it.
pub const GENESIS_HASH: &str = "0";

/// A node in the fork-aware block tree. `block` is `None` only for the
/// genesis node. Parent/child links are stored as hashes rather than
/// pointers so the tree can't form reference cycles.
#[derive(Debug, Clone)]
pub struct ChainNode {
    pub block: Option<Block>,
    pub parent_hash: Option<String>,
    pub children: Vec<String>,
    pub height: u64,
    pub ledger: Ledger,
}

/// Result of a successful [`Blockchain::add_block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub tail_changed: bool,
}

/// The fork-aware block tree: every seen block lives forever, keyed by
/// hash, with the tail tracking the maximum-height node. `add_block` is
/// the sole writer of chain state.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: HashMap<String, ChainNode>,
    tail_hash: String,
}

impl Blockchain {
    #[must_use]
    pub fn genesis() -> Self {
        let mut chain = HashMap::new();
        chain.insert(
            GENESIS_HASH.to_string(),
            ChainNode {
                block: None,
                parent_hash: None,
                children: Vec::new(),
                height: 0,
                ledger: Ledger::new(),
            },
        );
        Self {
            chain,
            tail_hash: GENESIS_HASH.to_string(),
        }
    }

    #[must_use]
    pub fn lookup(&self, hash: &str) -> Option<&ChainNode> {
        self.chain.get(hash)
    }

    #[must_use]
    pub fn tail(&self) -> &ChainNode {
        self.chain
            .get(&self.tail_hash)
            .expect("tail hash always present in chain")
    }

    #[must_use]
    pub fn tail_hash(&self) -> &str {
        &self.tail_hash
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.tail().height
    }

    /// Validates and inserts `block`, updating the tail if its height
    /// strictly exceeds the current tail's height, and removing every
    /// included transaction's hash from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::DuplicateBlock`] if the hash is already
    /// present, [`ChainError::ParentMissing`] if `block.prev_hash` is
    /// unknown (the out-of-sync hint), [`ChainError::ParentTooDeep`] if
    /// the parent is buried deeper than `config.confirmation`, or any
    /// validation error surfaced while recomputing the resulting ledger.
    /// State is left unchanged on any error.
    pub fn add_block(
        &mut self,
        block: Block,
        config: &NodeConfig,
        pool: &mut TransactionPool,
    ) -> ChainResult<AddOutcome> {
        if self.chain.contains_key(&block.hash) {
            return Err(ChainError::DuplicateBlock);
        }

        block.verify_pow(config.difficulty)?;

        let parent_hash = block.prev_hash.clone();
        let parent = self
            .chain
            .get(&parent_hash)
            .ok_or(ChainError::ParentMissing)?;

        let parent_depth = self.tail().height.saturating_sub(parent.height);
        if parent_depth > config.confirmation {
            return Err(ChainError::ParentTooDeep);
        }

        let parent_height = parent.height;
        let mut ledger = parent.ledger.deep_copy();

        let fee = compute_fee(&block.txs, &ledger)?;
        validate_coinbase(&block.coinbase, config.coinbase_reward + fee)?;
        apply_transactions(&block.txs, &mut ledger)?;
        ledger.insert(
            (block.coinbase.hash.clone(), 0),
            block.coinbase.outputs[0].clone(),
        );

        let included_hashes: Vec<String> = block.txs.iter().map(|tx| tx.hash.clone()).collect();
        let block_hash = block.hash.clone();
        let height = parent_height + 1;

        self.chain.insert(
            block_hash.clone(),
            ChainNode {
                block: Some(block),
                parent_hash: Some(parent_hash.clone()),
                children: Vec::new(),
                height,
                ledger,
            },
        );
        if let Some(parent_node) = self.chain.get_mut(&parent_hash) {
            parent_node.children.push(block_hash.clone());
        }

        let tail_changed = height > self.tail().height;
        if tail_changed {
            self.tail_hash = block_hash;
        }

        pool.remove_all(included_hashes.iter().map(String::as_str));

        Ok(AddOutcome { tail_changed })
    }

    /// Walks back from the tail following parent links, collecting at
    /// most `n` of the newest blocks in ascending height order, stopping
    /// either at `hash` (second element `true`) or at genesis (`false`).
    #[must_use]
    pub fn get_blocks_from(&self, hash: &str, n: usize) -> (Vec<Block>, bool) {
        let mut collected = Vec::new();
        let mut synced = false;
        let mut current_hash = self.tail_hash.clone();

        while collected.len() < n {
            if current_hash == hash {
                synced = true;
                break;
            }
            let Some(node) = self.chain.get(&current_hash) else {
                break;
            };
            let Some(block) = &node.block else {
                break;
            };
            collected.push(block.clone());
            match &node.parent_hash {
                Some(parent_hash) => current_hash = parent_hash.clone(),
                None => break,
            }
        }

        collected.reverse();
        (collected, synced)
    }

    /// Deep copy of the ledger `depth` steps back from the tail, stopping
    /// early at genesis.
    #[must_use]
    pub fn ledger_at_depth(&self, depth: u64) -> Ledger {
        let mut current = self.tail();
        for _ in 0..depth {
            match &current.parent_hash {
                Some(parent_hash) => {
                    current = self
                        .chain
                        .get(parent_hash)
                        .expect("parent hash always present in chain");
                }
                None => break,
            }
        }
        current.ledger.deep_copy()
    }
}
