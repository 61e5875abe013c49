use crate::transaction::Transaction;
use std::collections::HashMap;

/// Pending, unmined transactions keyed by hash. A transaction leaves the
/// pool when it is included in a block added to the tree, or when the
/// miner discovers it can no longer be applied.
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    txs: HashMap<String, Transaction>,
}

impl TransactionPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            txs: HashMap::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.txs.contains_key(hash)
    }

    /// Inserts `tx`, returning `true` if it was not already pooled.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        self.txs.insert(tx.hash.clone(), tx).is_none()
    }

    pub fn remove(&mut self, hash: &str) -> Option<Transaction> {
        self.txs.remove(hash)
    }

    /// Removes every hash in `hashes` from the pool, e.g. after the
    /// transactions they name are included in a block.
    pub fn remove_all<'a>(&mut self, hashes: impl IntoIterator<Item = &'a str>) {
        for hash in hashes {
            self.txs.remove(hash);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// All pooled transactions, in no particular order; the miner drains
    /// this snapshot into a candidate block.
    pub fn drain_snapshot(&self) -> Vec<Transaction> {
        self.txs.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Output;
    use crate::transaction::Input;

    fn sample_tx(seed: u8) -> Transaction {
        Transaction::new(
            vec![Input::new(format!("{seed:02x}"), 0, Vec::new())],
            vec![Output::new(1.0, vec![seed])],
        )
    }

    #[test]
    fn insert_rejects_duplicate() {
        let mut pool = TransactionPool::new();
        let tx = sample_tx(1);
        assert!(pool.insert(tx.clone()));
        assert!(!pool.insert(tx));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn remove_all_clears_named_hashes() {
        let mut pool = TransactionPool::new();
        let tx1 = sample_tx(1);
        let tx2 = sample_tx(2);
        pool.insert(tx1.clone());
        pool.insert(tx2.clone());

        pool.remove_all([tx1.hash.as_str()]);

        assert!(!pool.contains(&tx1.hash));
        assert!(pool.contains(&tx2.hash));
    }
}
