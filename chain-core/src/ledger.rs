use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies an unspent output: the hex hash of the transaction that
/// produced it, and the output's index within that transaction.
pub type UtxoKey = (String, u64);

/// A transaction output: a value and the public key authorised to spend it.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub value: f64,
    pub public_key: Vec<u8>,
}

impl Output {
    #[must_use]
    pub const fn new(value: f64, public_key: Vec<u8>) -> Self {
        Self { value, public_key }
    }
}

/// The UTXO set at a particular point in the chain. Every `ChainNode` owns
/// its own snapshot; ledgers are never shared between chain nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    utxos: HashMap<UtxoKey, Output>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            utxos: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &UtxoKey) -> Option<&Output> {
        self.utxos.get(key)
    }

    pub fn insert(&mut self, key: UtxoKey, output: Output) {
        self.utxos.insert(key, output);
    }

    pub fn remove(&mut self, key: &UtxoKey) -> Option<Output> {
        self.utxos.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &UtxoKey) -> bool {
        self.utxos.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Produces an independent copy of the ledger. `HashMap::clone` is a
    /// true deep copy here because `Output` holds only owned data.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// UTXOs whose owning public key equals `public_key`, as `(UtxoKey, Output)`
    /// pairs, for balance queries.
    pub fn entries_for_public_key(&self, public_key: &[u8]) -> Vec<(UtxoKey, Output)> {
        self.utxos
            .iter()
            .filter(|(_, out)| out.public_key == public_key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UtxoKey, &Output)> {
        self.utxos.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash: &str, index: u64) -> UtxoKey {
        (hash.to_string(), index)
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let mut ledger = Ledger::new();
        let k = key("aa", 0);
        let out = Output::new(10.0, vec![1, 2, 3]);
        ledger.insert(k.clone(), out.clone());

        assert!(ledger.contains(&k));
        assert_eq!(ledger.get(&k), Some(&out));

        let removed = ledger.remove(&k);
        assert_eq!(removed, Some(out));
        assert!(!ledger.contains(&k));
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut ledger = Ledger::new();
        ledger.insert(key("aa", 0), Output::new(1.0, vec![]));

        let mut copy = ledger.deep_copy();
        copy.insert(key("bb", 0), Output::new(2.0, vec![]));

        assert_eq!(ledger.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn filters_entries_by_public_key() {
        let mut ledger = Ledger::new();
        ledger.insert(key("aa", 0), Output::new(1.0, vec![9]));
        ledger.insert(key("bb", 0), Output::new(2.0, vec![8]));

        let found = ledger.entries_for_public_key(&[9]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.value, 1.0);
    }
}
