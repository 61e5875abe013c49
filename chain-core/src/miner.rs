use crate::block::Block;
use crate::error::{ChainError, ChainResult};
use crate::ledger::Ledger;
use crate::transaction::Transaction;
use shared::Hash256;
use std::sync::mpsc::Receiver;

/// Commands the mining supervisor forwards to an in-progress mining job.
/// The miner polls for these non-blockingly before every nonce attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MineCommand {
    Stop,
    Restart,
}

/// A successfully mined block, plus any pooled transaction that could not
/// be applied against the ledger snapshot used for this job (e.g. because
/// its input was consumed by a block received from a peer mid-mine).
#[derive(Debug, Clone)]
pub struct MiningOutcome {
    pub block: Block,
    pub rejected_txs: Vec<Transaction>,
}

/// Filters `txs` against `ledger`, applying each in order to a scratch
/// copy and keeping only those that verify; the rest are returned
/// separately so the caller can evict them from the pool without
/// aborting the mining job.
fn select_valid_txs(txs: &[Transaction], ledger: &Ledger) -> (Vec<Transaction>, Vec<Transaction>) {
    let mut scratch = ledger.deep_copy();
    let mut valid = Vec::new();
    let mut rejected = Vec::new();

    for tx in txs {
        if tx.verify(&scratch).is_ok() {
            for input in &tx.inputs {
                scratch.remove(&(input.prev_tx_hash.clone(), input.index));
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                scratch.insert((tx.hash.clone(), index as u64), output.clone());
            }
            valid.push(tx.clone());
        } else {
            rejected.push(tx.clone());
        }
    }

    (valid, rejected)
}

/// Searches for a nonce whose block hash satisfies `difficulty`, polling
/// `cancel` non-blockingly before each attempt. CPU-bound; callers run
/// this on a dedicated blocking task rather than an async executor thread.
///
/// # Errors
///
/// Returns [`ChainError::CancelledByCommand`] if a command arrives on
/// `cancel`, or [`ChainError::ExhaustedNonceSpace`] if the nonce space
/// (`0..=u64::MAX`) is exhausted without a solution.
pub fn mine_block(
    txs: &[Transaction],
    prev_hash: &str,
    reward: f64,
    height: u64,
    miner_pk: &[u8],
    ledger: &Ledger,
    difficulty: u32,
    cancel: &Receiver<MineCommand>,
) -> ChainResult<MiningOutcome> {
    let (valid_txs, rejected_txs) = select_valid_txs(txs, ledger);
    let fee = crate::transaction::compute_fee(&valid_txs, ledger)?;
    let coinbase = Transaction::coinbase(reward + fee, miner_pk, height);

    let mut block = Block {
        hash: String::new(),
        prev_hash: prev_hash.to_string(),
        coinbase,
        txs: valid_txs,
        nonce: 0,
    };

    let mut nonce: u64 = 0;
    loop {
        if cancel.try_recv().is_ok() {
            return Err(ChainError::CancelledByCommand);
        }

        block.nonce = nonce;
        let digest = Hash256::sha256(&block.canonical_bytes()?);
        if digest.meets_difficulty(difficulty) {
            block.hash = digest.to_string();
            return Ok(MiningOutcome {
                block,
                rejected_txs,
            });
        }

        nonce = match nonce.checked_add(1) {
            Some(next) => next,
            None => return Err(ChainError::ExhaustedNonceSpace),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Output;
    use crate::transaction::Input;
    use shared::KeyPair;
    use std::sync::mpsc;

    #[test]
    fn mines_immediately_at_trivial_difficulty() {
        let keypair = KeyPair::generate().unwrap();
        let ledger = Ledger::new();
        let (_tx, rx) = mpsc::channel();

        let outcome = mine_block(
            &[],
            "0",
            50.0,
            1,
            keypair.public_key.as_bytes(),
            &ledger,
            0,
            &rx,
        )
        .unwrap();

        assert!(outcome.rejected_txs.is_empty());
        assert_eq!(outcome.block.coinbase.outputs[0].value, 50.0);
    }

    #[test]
    fn honors_cancellation_before_first_attempt() {
        let keypair = KeyPair::generate().unwrap();
        let ledger = Ledger::new();
        let (tx, rx) = mpsc::channel();
        tx.send(MineCommand::Stop).unwrap();

        let result = mine_block(
            &[],
            "0",
            50.0,
            1,
            keypair.public_key.as_bytes(),
            &ledger,
            0,
            &rx,
        );

        assert!(matches!(result, Err(ChainError::CancelledByCommand)));
    }

    #[test]
    fn rejects_unspendable_tx_without_aborting_job() {
        let keypair = KeyPair::generate().unwrap();
        let ledger = Ledger::new();
        let (_tx, rx) = mpsc::channel();

        let mut bad_tx = Transaction::new(
            vec![Input::new("missing".to_string(), 0, Vec::new())],
            vec![Output::new(1.0, keypair.public_key.as_bytes().to_vec())],
        );
        bad_tx.fill_hash().unwrap();

        let outcome = mine_block(
            std::slice::from_ref(&bad_tx),
            "0",
            50.0,
            1,
            keypair.public_key.as_bytes(),
            &ledger,
            0,
            &rx,
        )
        .unwrap();

        assert!(outcome.block.txs.is_empty());
        assert_eq!(outcome.rejected_txs.len(), 1);
        assert_eq!(outcome.rejected_txs[0].hash, bad_tx.hash);
    }
}
