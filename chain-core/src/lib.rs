pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod miner;
pub mod pool;
pub mod transaction;

pub use block::Block;
pub use chain::{AddOutcome, Blockchain, ChainNode, GENESIS_HASH};
pub use config::NodeConfig;
pub use error::{ChainError, ChainResult};
pub use ledger::{Ledger, Output, UtxoKey};
pub use miner::{mine_block, MineCommand, MiningOutcome};
pub use pool::TransactionPool;
pub use transaction::{apply_transactions, compute_fee, validate_coinbase, Input, Transaction};
