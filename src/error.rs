use chain_core::ChainError;
use thiserror::Error;

/// Every error kind the node server and its network surface can produce.
/// Chain/ledger/mining errors are reused from `chain-core` rather than
/// re-encoded into a parallel vocabulary.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("peer {0} is already registered")]
    PeerAlreadyExists(String),

    #[error("peer {0} is unreachable")]
    PeerUnreachable(String),

    #[error("rpc call to {0} timed out")]
    RpcTimeout(String),

    #[error("malformed rpc message: {0}")]
    BadMessage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
