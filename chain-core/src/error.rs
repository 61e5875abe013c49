use shared::CodecError;
use thiserror::Error;

/// Every error kind the chain, ledger, transaction engine and miner can
/// surface. The node-server layer adds its own network-facing variants on
/// top of this enum rather than inventing a parallel vocabulary.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("bad encoding: {0}")]
    BadEncoding(String),

    #[error("recomputed hash does not match the stored hash")]
    HashMismatch,

    #[error("signature verification failed")]
    BadSignature,

    #[error("block does not satisfy the difficulty predicate")]
    BadDifficulty,

    #[error("input references a UTXO that does not exist in the ledger")]
    UnknownInput,

    #[error("input spends the same UTXO as another input in the same transaction")]
    DoubleSpend,

    #[error("output value is negative")]
    NegativeOutput,

    #[error("sum of inputs is less than sum of outputs")]
    InsufficientFunds,

    #[error("coinbase transaction is malformed or overpays: {0}")]
    BadCoinbase(String),

    #[error("block hash already present in the chain")]
    DuplicateBlock,

    #[error("parent block not found; node may be out of sync")]
    ParentMissing,

    #[error("parent block is buried too deep to be extended")]
    ParentTooDeep,

    #[error("mining cancelled by command")]
    CancelledByCommand,

    #[error("exhausted the nonce space without finding a solution")]
    ExhaustedNonceSpace,
}

impl From<CodecError> for ChainError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::BadEncoding(msg) => Self::BadEncoding(msg),
            CodecError::Verification(msg)
            | CodecError::KeyGeneration(msg)
            | CodecError::Signing(msg) => Self::BadEncoding(msg),
        }
    }
}

pub type ChainResult<T> = std::result::Result<T, ChainError>;
