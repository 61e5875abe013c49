use thiserror::Error;

/// Errors from the low-level codec and signing primitives. Higher crates
/// wrap this into their own richer error enum rather than matching on it
/// directly.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("bad encoding: {0}")]
    BadEncoding(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature verification failed: {0}")]
    Verification(String),
}
