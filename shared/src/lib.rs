pub mod codec;
pub mod crypto;
pub mod error;
pub mod hash;

pub use crypto::{
    public_key_from_bytes, sign_transaction_hash, verify_transaction_signature, KeyPair,
    PrivateKey, PublicKey, Signature, SignatureAlgorithm,
};
pub use error::CodecError;
pub use hash::Hash256;
