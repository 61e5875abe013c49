//! RSA-PSS (SHA-256) key generation, signing and verification.

use crate::error::CodecError;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::pss::{Signature as PssSignature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

const RSA_KEY_BITS: usize = 2048;

/// Signature algorithms supported by the node. Only one today; kept as an
/// enum so the wire format has room to grow without breaking serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    RsaPssSha256,
}

/// An RSA public key, stored as PKIX/DER bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

/// An RSA private key, stored as PKCS#1/DER bytes. Zeroized on drop.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key_data: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

/// A generated RSA keypair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// An RSA-PSS signature together with the public key that can verify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
    public_key: PublicKey,
    algorithm: SignatureAlgorithm,
    timestamp: DateTime<Utc>,
}

impl PublicKey {
    /// Builds a public key from PKIX/DER bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to a valid RSA public key.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CodecError> {
        RsaPublicKey::from_public_key_der(&bytes)
            .map_err(|e| CodecError::BadEncoding(e.to_string()))?;
        Ok(Self {
            key_data: bytes,
            algorithm: SignatureAlgorithm::RsaPssSha256,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn to_rsa_public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from_public_key_der(&self.key_data)
            .expect("stored public key is valid DER, checked at construction")
    }

    /// Verifies a raw RSA-PSS/SHA-256 signature against `message`, without
    /// the timestamped [`Signature`] wrapper. This is what the transaction
    /// engine uses: a transaction's signature bytes are carried directly on
    /// the wire, not wrapped.
    ///
    /// # Errors
    ///
    /// Returns an error if `signature_bytes` is not a well-formed signature.
    pub fn verify_message(&self, message: &[u8], signature_bytes: &[u8]) -> Result<bool, CodecError> {
        let verifying_key: VerifyingKey<Sha256> = VerifyingKey::new(self.to_rsa_public_key());
        let signature = PssSignature::try_from(signature_bytes)
            .map_err(|e| CodecError::Verification(e.to_string()))?;
        Ok(verifying_key.verify(message, &signature).is_ok())
    }
}

impl PrivateKey {
    /// Builds a private key from PKCS#1/DER bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to a valid RSA private key.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CodecError> {
        RsaPrivateKey::from_pkcs1_der(&bytes)
            .map_err(|e| CodecError::BadEncoding(e.to_string()))?;
        Ok(Self {
            key_data: bytes,
            algorithm: SignatureAlgorithm::RsaPssSha256,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_data
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn to_rsa_private_key(&self) -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs1_der(&self.key_data)
            .expect("stored private key is valid DER, checked at construction")
    }

    /// Signs `message` with RSA-PSS/SHA-256, returning raw signature bytes
    /// (no [`Signature`] wrapper). Used by the transaction engine to sign
    /// input bytes directly.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, CodecError> {
        let signing_key = SigningKey::<Sha256>::new(self.to_rsa_private_key());
        let mut rng = OsRng;
        let signature = signing_key
            .try_sign_with_rng(&mut rng, message)
            .map_err(|e| CodecError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

impl KeyPair {
    /// Generates a fresh 2048-bit RSA keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or DER encoding fails.
    pub fn generate() -> Result<Self, CodecError> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| CodecError::KeyGeneration(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let priv_der = private_key
            .to_pkcs1_der()
            .map_err(|e| CodecError::KeyGeneration(e.to_string()))?;
        let pub_der = public_key
            .to_public_key_der()
            .map_err(|e| CodecError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            public_key: PublicKey {
                key_data: pub_der.as_bytes().to_vec(),
                algorithm: SignatureAlgorithm::RsaPssSha256,
            },
            private_key: PrivateKey {
                key_data: priv_der.as_bytes().to_vec(),
                algorithm: SignatureAlgorithm::RsaPssSha256,
            },
        })
    }

    /// Signs `message` with RSA-PSS over SHA-256.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CodecError> {
        let rsa_private = self.private_key.to_rsa_private_key();
        let signing_key = SigningKey::<Sha256>::new(rsa_private);
        let mut rng = OsRng;
        let signature = signing_key
            .try_sign_with_rng(&mut rng, message)
            .map_err(|e| CodecError::Signing(e.to_string()))?;

        Ok(Signature {
            data: signature.to_vec(),
            public_key: self.public_key.clone(),
            algorithm: SignatureAlgorithm::RsaPssSha256,
            timestamp: Utc::now(),
        })
    }
}

impl Signature {
    /// Verifies the signature against `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored signature bytes are malformed.
    pub fn verify(&self, message: &[u8]) -> Result<bool, CodecError> {
        let rsa_public = self.public_key.to_rsa_public_key();
        let verifying_key: VerifyingKey<Sha256> = VerifyingKey::new(rsa_public);
        let signature = PssSignature::try_from(self.data.as_slice())
            .map_err(|e| CodecError::Verification(e.to_string()))?;
        Ok(verifying_key.verify(message, &signature).is_ok())
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.key_data.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Signs a transaction hash with the given keypair.
///
/// # Errors
///
/// Returns an error if signing fails.
pub fn sign_transaction_hash(
    tx_hash: &crate::Hash256,
    keypair: &KeyPair,
) -> Result<Signature, CodecError> {
    keypair.sign(tx_hash.as_bytes())
}

/// Verifies a signature against a transaction hash.
///
/// # Errors
///
/// Returns an error if the signature is malformed.
pub fn verify_transaction_signature(
    tx_hash: &crate::Hash256,
    signature: &Signature,
) -> Result<bool, CodecError> {
    signature.verify(tx_hash.as_bytes())
}

/// Creates a public key from raw DER bytes.
///
/// # Errors
///
/// Returns an error if the bytes are invalid.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, CodecError> {
    PublicKey::from_bytes(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_and_verifies() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"a transaction's signing bytes";

        let signature = keypair.sign(message).unwrap();
        assert!(signature.verify(message).unwrap());
    }

    #[test]
    fn rejects_tampered_message() {
        let keypair = KeyPair::generate().unwrap();
        let signature = keypair.sign(b"original bytes").unwrap();
        assert!(!signature.verify(b"different bytes").unwrap());
    }

    #[test]
    fn public_key_round_trips_through_bytes() {
        let keypair = KeyPair::generate().unwrap();
        let bytes = keypair.public_key.as_bytes().to_vec();
        let reloaded = public_key_from_bytes(&bytes).unwrap();
        assert_eq!(reloaded, keypair.public_key);
    }

    #[test]
    fn raw_sign_and_verify_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"input bytes concatenated with output bytes";

        let sig_bytes = keypair.private_key.sign_message(message).unwrap();
        assert!(keypair
            .public_key
            .verify_message(message, &sig_bytes)
            .unwrap());
    }
}
