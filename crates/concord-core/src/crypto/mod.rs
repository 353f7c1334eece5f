//! Cryptographic primitives used to authenticate provider replies.
//!
//! - [`hashes`]: SHA-256 hex digests
//! - [`signatures`]: P-256 ECDSA verification of DER or raw `r || s` signatures

pub mod hashes;
pub mod signatures;

use thiserror::Error;

pub use hashes::sha256_hex;
pub use signatures::{normalize_signature, signed_message, ProviderKey, SIGNATURE_PREFIX};

/// Crypto operation errors.
///
/// None of these fail a call: a reply whose signature cannot be checked is simply not
/// counted toward consensus.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Input was not valid hex
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

impl From<hex::FromHexError> for CryptoError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}
