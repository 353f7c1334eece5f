//! # Provider reply signatures (P-256)
//!
//! Every successful reply is signed by the provider over
//! `DSHACKLESIG/{nonce}/{upstream_id}/{sha256_hex(payload_json)}`, binding the payload to
//! the nonce issued for the subrequest and to the upstream node that produced it.
//!
//! Providers sign with ECDSA over P-256 and SHA-256 and ship the signature as hex-encoded
//! ASN.1 DER. DER stores `r` and `s` as signed integers of independent length, so
//! [`normalize_signature`] strips the sign padding and equalizes the halves before the
//! fixed-width `r || s` form is handed to the verifier.

use super::{hashes::sha256_hex, CryptoError};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde_json::Value;

/// Prefix of every signed message.
pub const SIGNATURE_PREFIX: &str = "DSHACKLESIG";

/// Byte width of one P-256 scalar.
const FIELD_BYTES: usize = 32;

const DER_SEQUENCE: u8 = 0x30;
const DER_INTEGER: u8 = 0x02;

/// Builds the message a provider signs for one reply.
///
/// `payload` is serialized compactly in the key order it was received in.
#[must_use]
pub fn signed_message(nonce: u64, upstream_id: &str, payload: &Value) -> String {
    let digest = sha256_hex(payload.to_string());
    format!("{SIGNATURE_PREFIX}/{nonce}/{upstream_id}/{digest}")
}

/// Converts a DER `SEQUENCE { INTEGER r, INTEGER s }` into `r || s` with both halves of
/// equal length.
///
/// Anything that does not start like a DER sequence of integers is returned unchanged.
#[must_use]
pub fn normalize_signature(bytes: &[u8]) -> Vec<u8> {
    if bytes.first() != Some(&DER_SEQUENCE) || bytes.get(2) != Some(&DER_INTEGER) {
        return bytes.to_vec();
    }

    let r_len = usize::from(bytes.get(3).copied().unwrap_or(0));
    let r = der_slice(bytes, 4, r_len);

    // skip the INTEGER tag of s
    let s_len_index = 4 + r_len + 1;
    let s_len = usize::from(bytes.get(s_len_index).copied().unwrap_or(0));
    let s = der_slice(bytes, s_len_index + 1, s_len);

    let r = strip_leading_zeros(r);
    let s = strip_leading_zeros(s);
    let width = r.len().max(s.len());

    let mut out = vec![0u8; width * 2];
    out[width - r.len()..width].copy_from_slice(r);
    out[width * 2 - s.len()..].copy_from_slice(s);
    out
}

fn der_slice(bytes: &[u8], start: usize, len: usize) -> &[u8] {
    let start = start.min(bytes.len());
    let end = start.saturating_add(len).min(bytes.len());
    &bytes[start..end]
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let leading = bytes.iter().take_while(|b| **b == 0).count();
    &bytes[leading..]
}

/// Pads each half of `r || s` to the P-256 field width.
fn to_fixed_width(raw: &[u8]) -> Result<[u8; FIELD_BYTES * 2], CryptoError> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(CryptoError::InvalidSignatureFormat);
    }
    let half = raw.len() / 2;
    if half > FIELD_BYTES {
        return Err(CryptoError::InvalidSignatureFormat);
    }

    let mut out = [0u8; FIELD_BYTES * 2];
    out[FIELD_BYTES - half..FIELD_BYTES].copy_from_slice(&raw[..half]);
    out[FIELD_BYTES * 2 - half..].copy_from_slice(&raw[half..]);
    Ok(out)
}

/// A provider's P-256 public key.
#[derive(Clone, Debug)]
pub struct ProviderKey(VerifyingKey);

impl ProviderKey {
    /// Parses a hex-encoded SEC1 point (uncompressed `04...` or compressed).
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key)?;
        VerifyingKey::from_sec1_bytes(&bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Verifies a hex-encoded DER (or raw `r || s`) signature over `message`.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str) -> Result<(), CryptoError> {
        let bytes = hex::decode(signature_hex)?;
        let fixed = to_fixed_width(&normalize_signature(&bytes))?;
        let signature =
            Signature::from_slice(&fixed).map_err(|_| CryptoError::InvalidSignatureFormat)?;

        self.0
            .verify(message, &signature)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}
