//! ECDSA P-256 signing over canonicalized payloads.
//!
//! Signatures are the fixed-width `r || s` form (64 bytes, 128 hex characters),
//! never DER. The remote verifier depends on this layout.

use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::keys::{self, KeyError};

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid data hex: {0}")]
    DataHex(#[from] hex::FromHexError),
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<KeyError> for SignError {
    fn from(err: KeyError) -> Self {
        SignError::InvalidKeyMaterial(err.to_string())
    }
}

/// Produces the exact string that gets hashed and signed for `payload`.
///
/// Strings are taken verbatim. Everything else becomes compact JSON with object
/// keys sorted lexicographically at every depth.
pub fn canonicalize<T: Serialize + ?Sized>(payload: &T) -> Result<String, SignError> {
    match serde_json::to_value(payload)? {
        Value::String(s) => Ok(s),
        // serde_json::Map is ordered by key unless `preserve_order` is enabled
        other => Ok(serde_json::to_string(&sort_keys(other))?),
    }
}

// Rebuilds nested objects so ordering holds even if another crate in the tree
// turns on `preserve_order`.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Signs `SHA256(canonicalize(payload))` and returns `r || s` as hex.
pub fn sign<T: Serialize + ?Sized>(private_key_hex: &str, payload: &T) -> Result<String, SignError> {
    let signing_key = signing_key(private_key_hex)?;
    let message = canonicalize(payload)?;
    // RFC 6979 nonces, SHA-256 digest
    let signature: Signature = signing_key.sign(message.as_bytes());
    Ok(hex::encode(signature.to_bytes()))
}

/// Signs caller-supplied bytes as a prehash, without canonicalization or hashing.
pub fn sign_raw_bytes(private_key_hex: &str, data_hex: &str) -> Result<String, SignError> {
    let signing_key = signing_key(private_key_hex)?;
    let data = hex::decode(data_hex)?;
    let signature: Signature = signing_key
        .sign_prehash(&data)
        .map_err(|e| SignError::Signing(e.to_string()))?;
    Ok(hex::encode(signature.to_bytes()))
}

/// Checks an `r || s` signature over a payload, as the remote verifier does.
pub fn verify<T: Serialize + ?Sized>(public_key_hex: &str, payload: &T, signature_hex: &str) -> bool {
    let message = match canonicalize(payload) {
        Ok(message) => message,
        Err(_) => return false,
    };
    let verifying_key = match verifying_key(public_key_hex) {
        Some(key) => key,
        None => return false,
    };
    let signature = match hex::decode(signature_hex)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
    {
        Some(signature) => signature,
        None => return false,
    };
    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}

fn signing_key(private_key_hex: &str) -> Result<SigningKey, SignError> {
    let secret = keys::parse_secret(private_key_hex)?;
    Ok(SigningKey::from(secret))
}

fn verifying_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let coordinates = hex::decode(public_key_hex).ok()?;
    if coordinates.len() != 64 {
        return None;
    }
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&coordinates);
    VerifyingKey::from_sec1_bytes(&sec1).ok()
}
