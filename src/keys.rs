use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::address;

/// Hex width of a 32-byte private scalar.
pub const PRIVATE_KEY_HEX_LEN: usize = 64;
/// Hex width of an uncompressed X||Y point without the SEC1 tag byte.
pub const PUBLIC_KEY_HEX_LEN: usize = 128;

const MAX_GENERATION_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("key generation produced malformed output {0} times")]
    GenerationExhausted(usize),
}

/// A P-256 key pair held in memory as hex strings.
///
/// The private half is zeroized on drop and never serialized.
#[derive(Clone)]
pub struct KeyPair {
    private_key: Zeroizing<String>,
    public_key: String,
    address: String,
}

impl KeyPair {
    /// Generates a fresh key pair, retrying while the encoded widths are off.
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_with(|| {
            let secret = SecretKey::random(&mut OsRng);
            let private_key = Zeroizing::new(hex::encode(secret.to_bytes()));
            (private_key, encode_public(&secret.public_key()))
        })
    }

    // `next` yields (private hex, public hex) candidates.
    fn generate_with<F>(mut next: F) -> Result<Self, KeyError>
    where
        F: FnMut() -> (Zeroizing<String>, String),
    {
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let (private_key, public_key) = next();
            if has_expected_shape(&private_key, &public_key) {
                debug!(attempt, "generated key pair");
                return Self::assemble(private_key, public_key);
            }
            warn!(attempt, "discarding key pair with unexpected encoded width");
        }
        Err(KeyError::GenerationExhausted(MAX_GENERATION_ATTEMPTS))
    }

    /// Rebuilds a key pair from a private scalar in hex.
    pub fn from_private_hex(private_key_hex: &str) -> Result<Self, KeyError> {
        let public_key = public_from_private(private_key_hex)?;
        Self::assemble(Zeroizing::new(private_key_hex.to_lowercase()), public_key)
    }

    fn assemble(private_key: Zeroizing<String>, public_key: String) -> Result<Self, KeyError> {
        let address = address::address_of(&public_key)?;
        Ok(KeyPair {
            private_key,
            public_key,
            address,
        })
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Ledger address of this key pair.
    pub fn address(&self) -> String {
        self.address.clone()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derives the uncompressed X||Y public key (hex) for a private scalar (hex).
pub fn public_from_private(private_key_hex: &str) -> Result<String, KeyError> {
    let secret = parse_secret(private_key_hex)?;
    Ok(encode_public(&secret.public_key()))
}

pub(crate) fn parse_secret(private_key_hex: &str) -> Result<SecretKey, KeyError> {
    let bytes = Zeroizing::new(
        hex::decode(private_key_hex)
            .map_err(|e| KeyError::InvalidKeyMaterial(format!("private key hex: {}", e)))?,
    );
    if bytes.len() != 32 {
        return Err(KeyError::InvalidKeyMaterial(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    SecretKey::from_slice(&bytes)
        .map_err(|_| KeyError::InvalidKeyMaterial("scalar out of range".to_string()))
}

// SEC1 uncompressed points start with 0x04; the ledger wants the bare coordinates.
fn encode_public(public_key: &PublicKey) -> String {
    let point = public_key.to_encoded_point(false);
    hex::encode(&point.as_bytes()[1..])
}

fn has_expected_shape(private_key: &str, public_key: &str) -> bool {
    private_key.len() == PRIVATE_KEY_HEX_LEN && public_key.len() == PUBLIC_KEY_HEX_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pair_has_fixed_widths() {
        let pair = KeyPair::generate().unwrap();
        assert_eq!(pair.private_key().len(), PRIVATE_KEY_HEX_LEN);
        assert_eq!(pair.public_key().len(), PUBLIC_KEY_HEX_LEN);
        assert!(pair.public_key().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn public_key_is_deterministic() {
        let pair = KeyPair::generate().unwrap();
        let derived = public_from_private(pair.private_key()).unwrap();
        assert_eq!(derived, pair.public_key());

        let rebuilt = KeyPair::from_private_hex(pair.private_key()).unwrap();
        assert_eq!(rebuilt.public_key(), pair.public_key());
    }

    #[test]
    fn rejects_unusable_scalars() {
        assert!(matches!(
            public_from_private("zz"),
            Err(KeyError::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            public_from_private(&"00".repeat(32)),
            Err(KeyError::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            public_from_private(&"ab".repeat(16)),
            Err(KeyError::InvalidKeyMaterial(_))
        ));
        // curve order n is not a valid scalar
        let order = "ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551";
        assert!(public_from_private(order).is_err());
    }

    #[test]
    fn shape_check() {
        assert!(has_expected_shape(&"a".repeat(64), &"b".repeat(128)));
        assert!(!has_expected_shape(&"a".repeat(62), &"b".repeat(128)));
        assert!(!has_expected_shape(&"a".repeat(64), &"b".repeat(130)));
    }

    #[test]
    fn generation_retries_past_malformed_candidates() {
        let real = KeyPair::generate().unwrap();
        let mut calls = 0;
        let pair = KeyPair::generate_with(|| {
            calls += 1;
            if calls < 3 {
                // a scalar that lost its leading zero byte
                (Zeroizing::new(real.private_key()[2..].to_string()), real.public_key().to_string())
            } else {
                (Zeroizing::new(real.private_key().to_string()), real.public_key().to_string())
            }
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(pair.public_key(), real.public_key());
        assert_eq!(pair.address(), real.address());
    }

    #[test]
    fn generation_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result = KeyPair::generate_with(|| {
            calls += 1;
            (Zeroizing::new("ab".repeat(31)), "cd".repeat(64))
        });
        assert!(matches!(
            result,
            Err(KeyError::GenerationExhausted(MAX_GENERATION_ATTEMPTS))
        ));
        assert_eq!(calls, MAX_GENERATION_ATTEMPTS);
    }

    #[test]
    fn debug_hides_private_key() {
        let pair = KeyPair::generate().unwrap();
        let rendered = format!("{:?}", pair);
        assert!(!rendered.contains(pair.private_key()));
    }
}
