use bitcoin_hashes::{hash160, sha256d, Hash};
use p256::PublicKey;

use crate::keys::KeyError;

/// Version byte prepended to the public key hash.
///
/// Any version in `3..=146` keeps a 25-byte payload at exactly 34 base58 characters.
pub const ADDRESS_VERSION: u8 = 0x41;
/// Encoded address length.
pub const ADDRESS_LEN: usize = 34;

const HASH_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;
const PAYLOAD_LEN: usize = 1 + HASH_LEN + CHECKSUM_LEN;
const POINT_LEN: usize = 64;

/// Derives the ledger address of an uncompressed X||Y public key in hex.
///
/// `base58(version || RIPEMD160(SHA256(pubkey)) || checksum)`, where the checksum
/// is the first four bytes of `SHA256(SHA256(version || hash))`. The key must be
/// 64 bytes of hex describing a point on P-256.
pub fn address_of(public_key_hex: &str) -> Result<String, KeyError> {
    let key_bytes = hex::decode(public_key_hex)
        .map_err(|e| KeyError::InvalidKeyMaterial(format!("public key hex: {}", e)))?;
    if key_bytes.len() != POINT_LEN {
        return Err(KeyError::InvalidKeyMaterial(format!(
            "public key must be {} bytes, got {}",
            POINT_LEN,
            key_bytes.len()
        )));
    }

    let mut sec1 = Vec::with_capacity(1 + POINT_LEN);
    sec1.push(0x04);
    sec1.extend_from_slice(&key_bytes);
    PublicKey::from_sec1_bytes(&sec1)
        .map_err(|_| KeyError::InvalidKeyMaterial("public key is not on the curve".to_string()))?;

    // 1. Hash the public key: RIPEMD160(SHA256(pubkey))
    let pubkey_hash = hash160::Hash::hash(&key_bytes);

    // 2. Add version byte
    let mut address_bytes = Vec::with_capacity(1 + HASH_LEN);
    address_bytes.push(ADDRESS_VERSION);
    address_bytes.extend_from_slice(&pubkey_hash[..]);

    // 3. Encode with Base58Check (double-SHA256 checksum)
    Ok(bs58::encode(&address_bytes).with_check().into_string())
}

/// Checks the length and checksum of a base58 address.
pub fn is_valid_address(address: &str) -> bool {
    if address.len() != ADDRESS_LEN {
        return false;
    }
    let decoded = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    if decoded.len() != PAYLOAD_LEN {
        return false;
    }

    // checked by hand: bs58's `with_check` returns on the first differing byte
    let (body, checksum) = decoded.split_at(PAYLOAD_LEN - CHECKSUM_LEN);
    let expected = checksum_of(body);
    expected
        .iter()
        .zip(checksum.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn checksum_of(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = sha256d::Hash::hash(body);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

    #[test]
    fn derived_addresses_are_valid() {
        for _ in 0..32 {
            let pair = KeyPair::generate().unwrap();
            let address = address_of(pair.public_key()).unwrap();
            assert_eq!(address.len(), ADDRESS_LEN);
            assert!(address.chars().all(|c| BASE58_ALPHABET.contains(c)));
            assert!(is_valid_address(&address));
        }
    }

    #[test]
    fn address_is_deterministic() {
        let pair = KeyPair::generate().unwrap();
        assert_eq!(address_of(pair.public_key()).unwrap(), address_of(pair.public_key()).unwrap());
        assert_eq!(pair.address(), address_of(pair.public_key()).unwrap());
    }

    #[test]
    fn malformed_public_keys_are_rejected() {
        assert!(matches!(
            address_of("not a public key"),
            Err(KeyError::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            address_of(&"ab".repeat(33)),
            Err(KeyError::InvalidKeyMaterial(_))
        ));
        // right width, but (0, 0) is not on the curve
        assert!(matches!(
            address_of(&"00".repeat(64)),
            Err(KeyError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn extreme_payloads_keep_width() {
        // smallest and largest 20-byte hashes under the configured version
        for fill in [0x00u8, 0xff] {
            let mut body = vec![ADDRESS_VERSION];
            body.extend_from_slice(&[fill; HASH_LEN]);
            let encoded = bs58::encode(&body).with_check().into_string();
            assert_eq!(encoded.len(), ADDRESS_LEN);
            assert!(is_valid_address(&encoded));
        }
    }

    #[test]
    fn single_character_mutations_are_rejected() {
        let pair = KeyPair::generate().unwrap();
        let address = address_of(pair.public_key()).unwrap();
        let mut rejected = 0;
        let mut total = 0;
        for (i, original) in address.char_indices() {
            for replacement in ['2', 'z', 'Q'] {
                if replacement == original {
                    continue;
                }
                let mut mutated = address.clone();
                mutated.replace_range(i..i + 1, &replacement.to_string());
                total += 1;
                if !is_valid_address(&mutated) {
                    rejected += 1;
                }
            }
        }
        assert_eq!(rejected, total);
    }

    #[test]
    fn agrees_with_bs58_checked_decode() {
        let pair = KeyPair::generate().unwrap();
        let address = pair.address();
        let mut candidates = vec![address.clone()];
        for (i, _) in address.char_indices().step_by(5) {
            let mut mutated = address.clone();
            let replacement = if address[i..].starts_with('z') { "y" } else { "z" };
            mutated.replace_range(i..i + 1, replacement);
            candidates.push(mutated);
        }
        for candidate in candidates {
            let checked = bs58::decode(&candidate).with_check(None).into_vec().is_ok();
            assert_eq!(is_valid_address(&candidate), checked, "{}", candidate);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0O"));
        let pair = KeyPair::generate().unwrap();
        let address = address_of(pair.public_key()).unwrap();
        assert!(!is_valid_address(&address[1..]));
        assert!(!is_valid_address(&format!("{}1", address)));
    }
}
