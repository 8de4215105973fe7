use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

pub(crate) const IV_LEN: usize = 12;
pub(crate) const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to encrypt private key")]
    EncryptionError,
}

/// At-rest form of a private key: AES-256-GCM output split into hex parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPrivateKey {
    pub cipher_text: String,
    pub iv: String,
    pub auth_tag: String,
}

/// Encrypts a private key under `SHA256(password)` with a fresh 12-byte IV.
///
/// The key derivation is a single hash, kept for compatibility with existing
/// stored blobs.
pub fn encrypt_for_storage(
    private_key_hex: &str,
    password: &str,
) -> Result<StoredPrivateKey, StorageError> {
    let key = password_key(password);

    // Generate nonce
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let sealed = seal(&key, &iv, private_key_hex.as_bytes())
        .ok_or(StorageError::EncryptionError)?;
    let (cipher_text, auth_tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(StoredPrivateKey {
        cipher_text: hex::encode(cipher_text),
        iv: hex::encode(iv),
        auth_tag: hex::encode(auth_tag),
    })
}

/// Decrypts a stored private key.
///
/// Any failure (wrong password, tampered part, malformed hex) yields `None`;
/// the caller cannot tell which check failed.
pub fn decrypt_from_storage(
    password: &str,
    cipher_text: &str,
    iv: &str,
    auth_tag: &str,
) -> Option<String> {
    let cipher_text = hex::decode(cipher_text).ok()?;
    let iv = hex::decode(iv).ok()?;
    let auth_tag = hex::decode(auth_tag).ok()?;
    if auth_tag.len() != TAG_LEN {
        return None;
    }

    let mut sealed = Vec::with_capacity(cipher_text.len() + TAG_LEN);
    sealed.extend_from_slice(&cipher_text);
    sealed.extend_from_slice(&auth_tag);

    let key = password_key(password);
    let plaintext = open(&key, &iv, &sealed)?;
    String::from_utf8(plaintext.to_vec()).ok()
}

impl StoredPrivateKey {
    /// Shorthand for [`decrypt_from_storage`] over this blob's parts.
    pub fn decrypt(&self, password: &str) -> Option<String> {
        decrypt_from_storage(password, &self.cipher_text, &self.iv, &self.auth_tag)
    }
}

fn password_key(password: &str) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(password.as_bytes()).into())
}

/// AES-256-GCM encrypt; output is `ciphertext || tag`.
pub(crate) fn seal(key: &[u8; 32], iv: &[u8], plaintext: &[u8]) -> Option<Vec<u8>> {
    if iv.len() != IV_LEN {
        return None;
    }
    let cipher = Aes256Gcm::new_from_slice(key).ok()?;
    cipher.encrypt(Nonce::from_slice(iv), plaintext).ok()
}

/// AES-256-GCM decrypt of `ciphertext || tag`, verifying the tag.
pub(crate) fn open(key: &[u8; 32], iv: &[u8], sealed: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    if iv.len() != IV_LEN {
        return None;
    }
    let cipher = Aes256Gcm::new_from_slice(key).ok()?;
    cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .ok()
        .map(Zeroizing::new)
}
