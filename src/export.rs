//! Portable backup strings for private keys.
//!
//! Envelope layout: `HEX(iv || tag || ciphertext) ":::" HEX(HMAC)`. The encrypted
//! plaintext is `padding ":::" private_key_hex`; the HMAC covers that same
//! plaintext, keyed by the system secret. The AES key is `SHA256(system_secret)`.
//!
//! This is a separate trust domain from [`crate::storage`]: the secret comes
//! from configuration, not from the user.

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::ExportConfig;
use crate::storage::{self, IV_LEN, TAG_LEN};

type HmacSha256 = Hmac<Sha256>;

pub const SEPARATOR: &str = ":::";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to seal export envelope")]
    EncryptionError,
}

pub struct ExportCodec {
    secret: Zeroizing<Vec<u8>>,
    aes_key: Zeroizing<[u8; 32]>,
    prefix: String,
}

impl ExportCodec {
    pub fn new(config: &ExportConfig) -> Self {
        let secret = Zeroizing::new(config.system_secret.as_bytes().to_vec());
        let aes_key: Zeroizing<[u8; 32]> = Zeroizing::new(Sha256::digest(&*secret).into());
        ExportCodec {
            secret,
            aes_key,
            prefix: format!("{}{}", config.padding, SEPARATOR),
        }
    }

    /// Encrypts and authenticates a private key into a copyable string.
    pub fn export_for_backup(&self, private_key_hex: &str) -> Result<String, ExportError> {
        let plaintext = Zeroizing::new(format!("{}{}", self.prefix, private_key_hex));
        let tag = self.mac()?.chain_update(plaintext.as_bytes()).finalize().into_bytes();

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let sealed = storage::seal(&self.aes_key, &iv, plaintext.as_bytes())
            .ok_or(ExportError::EncryptionError)?;
        let (cipher_text, auth_tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut body = Vec::with_capacity(IV_LEN + sealed.len());
        body.extend_from_slice(&iv);
        body.extend_from_slice(auth_tag);
        body.extend_from_slice(cipher_text);

        Ok(format!("{}{}{}", hex::encode(body), SEPARATOR, hex::encode(tag)))
    }

    /// Recovers the private key from an envelope, or `None` if any check fails.
    pub fn import_from_backup(&self, envelope: &str) -> Option<String> {
        let (body_hex, mac_hex) = envelope.rsplit_once(SEPARATOR)?;
        let body = hex::decode(body_hex).ok()?;
        let supplied_mac = hex::decode(mac_hex).ok()?;
        if body.len() < IV_LEN + TAG_LEN {
            debug!("export envelope shorter than iv and tag");
            return None;
        }

        let (iv, rest) = body.split_at(IV_LEN);
        let (auth_tag, cipher_text) = rest.split_at(TAG_LEN);
        let mut sealed = Vec::with_capacity(rest.len());
        sealed.extend_from_slice(cipher_text);
        sealed.extend_from_slice(auth_tag);

        let plaintext = storage::open(&self.aes_key, iv, &sealed)?;
        let plaintext = std::str::from_utf8(&plaintext).ok()?;
        let private_key = plaintext.strip_prefix(self.prefix.as_str())?;

        self.mac()
            .ok()?
            .chain_update(plaintext.as_bytes())
            .verify_slice(&supplied_mac)
            .ok()?;

        Some(private_key.to_string())
    }

    fn mac(&self) -> Result<HmacSha256, ExportError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| ExportError::EncryptionError)
    }
}

impl std::fmt::Debug for ExportCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportCodec").finish_non_exhaustive()
    }
}
