//! Ordered pool of password-protected wallets.
//!
//! The pool is persisted as one JSON array under a fixed key. The first entry is
//! the active wallet. No two entries share the same `(pubkey, address)` pair,
//! and entries are never edited in place, only appended or removed.
//!
//! Every read-modify-write runs under the store's write lock, so tasks sharing
//! one `WalletPoolStore` serialize. Separate processes writing the same backing
//! store are not coordinated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::address;
use crate::config::WalletConfig;
use crate::export::ExportCodec;
use crate::keys::{self, KeyError, KeyPair};
use crate::persistence::{KeyValueStore, PersistenceError};
use crate::storage::{self, StorageError, StoredPrivateKey};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("wallet pool is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWallet {
    pub address: String,
    pub pubkey: String,
    pub encrypted_private_key: StoredPrivateKey,
    pub created_at: DateTime<Utc>,
}

impl StoredWallet {
    fn matches(&self, pubkey: &str, address: &str) -> bool {
        self.pubkey == pubkey && self.address == address
    }

    /// Decrypts the private key, `None` on a wrong password or tampered blob.
    pub fn decrypt(&self, password: &str) -> Option<String> {
        self.encrypted_private_key.decrypt(password)
    }
}

/// Result of [`WalletPoolStore::add`]; a duplicate is a failure, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub is_failed: bool,
    pub message: String,
    pub wallet: Option<StoredWallet>,
}

impl AddOutcome {
    fn added(wallet: StoredWallet) -> Self {
        AddOutcome {
            is_failed: false,
            message: "Wallet added".to_string(),
            wallet: Some(wallet),
        }
    }

    fn duplicate() -> Self {
        AddOutcome {
            is_failed: true,
            message: "Wallet already exists".to_string(),
            wallet: None,
        }
    }
}

pub struct WalletPoolStore<S> {
    store: S,
    pool_key: String,
    codec: ExportCodec,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> WalletPoolStore<S> {
    pub fn new(store: S, pool_key: impl Into<String>, codec: ExportCodec) -> Self {
        WalletPoolStore {
            store,
            pool_key: pool_key.into(),
            codec,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(store: S, config: &WalletConfig) -> Self {
        Self::new(store, config.pool_key.clone(), ExportCodec::new(&config.export))
    }

    pub fn codec(&self) -> &ExportCodec {
        &self.codec
    }

    pub fn backing_store(&self) -> &S {
        &self.store
    }

    /// The persisted pool, or an empty one if nothing was stored yet.
    pub async fn list(&self) -> Result<Vec<StoredWallet>, PoolError> {
        match self.store.get(&self.pool_key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// First entry of the pool, used for reauthentication.
    pub async fn active(&self) -> Result<Option<StoredWallet>, PoolError> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Encrypts `wallet` under `password` and appends it unless already present.
    pub async fn add(&self, wallet: &KeyPair, password: &str) -> Result<AddOutcome, PoolError> {
        let pubkey = wallet.public_key();
        let address = wallet.address();

        let _guard = self.write_lock.lock().await;
        let mut pool = self.list().await?;
        if pool.iter().any(|w| w.matches(pubkey, &address)) {
            debug!(%address, "wallet already in pool");
            return Ok(AddOutcome::duplicate());
        }

        let stored = StoredWallet {
            address,
            pubkey: pubkey.to_string(),
            encrypted_private_key: storage::encrypt_for_storage(wallet.private_key(), password)?,
            created_at: Utc::now(),
        };
        pool.push(stored.clone());
        self.persist(&pool).await?;

        info!(address = %stored.address, size = pool.len(), "wallet added to pool");
        Ok(AddOutcome::added(stored))
    }

    /// Removes the whole pool.
    pub async fn clear(&self) -> Result<(), PoolError> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(&self.pool_key).await?;
        info!("wallet pool cleared");
        Ok(())
    }

    /// Looks up the wallet an export envelope belongs to.
    ///
    /// An envelope that does not decode yields `None`, same as an unknown wallet.
    pub async fn find_by_exported_key(
        &self,
        envelope: &str,
    ) -> Result<Option<StoredWallet>, PoolError> {
        let (pubkey, address) = match self.identity_of(envelope) {
            Some(identity) => identity,
            None => return Ok(None),
        };
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|w| w.matches(&pubkey, &address)))
    }

    /// Deletes the entry stored under the envelope itself and the pool entry
    /// holding the same key. Returns whether a pool entry was removed.
    pub async fn remove_by_key(&self, envelope: &str) -> Result<bool, PoolError> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(envelope).await?;

        let (pubkey, address) = match self.identity_of(envelope) {
            Some(identity) => identity,
            None => return Ok(false),
        };
        self.retain_locked(|w| !w.matches(&pubkey, &address)).await
    }

    /// Removes the entry with the given address.
    pub async fn remove_by_address(&self, address: &str) -> Result<bool, PoolError> {
        let _guard = self.write_lock.lock().await;
        self.retain_locked(|w| w.address != address).await
    }

    /// Decrypts the stored wallet with `address`.
    ///
    /// `Ok(None)` covers both an unknown address and a wrong password.
    pub async fn unlock(&self, address: &str, password: &str) -> Result<Option<KeyPair>, PoolError> {
        let wallet = match self.list().await?.into_iter().find(|w| w.address == address) {
            Some(wallet) => wallet,
            None => return Ok(None),
        };
        match wallet.decrypt(password) {
            Some(private_key) => Ok(Some(KeyPair::from_private_hex(&private_key)?)),
            None => Ok(None),
        }
    }

    fn identity_of(&self, envelope: &str) -> Option<(String, String)> {
        let private_key = Zeroizing::new(self.codec.import_from_backup(envelope)?);
        let pubkey = keys::public_from_private(&private_key).ok()?;
        let address = address::address_of(&pubkey).ok()?;
        Some((pubkey, address))
    }

    // Caller must hold the write lock.
    async fn retain_locked<F>(&self, keep: F) -> Result<bool, PoolError>
    where
        F: Fn(&StoredWallet) -> bool,
    {
        let mut pool = self.list().await?;
        let before = pool.len();
        pool.retain(|w| keep(w));
        if pool.len() == before {
            return Ok(false);
        }
        self.persist(&pool).await?;
        info!(removed = before - pool.len(), size = pool.len(), "wallet removed from pool");
        Ok(true)
    }

    async fn persist(&self, pool: &[StoredWallet]) -> Result<(), PoolError> {
        let raw = serde_json::to_string(pool)?;
        self.store.set(&self.pool_key, raw).await?;
        Ok(())
    }
}
