//! Wallet connect, import and reauthentication flows.
//!
//! Each flow is sequential and reports numbered [`Step`]s. When the remote
//! ledger rejects a freshly created or imported wallet, the entry that was just
//! added to the pool is removed again before the rejection is returned. A
//! failed removal is logged and never replaces the original error.

use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::export::ExportError;
use crate::keys::{KeyError, KeyPair};
use crate::persistence::KeyValueStore;
use crate::pool::{PoolError, StoredWallet, WalletPoolStore};
use crate::signer::{self, SignError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("Invalid or foreign export key")]
    InvalidExport,
    #[error("Wallet already exists")]
    DuplicateWallet,
    #[error("No wallet connected")]
    NoActiveWallet,
    #[error("Ledger rejected request: {0}")]
    RemoteRejection(String),
}

/// Data signed to prove control of a wallet when connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProof {
    pub nonce: String,
    pub publickey: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub address: String,
}

impl ConnectionProof {
    pub fn new(pair: &KeyPair) -> Self {
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        ConnectionProof {
            nonce: hex::encode(nonce),
            publickey: pair.public_key().to_string(),
            timestamp: Utc::now().timestamp(),
            address: pair.address(),
        }
    }
}

/// Wire shape sent to the ledger: `{ "data": ..., "sig": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest<T> {
    pub data: T,
    pub sig: String,
}

/// Remote ledger service. Errors carry the remote message.
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn connect(&self, request: SignedRequest<ConnectionProof>) -> Result<(), String>;

    async fn submit_transaction(
        &self,
        request: SignedRequest<serde_json::Value>,
    ) -> Result<(), String>;
}

/// Progress of a create or import flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    GeneratingKeys,
    DecodingBackup,
    EncryptingWallet,
    SigningProof,
    Submitting,
    RollingBack,
    Done,
}

impl Step {
    pub fn number(&self) -> u8 {
        match self {
            Step::GeneratingKeys | Step::DecodingBackup => 1,
            Step::EncryptingWallet => 2,
            Step::SigningProof => 3,
            Step::Submitting => 4,
            Step::RollingBack => 5,
            Step::Done => 6,
        }
    }
}

/// A wallet that the ledger accepted.
#[derive(Debug, Clone)]
pub struct ConnectedWallet {
    pub wallet: StoredWallet,
    /// Backup string for the private key
    pub export: String,
}

pub struct SessionBridge<S, L> {
    pool: WalletPoolStore<S>,
    ledger: L,
}

impl<S: KeyValueStore, L: LedgerService> SessionBridge<S, L> {
    pub fn new(pool: WalletPoolStore<S>, ledger: L) -> Self {
        SessionBridge { pool, ledger }
    }

    pub fn pool(&self) -> &WalletPoolStore<S> {
        &self.pool
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Generates a key pair, stores it under `password` and connects it.
    pub async fn create_wallet<F>(
        &self,
        password: &str,
        mut progress: F,
    ) -> Result<ConnectedWallet, SessionError>
    where
        F: FnMut(Step) + Send,
    {
        report(&mut progress, Step::GeneratingKeys);
        let pair = KeyPair::generate()?;
        self.store_and_connect(pair, password, &mut progress).await
    }

    /// Restores a wallet from an export envelope, stores it and connects it.
    pub async fn import_wallet<F>(
        &self,
        envelope: &str,
        password: &str,
        mut progress: F,
    ) -> Result<ConnectedWallet, SessionError>
    where
        F: FnMut(Step) + Send,
    {
        report(&mut progress, Step::DecodingBackup);
        let private_key = Zeroizing::new(
            self.pool
                .codec()
                .import_from_backup(envelope)
                .ok_or(SessionError::InvalidExport)?,
        );
        let pair = KeyPair::from_private_hex(&private_key)?;
        self.store_and_connect(pair, password, &mut progress).await
    }

    /// Unlocks the active wallet with `password` and signs a fresh connection proof.
    pub async fn reauthenticate(&self, password: &str) -> Result<StoredWallet, SessionError> {
        let (wallet, pair) = self.unlock_active(password).await?;
        let request = connection_request(&pair)?;
        self.ledger
            .connect(request)
            .await
            .map_err(SessionError::RemoteRejection)?;
        info!(address = %wallet.address, "wallet reauthenticated");
        Ok(wallet)
    }

    /// Signs a transaction body with the active wallet and submits it.
    pub async fn submit_transaction<T: Serialize>(
        &self,
        password: &str,
        transaction: &T,
    ) -> Result<SignedRequest<serde_json::Value>, SessionError> {
        let (wallet, pair) = self.unlock_active(password).await?;
        let data = serde_json::to_value(transaction).map_err(SignError::from)?;
        let sig = signer::sign(pair.private_key(), &data)?;
        let request = SignedRequest { data, sig };

        self.ledger
            .submit_transaction(request.clone())
            .await
            .map_err(SessionError::RemoteRejection)?;
        info!(address = %wallet.address, "transaction submitted");
        Ok(request)
    }

    /// Produces a fresh backup string for the active wallet.
    pub async fn export_active(&self, password: &str) -> Result<String, SessionError> {
        let (_, pair) = self.unlock_active(password).await?;
        Ok(self.pool.codec().export_for_backup(pair.private_key())?)
    }

    /// Forgets every stored wallet.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.pool.clear().await?;
        Ok(())
    }

    async fn unlock_active(&self, password: &str) -> Result<(StoredWallet, KeyPair), SessionError> {
        let wallet = self.pool.active().await?.ok_or(SessionError::NoActiveWallet)?;
        let private_key = Zeroizing::new(
            wallet
                .decrypt(password)
                .ok_or(SessionError::IncorrectPassword)?,
        );
        let pair = KeyPair::from_private_hex(&private_key)?;
        Ok((wallet, pair))
    }

    async fn store_and_connect(
        &self,
        pair: KeyPair,
        password: &str,
        progress: &mut (dyn FnMut(Step) + Send),
    ) -> Result<ConnectedWallet, SessionError> {
        report(progress, Step::EncryptingWallet);
        let outcome = self.pool.add(&pair, password).await?;
        let wallet = match outcome.wallet {
            Some(wallet) if !outcome.is_failed => wallet,
            _ => return Err(SessionError::DuplicateWallet),
        };

        report(progress, Step::SigningProof);
        let request = match connection_request(&pair) {
            Ok(request) => request,
            Err(e) => {
                self.roll_back(&wallet, progress).await;
                return Err(e);
            }
        };

        report(progress, Step::Submitting);
        if let Err(message) = self.ledger.connect(request).await {
            warn!(address = %wallet.address, %message, "ledger rejected wallet");
            self.roll_back(&wallet, progress).await;
            return Err(SessionError::RemoteRejection(message));
        }

        let export = self.pool.codec().export_for_backup(pair.private_key())?;
        report(progress, Step::Done);
        info!(address = %wallet.address, "wallet connected");
        Ok(ConnectedWallet { wallet, export })
    }

    // Best effort: the caller's error is what gets returned.
    async fn roll_back(&self, wallet: &StoredWallet, progress: &mut (dyn FnMut(Step) + Send)) {
        report(progress, Step::RollingBack);
        if let Err(e) = self.pool.remove_by_address(&wallet.address).await {
            warn!(address = %wallet.address, error = %e, "rollback left wallet in pool");
        }
    }
}

fn connection_request(pair: &KeyPair) -> Result<SignedRequest<ConnectionProof>, SessionError> {
    let data = ConnectionProof::new(pair);
    let sig = signer::sign(pair.private_key(), &data)?;
    Ok(SignedRequest { data, sig })
}

fn report(progress: &mut (dyn FnMut(Step) + Send), step: Step) {
    info!(step = step.number(), ?step, "wallet flow");
    progress(step);
}
