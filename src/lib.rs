pub mod address;
pub mod config;
pub mod export;
pub mod keys;
pub mod persistence;
pub mod pool;
pub mod session;
pub mod signer;
pub mod storage;

pub use address::{address_of, is_valid_address};
pub use config::{ExportConfig, WalletConfig};
pub use export::{ExportCodec, ExportError};
pub use keys::{public_from_private, KeyError, KeyPair};
pub use persistence::{FileStore, KeyValueStore, MemoryStore, PersistenceError};
pub use pool::{AddOutcome, PoolError, StoredWallet, WalletPoolStore};
pub use session::{
    ConnectedWallet, ConnectionProof, LedgerService, SessionBridge, SessionError, SignedRequest,
    Step,
};
pub use signer::{sign, sign_raw_bytes, verify, SignError};
pub use storage::{decrypt_from_storage, encrypt_for_storage, StorageError, StoredPrivateKey};
