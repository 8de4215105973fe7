use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("stored value is not valid UTF-8")]
    InvalidFormat,
}

/// Asynchronous string key-value store backing the wallet pool.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    async fn set(&self, key: &str, value: String) -> Result<(), PersistenceError>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), PersistenceError>;
}

/// In-memory store, used by tests and short-lived sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PersistenceError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Directory-backed store with one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    storage_dir: PathBuf,
}

impl FileStore {
    pub async fn open<P: AsRef<Path>>(storage_dir: P) -> Result<Self, PersistenceError> {
        let path = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&path).await?;

        Ok(FileStore { storage_dir: path })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    // Keys may contain separators (export envelopes do), so file names are hashed.
    fn get_file_path(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.storage_dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let file_path = self.get_file_path(key);
        match fs::read(&file_path).await {
            Ok(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|_| PersistenceError::InvalidFormat),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PersistenceError> {
        let file_path = self.get_file_path(key);
        // write then rename so readers never see a half-written pool
        let tmp_path = file_path.with_extension("json.tmp");
        fs::write(&tmp_path, value.as_bytes()).await?;
        fs::rename(&tmp_path, &file_path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let file_path = self.get_file_path(key);
        match fs::remove_file(file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("wallet_pool").await.unwrap(), None);

        store.set("wallet_pool", "[]".to_string()).await.unwrap();
        assert_eq!(store.get("wallet_pool").await.unwrap().as_deref(), Some("[]"));

        store.set("wallet_pool", "[1]".to_string()).await.unwrap();
        assert_eq!(store.get("wallet_pool").await.unwrap().as_deref(), Some("[1]"));

        store.delete("wallet_pool").await.unwrap();
        assert_eq!(store.get("wallet_pool").await.unwrap(), None);
        store.delete("wallet_pool").await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_cycle() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn file_store_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("pool")).await.unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn file_store_accepts_envelope_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let key = "00ff/..\\:::abcdef";
        store.set(key, "entry".to_string()).await.unwrap();
        assert_eq!(store.get(key).await.unwrap().as_deref(), Some("entry"));

        let reopened = FileStore::open(store.storage_dir()).await.unwrap();
        assert_eq!(reopened.get(key).await.unwrap().as_deref(), Some("entry"));
    }
}
