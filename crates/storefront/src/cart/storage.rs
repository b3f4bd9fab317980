//! Durable cart slots.
//!
//! A slot is one key holding one serialized [`CartSnapshot`]. The store only
//! ever reads a slot once (hydration) and overwrites it on every mutation.
//!
//! [`CartSnapshot`]: green_basket_core::CartSnapshot

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors reading or writing a cart slot.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Slot name cannot be stored.
    #[error("invalid slot name: {0:?}")]
    InvalidSlot(String),
}

/// Key/value storage for serialized carts.
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Read a slot. `Ok(None)` when nothing was stored yet.
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite a slot.
    async fn store(&self, slot: &str, payload: &str) -> Result<(), StorageError>;
}

// =============================================================================
// File storage
// =============================================================================

/// One JSON file per slot inside a data directory.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    /// Store slots under `dir` (created on first write).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, slot: &str) -> Result<PathBuf, StorageError> {
        if slot.is_empty() {
            return Err(StorageError::InvalidSlot(slot.to_owned()));
        }
        // "cart:abc" -> "cart-3aabc.json"; every byte outside [A-Za-z0-9_]
        // becomes `-xx`, so distinct slots never share a file
        let mut file_name = String::with_capacity(slot.len());
        for byte in slot.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                file_name.push(char::from(byte));
            } else {
                file_name.push_str(&format!("-{byte:02x}"));
            }
        }
        Ok(self.dir.join(format!("{file_name}.json")))
    }
}

#[async_trait]
impl CartStorage for FileCartStorage {
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(slot)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, slot: &str, payload: &str) -> Result<(), StorageError> {
        let path = self.path_for(slot)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a half-written slot
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

// =============================================================================
// Memory storage
// =============================================================================

/// Process-local slots for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryCartStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a slot.
    pub async fn seed(&self, slot: &str, payload: impl Into<String>) {
        self.slots
            .write()
            .await
            .insert(slot.to_owned(), payload.into());
    }

    /// Current payload of a slot.
    pub async fn get(&self, slot: &str) -> Option<String> {
        self.slots.read().await.get(slot).cloned()
    }

    /// Names of every slot written so far.
    pub async fn slots(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    async fn load(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(slot).await)
    }

    async fn store(&self, slot: &str, payload: &str) -> Result<(), StorageError> {
        self.seed(slot, payload).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCartStorage::new(dir.path().join("nested"));

        assert_eq!(storage.load("cart").await.unwrap(), None);

        storage.store("cart", r#"{"a":1}"#).await.unwrap();
        storage.store("cart", r#"{"a":2}"#).await.unwrap();
        assert_eq!(storage.load("cart").await.unwrap().unwrap(), r#"{"a":2}"#);
    }

    #[tokio::test]
    async fn test_file_storage_slot_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCartStorage::new(dir.path());

        storage.store("cart:abc", "x").await.unwrap();
        assert!(dir.path().join("cart-3aabc.json").exists());

        storage.store("../escape", "x").await.unwrap();
        assert!(dir.path().join("-2e-2e-2fescape.json").exists());

        assert!(matches!(
            storage.store("", "x").await,
            Err(StorageError::InvalidSlot(_))
        ));
    }

    #[tokio::test]
    async fn test_file_storage_similar_slots_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileCartStorage::new(dir.path());

        storage.store("cart:a", "colon").await.unwrap();
        storage.store("cart-a", "dash").await.unwrap();
        storage.store("a.b", "dot").await.unwrap();
        storage.store("a-b", "dash").await.unwrap();

        assert_eq!(storage.load("cart:a").await.unwrap().unwrap(), "colon");
        assert_eq!(storage.load("cart-a").await.unwrap().unwrap(), "dash");
        assert_eq!(storage.load("a.b").await.unwrap().unwrap(), "dot");
        assert_eq!(storage.load("a-b").await.unwrap().unwrap(), "dash");
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryCartStorage::new();
        assert_eq!(storage.load("cart").await.unwrap(), None);
        storage.store("cart", "payload").await.unwrap();
        assert_eq!(storage.get("cart").await.as_deref(), Some("payload"));
    }
}
