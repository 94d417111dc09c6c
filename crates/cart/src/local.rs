//! Durable local cart storage.
//!
//! The local store is a passive mirror: the engine writes the whole cart after
//! every local mutation and reads it once at startup. It is the only copy of
//! the cart for guests and the offline fallback for signed-in shoppers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use cartwheel_core::{CartSnapshot, LineItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Fixed key the cart is stored under.
pub const CART_STORAGE_KEY: &str = "cart";

/// Current persisted cart format.
const CART_FORMAT_VERSION: u32 = 1;

/// Errors that can occur when reading or writing the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cart could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Key contains characters that cannot be used as a file name.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// A synchronous key to JSON blob store.
pub trait LocalStore {
    /// Read the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the blob under `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        // Write to a sibling file first so a crash never leaves half a cart.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Cart persistence
// =============================================================================

/// On-disk envelope for a cart.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCart {
    version: u32,
    saved_at: DateTime<Utc>,
    items: Vec<LineItem>,
}

/// Write the snapshot under [`CART_STORAGE_KEY`]. An empty cart removes the key.
///
/// # Errors
///
/// Returns an error if the store rejects the write.
pub fn save_cart<S: LocalStore + ?Sized>(store: &S, cart: &CartSnapshot) -> Result<(), StoreError> {
    if cart.is_empty() {
        return store.remove(CART_STORAGE_KEY);
    }
    let envelope = PersistedCart {
        version: CART_FORMAT_VERSION,
        saved_at: Utc::now(),
        items: cart.items().to_vec(),
    };
    store.set(CART_STORAGE_KEY, &serde_json::to_string(&envelope)?)
}

/// Read the persisted cart.
///
/// Unreadable, corrupt or future-format blobs yield an empty cart; the store
/// is a convenience mirror and must never prevent the engine from starting.
pub fn load_cart<S: LocalStore + ?Sized>(store: &S) -> CartSnapshot {
    let blob = match store.get(CART_STORAGE_KEY) {
        Ok(Some(blob)) => blob,
        Ok(None) => return CartSnapshot::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read persisted cart, starting empty");
            return CartSnapshot::new();
        }
    };

    match serde_json::from_str::<PersistedCart>(&blob) {
        Ok(envelope) if envelope.version == CART_FORMAT_VERSION => {
            CartSnapshot::from_items(envelope.items.into_iter().filter(|i| i.quantity > 0))
        }
        Ok(envelope) => {
            warn!(
                version = envelope.version,
                "Persisted cart has unsupported format version, discarding"
            );
            CartSnapshot::new()
        }
        Err(e) => {
            warn!(error = %e, "Persisted cart is corrupt, discarding");
            CartSnapshot::new()
        }
    }
}
