//! Persistent key/value storage.
//!
//! The client keeps credentials and identity-namespaced caches in a small
//! string key/value store, the way a browser client would use local storage.
//! Keys are always prefixed with the [`Surface`](basket_core::Surface) so the
//! storefront, admin, and inventory clients never see each other's state.
//!
//! Two implementations are provided:
//! - [`MemoryStore`] - process-local, used in tests and when no state file is
//!   configured
//! - [`FileStore`] - a single JSON document on disk

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised by a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value (or the backing file) is not valid JSON.
    #[error("Store parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Synchronous string key/value store.
///
/// Operations never perform network I/O and never hold locks across an
/// `.await`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// JSON helpers for any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Parse` if the stored value is not valid JSON for `T`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get(key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Serialize and write a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if serialization or the write fails.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
