//! Persistent key/value storage.
//!
//! Everything the session lock persists (credential envelope, lock record,
//! preferences) goes through the `KeyValueStore` trait. Calls are synchronous
//! and each one is atomic on its own; there is no multi-key transaction.
//!
//! Backends:
//! - `FileStore`: one file per key inside the cache directory
//! - `KeyringStore`: OS keychain entries via `keyring`
//! - `MemoryStore`: in-process map for tests and ephemeral runs

pub mod file;
pub mod keychain;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;

pub use file::FileStore;
pub use keychain::KeyringStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Keychain access failed for {key}: {source}")]
    Keyring {
        key: String,
        #[source]
        source: keyring::Error,
    },

    #[error("Corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// String-keyed, string-valued persistent storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove an entry. Removing a key that does not exist is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Storage handle shared by the credential, lock and preference stores.
pub type SharedStore = Arc<dyn KeyValueStore>;
