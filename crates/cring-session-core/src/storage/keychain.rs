use keyring::Entry;
use tracing::{debug, warn};

use super::{KeyValueStore, Result, StorageError};

/// Account written and read back when the store is opened.
const ROUND_TRIP_KEY: &str = "cring.backend-check";
const ROUND_TRIP_VALUE: &str = "ok";

/// Keeps each key as a separate OS keychain entry under one service name.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Open the keychain for `service`.
    ///
    /// Fails unless a value written to the keychain can be read back, so a
    /// build that only has keyring's in-memory mock never silently drops the
    /// lock record or the credential envelope.
    pub fn open(service: impl Into<String>) -> Result<Self> {
        let store = Self {
            service: service.into(),
        };

        ensure_persists(&store, &store.service)?;
        debug!(service = %store.service, "Keychain store opened");
        Ok(store)
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).map_err(|source| StorageError::Keyring {
            key: key.to_string(),
            source,
        })
    }
}

/// Write a marker, read it back and remove it again.
fn ensure_persists(store: &dyn KeyValueStore, service: &str) -> Result<()> {
    store.set(ROUND_TRIP_KEY, ROUND_TRIP_VALUE)?;
    let read_back = store.get(ROUND_TRIP_KEY)?;
    store.remove(ROUND_TRIP_KEY)?;

    if read_back.as_deref() != Some(ROUND_TRIP_VALUE) {
        warn!(service, "Keychain did not return a stored value");
        return Err(StorageError::Unavailable(format!(
            "keychain for service '{}' does not persist entries",
            service
        )));
    }
    Ok(())
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(source) => Err(StorageError::Keyring {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|source| StorageError::Keyring {
                key: key.to_string(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(source) => Err(StorageError::Keyring {
                key: key.to_string(),
                source,
            }),
        }
    }
}
