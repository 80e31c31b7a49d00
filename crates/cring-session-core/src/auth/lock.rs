use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::storage::{Result, SharedStore};

/// Storage key holding the lock-expiry timestamp (RFC 3339).
pub const LOCK_KEY: &str = "cring.lock_until";

/// Owns the Lock Record: a single expiry timestamp, independent of credentials.
#[derive(Clone)]
pub struct LockStore {
    store: SharedStore,
    clock: SharedClock,
}

impl LockStore {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub fn set(&self, until: DateTime<Utc>) -> Result<()> {
        self.store
            .set(LOCK_KEY, &until.to_rfc3339_opts(SecondsFormat::AutoSi, true))?;
        debug!(until = %until, "Lock record set");
        Ok(())
    }

    /// Raw lock expiry, whether or not it has passed.
    pub fn get(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(LOCK_KEY)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(until) => Ok(Some(until.with_timezone(&Utc))),
            Err(e) => {
                warn!(error = %e, value = %raw, "Discarding unreadable lock record");
                self.store.remove(LOCK_KEY)?;
                Ok(None)
            }
        }
    }

    /// Lock expiry if it is still in the future. A past record is cleared.
    pub fn active(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get()? {
            Some(until) if until > self.clock.now() => Ok(Some(until)),
            Some(until) => {
                debug!(until = %until, "Lock record expired, clearing");
                self.clear()?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(LOCK_KEY)
    }
}
