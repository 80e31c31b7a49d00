use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::storage::{Result, SharedStore, StorageError};

/// Storage key holding the serialized envelope.
pub const CREDENTIALS_KEY: &str = "cring.credentials";

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Access/refresh token bundle as persisted: `{accessToken, refreshToken, loginAt, expiresIn}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEnvelope {
    pub access_token: String,
    pub refresh_token: String,
    pub login_at: DateTime<Utc>,
    /// Lifetime granted by the server, in seconds.
    pub expires_in: i64,
}

impl CredentialEnvelope {
    /// Build an envelope issued at `now`, so that `expires_at = now + expires_in`.
    pub fn issue(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            login_at: now,
            expires_in,
        }
    }

    /// `login_at + expires_in`, or `None` when the lifetime is negative or
    /// does not fit the calendar.
    pub fn checked_expires_at(&self) -> Option<DateTime<Utc>> {
        if self.expires_in < 0 {
            return None;
        }
        Duration::try_seconds(self.expires_in).and_then(|d| self.login_at.checked_add_signed(d))
    }

    /// Expiry instant. An unrepresentable lifetime counts as expired at login.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.checked_expires_at().unwrap_or(self.login_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .checked_sub_signed(Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
            .map_or(true, |due| now >= due)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at() - now
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}

/// Owns the credential envelope entry in storage.
///
/// A read never hands out an expired token: expired or unreadable entries are
/// deleted on the spot and reported as absent.
#[derive(Clone)]
pub struct CredentialStore {
    store: SharedStore,
    clock: SharedClock,
}

impl CredentialStore {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub fn write(&self, envelope: &CredentialEnvelope) -> Result<()> {
        let contents = serde_json::to_string(envelope).map_err(|e| StorageError::Corrupt {
            key: CREDENTIALS_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(CREDENTIALS_KEY, &contents)?;
        debug!(expires_at = %envelope.expires_at(), "Credential envelope stored");
        Ok(())
    }

    pub fn read(&self) -> Result<Option<CredentialEnvelope>> {
        let Some(contents) = self.store.get(CREDENTIALS_KEY)? else {
            return Ok(None);
        };

        let envelope: CredentialEnvelope = match serde_json::from_str(&contents) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable credential envelope");
                self.store.remove(CREDENTIALS_KEY)?;
                return Ok(None);
            }
        };

        if envelope.checked_expires_at().is_none() {
            warn!(expires_in = envelope.expires_in, "Discarding credential envelope with unusable lifetime");
            self.store.remove(CREDENTIALS_KEY)?;
            return Ok(None);
        }

        if envelope.is_expired(self.clock.now()) {
            debug!(expired_at = %envelope.expires_at(), "Credential envelope expired, removing");
            self.store.remove(CREDENTIALS_KEY)?;
            return Ok(None);
        }

        Ok(Some(envelope))
    }

    /// Get the access token if a valid envelope exists
    pub fn access_token(&self) -> Result<Option<String>> {
        Ok(self.read()?.map(|envelope| envelope.access_token))
    }

    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.read()?.is_some())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(CREDENTIALS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::{KeyValueStore, MemoryStore};

    fn fixture() -> (Arc<MemoryStore>, ManualClock, CredentialStore) {
        let backing = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let store = CredentialStore::new(backing.clone(), Arc::new(clock.clone()));
        (backing, clock, store)
    }

    #[test]
    fn test_expires_at_is_login_plus_expires_in() {
        let now = Utc::now();
        let envelope = CredentialEnvelope::issue("a", "r", 3600, now);
        assert_eq!(envelope.expires_at(), now + Duration::seconds(3600));
        assert!(!envelope.is_expired(now));
        assert!(envelope.is_expired(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_needs_refresh_within_buffer() {
        let now = Utc::now();
        let envelope = CredentialEnvelope::issue("a", "r", 3600, now);
        assert!(!envelope.needs_refresh(now));
        assert!(envelope.needs_refresh(now + Duration::minutes(56)));
        assert_eq!(envelope.minutes_until_expiry(now + Duration::hours(2)), 0);
    }

    #[test]
    fn test_round_trip_preserves_tokens() {
        let (_, clock, store) = fixture();
        let envelope = CredentialEnvelope::issue("eyJhbGciOi.access", "refresh-ü-1", 900, clock.now());

        store.write(&envelope).unwrap();
        let read = store.read().unwrap().unwrap();
        assert_eq!(read.access_token.as_bytes(), envelope.access_token.as_bytes());
        assert_eq!(read.refresh_token.as_bytes(), envelope.refresh_token.as_bytes());
        assert_eq!(read, envelope);
    }

    #[test]
    fn test_expired_read_removes_entry() {
        let (backing, clock, store) = fixture();
        store
            .write(&CredentialEnvelope::issue("a", "r", 60, clock.now()))
            .unwrap();

        clock.advance(Duration::seconds(60));
        assert!(store.read().unwrap().is_none());
        assert!(backing.get(CREDENTIALS_KEY).unwrap().is_none());

        // Second read is still absent and does not error
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_discarded() {
        let (backing, _, store) = fixture();
        backing.set(CREDENTIALS_KEY, "{not json").unwrap();

        assert!(store.read().unwrap().is_none());
        assert!(backing.is_empty());
    }

    #[test]
    fn test_out_of_range_lifetime_is_discarded() {
        let (backing, clock, store) = fixture();
        let raw = format!(
            r#"{{"accessToken":"a","refreshToken":"r","loginAt":"{}","expiresIn":{}}}"#,
            clock.now().to_rfc3339(),
            i64::MAX
        );
        backing.set(CREDENTIALS_KEY, &raw).unwrap();

        assert!(store.read().unwrap().is_none());
        assert!(backing.is_empty());
    }

    #[test]
    fn test_unrepresentable_lifetime_counts_as_expired() {
        let now = Utc::now();
        let envelope = CredentialEnvelope::issue("a", "r", i64::MAX, now);
        assert!(envelope.checked_expires_at().is_none());
        assert_eq!(envelope.expires_at(), now);
        assert!(envelope.is_expired(now));
        assert!(envelope.needs_refresh(now));

        assert!(CredentialEnvelope::issue("a", "r", -1, now).checked_expires_at().is_none());
    }

    #[test]
    fn test_persisted_layout_uses_camel_case() {
        let (backing, clock, store) = fixture();
        store
            .write(&CredentialEnvelope::issue("a", "r", 60, clock.now()))
            .unwrap();

        let raw = backing.get(CREDENTIALS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["accessToken"], "a");
        assert_eq!(value["refreshToken"], "r");
        assert_eq!(value["expiresIn"], 60);
        assert!(value["loginAt"].is_string());
    }

    #[test]
    fn test_clear_logs_out() {
        let (_, clock, store) = fixture();
        store
            .write(&CredentialEnvelope::issue("a", "r", 60, clock.now()))
            .unwrap();
        assert!(store.is_valid().unwrap());

        store.clear().unwrap();
        assert!(store.access_token().unwrap().is_none());
    }
}
