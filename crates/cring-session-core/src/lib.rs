//! Session idle-lock for the CRING! Partner portal.
//!
//! The pieces, leaves first:
//! - `storage`: persistent key/value backends
//! - `auth`: credential envelope and lock record stores
//! - `idle`: debounced inactivity detection
//! - `lock`: the session lock coordinator
//! - `reauth`: password prompt state that unlocks the coordinator
//! - `api`: verification client and error translation
//! - `crypto`: field cipher for values sent to the verification endpoint
//! - `prefs`: persisted display preferences
//! - `config`: file/environment configuration

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod idle;
pub mod lock;
pub mod prefs;
pub mod reauth;
pub mod storage;

pub use api::{ApiClient, ApiError, Authenticator, TokenGrant, VerifyRequest};
pub use auth::{CredentialEnvelope, CredentialStore, LockStore};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, ConfigError, StorageBackend};
pub use crypto::{CryptoError, FieldCipher};
pub use error::SessionError;
pub use idle::{ActivityEvent, IdleConfig, IdleDetector, IdleHandle};
pub use lock::{Access, LockState, SessionLock};
pub use prefs::{PreferenceStore, Preferences, Theme};
pub use reauth::{Locale, ReauthPrompt, Submission};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, SharedStore, StorageError};
