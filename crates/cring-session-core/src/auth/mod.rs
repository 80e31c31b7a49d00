//! Persisted authentication state.
//!
//! This module provides:
//! - `CredentialStore`: the access/refresh token envelope with expiry
//! - `LockStore`: the lock-expiry timestamp, stored independently
//!
//! Both sit on top of a shared `KeyValueStore` and read "now" from a `Clock`.

pub mod credentials;
pub mod lock;

pub use credentials::{CredentialEnvelope, CredentialStore, CREDENTIALS_KEY};
pub use lock::{LockStore, LOCK_KEY};
