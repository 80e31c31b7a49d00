//! Session-level error taxonomy.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum SessionError {
    /// No usable credential envelope; the caller should treat this as "no session".
    #[error("Session credentials are missing or expired")]
    ExpiredCredential,

    #[error("Verification rejected: {message}")]
    VerificationRejected {
        message: String,
        lock_until: Option<DateTime<Utc>>,
    },

    #[error("Configuration error: {0}")]
    ConfigurationMissing(#[from] ConfigError),

    #[error("Could not reach the server: {0}")]
    Transport(#[source] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("No password challenge is pending")]
    NotPending,

    #[error("Lock duration {0} is not usable")]
    InvalidLockDuration(chrono::Duration),
}

impl SessionError {
    /// Whether the user can recover by submitting again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::VerificationRejected { .. } | SessionError::Transport(_)
        )
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected {
                message,
                lock_until,
            } => SessionError::VerificationRejected {
                message,
                lock_until,
            },
            ApiError::Unauthorized => SessionError::ExpiredCredential,
            other => SessionError::Transport(other),
        }
    }
}
