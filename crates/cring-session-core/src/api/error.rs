use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Verification rejected: {message}")]
    Rejected {
        message: String,
        lock_until: Option<DateTime<Utc>>,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body returned by the verification endpoints. Fields are read
/// loosely: a malformed `lockUntil` is dropped, not fatal.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    lock_until: Option<serde_json::Value>,
}

impl ErrorPayload {
    fn message(&self) -> Option<String> {
        self.message.as_ref()?.as_str().map(str::to_string)
    }

    fn lock_until(&self) -> Option<DateTime<Utc>> {
        let raw = self.lock_until.as_ref()?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 401 | 422 => match serde_json::from_str::<ErrorPayload>(body) {
                Ok(payload) => ApiError::Rejected {
                    message: payload.message().unwrap_or_else(|| truncated.clone()),
                    lock_until: payload.lock_until(),
                },
                // Refresh answers a bare 401 when the token itself is no good
                Err(_) if status.as_u16() == 401 => ApiError::Unauthorized,
                Err(_) => ApiError::Rejected {
                    message: truncated,
                    lock_until: None,
                },
            },
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the server answered and said no, as opposed to not answering.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }
}
