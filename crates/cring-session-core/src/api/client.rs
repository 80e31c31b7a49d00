//! HTTP client for the password verification and token refresh endpoints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApiError, Authenticator};
use crate::auth::CredentialEnvelope;
use crate::crypto::{CryptoError, FieldCipher};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const VERIFY_PASSWORD_PATH: &str = "/auth/verify-password";
const REFRESH_PATH: &str = "/auth/refresh";

/// Body of a password verification call. Both fields are already sealed
/// with the field cipher when this value exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub user_id: String,
    pub password: String,
}

impl VerifyRequest {
    pub fn sealed(cipher: &FieldCipher, user_id: &str, password: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            user_id: cipher.encrypt(user_id)?,
            password: cipher.encrypt(password)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token bundle returned on successful verification or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}

impl TokenGrant {
    /// Stamp the grant with its issue time. A lifetime that is negative or
    /// runs past the calendar is refused.
    pub fn into_envelope(self, now: DateTime<Utc>) -> Result<CredentialEnvelope, ApiError> {
        let expires_in = self.expires_in;
        let envelope =
            CredentialEnvelope::issue(self.access_token, self.refresh_token, expires_in, now);
        if envelope.checked_expires_at().is_none() {
            return Err(ApiError::InvalidResponse(format!(
                "expiresIn out of range: {}",
                expires_in
            )));
        }
        Ok(envelope)
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.endpoint(path);

        let mut request = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed");
            ApiError::NetworkError(e)
        })?;
        let response = Self::check_response(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    pub async fn verify_password(&self, request: &VerifyRequest) -> Result<TokenGrant, ApiError> {
        debug!("Submitting password verification");
        self.post(VERIFY_PASSWORD_PATH, request).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        debug!("Requesting token refresh");
        self.post(REFRESH_PATH, &RefreshRequest { refresh_token }).await
    }
}

impl Authenticator for ApiClient {
    async fn verify(&self, request: &VerifyRequest) -> Result<TokenGrant, ApiError> {
        self.verify_password(request).await
    }

    async fn reissue(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.refresh(refresh_token).await
    }
}
