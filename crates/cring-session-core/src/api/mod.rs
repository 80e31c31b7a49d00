//! REST client for the partner verification endpoints.
//!
//! `ApiClient` carries its own base URL and bearer token; nothing is kept in
//! process-wide defaults. `Authenticator` is the seam the lock coordinator
//! talks to, so tests can swap in a stub.

pub mod client;
pub mod error;

use std::future::Future;

pub use client::{ApiClient, TokenGrant, VerifyRequest};
pub use error::ApiError;

/// Remote checks the session lock depends on.
pub trait Authenticator: Send + Sync {
    /// Verify a (pre-encrypted) password and obtain a fresh token grant.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send;

    /// Exchange a refresh token for a new grant.
    fn reissue(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send;
}
