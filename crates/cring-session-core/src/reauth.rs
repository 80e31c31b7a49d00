//! Re-authentication prompt.
//!
//! Form state behind the password dialog that guards protected content. A
//! successful submission completes the coordinator's pending entry and hands
//! back the deferred action; a failed one leaves a single inline error and
//! keeps the form open for another try. There is no attempt limit here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::api::{ApiError, Authenticator, VerifyRequest};
use crate::crypto::FieldCipher;
use crate::error::SessionError;
use crate::lock::{LockState, SessionLock};

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Id,
    En,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMessage {
    PasswordRequired,
    InvalidPassword,
    ConnectionFailed,
}

impl Locale {
    pub fn message(&self, message: PromptMessage) -> &'static str {
        match (self, message) {
            (Locale::Id, PromptMessage::PasswordRequired) => "Password wajib diisi",
            (Locale::Id, PromptMessage::InvalidPassword) => "Password salah, silakan coba lagi",
            (Locale::Id, PromptMessage::ConnectionFailed) => {
                "Terjadi kesalahan, silakan coba beberapa saat lagi"
            }
            (Locale::En, PromptMessage::PasswordRequired) => "Password is required",
            (Locale::En, PromptMessage::InvalidPassword) => "Incorrect password, please try again",
            (Locale::En, PromptMessage::ConnectionFailed) => {
                "Something went wrong, please try again shortly"
            }
        }
    }
}

/// Outcome of one submission.
#[derive(Debug, PartialEq, Eq)]
pub enum Submission<D> {
    /// Gate passed; carries the deferred action if one was waiting.
    Unlocked(Option<D>),
    /// Nothing was sent because the field was empty.
    Incomplete,
    /// The server said no. `lock_until` is passed through when it sends one.
    Rejected { lock_until: Option<DateTime<Utc>> },
    /// The server could not be reached or answered unexpectedly.
    Unreachable,
}

/// Check if a password character should be accepted
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && !c.is_control()
}

#[derive(Debug, Default)]
pub struct ReauthPrompt {
    /// Wiped on clear and on drop.
    password: Zeroizing<String>,
    error: Option<String>,
    open: bool,
    locale: Locale,
}

impl ReauthPrompt {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            ..Self::default()
        }
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    /// Close the dialog and clear its form state.
    pub fn close(&mut self) {
        self.open = false;
        self.password.zeroize();
        self.error = None;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn password_len(&self) -> usize {
        self.password.chars().count()
    }

    /// Append a typed character. Returns `false` if it was refused.
    pub fn push_char(&mut self, c: char) -> bool {
        if !can_add_password_char(self.password_len(), c) {
            return false;
        }
        self.password.push(c);
        true
    }

    pub fn pop_char(&mut self) {
        self.password.pop();
    }

    /// Replace the field contents, keeping only acceptable characters.
    pub fn set_password(&mut self, password: &str) {
        self.password.zeroize();
        for c in password.chars() {
            if !self.push_char(c) {
                break;
            }
        }
    }

    /// Send the password for verification.
    ///
    /// Requires the coordinator to be in `PendingEntry`.
    pub async fn submit<A: Authenticator, D>(
        &mut self,
        lock: &mut SessionLock<A, D>,
        cipher: &FieldCipher,
        user_id: &str,
    ) -> Result<Submission<D>, SessionError> {
        if lock.state() != LockState::PendingEntry {
            return Err(SessionError::NotPending);
        }

        if self.password.is_empty() {
            self.error = Some(self.locale.message(PromptMessage::PasswordRequired).to_string());
            return Ok(Submission::Incomplete);
        }

        let request = VerifyRequest::sealed(cipher, user_id, &self.password)?;

        let verdict = lock.authenticator().verify(&request).await;
        match verdict {
            Ok(grant) => {
                let deferred = lock.complete_entry(grant)?;
                self.close();
                info!("Re-authentication succeeded");
                Ok(Submission::Unlocked(deferred))
            }
            Err(ApiError::Rejected {
                message,
                lock_until,
            }) => {
                debug!(server_message = %message, "Password rejected");
                self.error = Some(self.locale.message(PromptMessage::InvalidPassword).to_string());
                Ok(Submission::Rejected { lock_until })
            }
            // The verification endpoint answers a bare 401 for a wrong password
            Err(ApiError::Unauthorized) => {
                debug!("Password rejected without details");
                self.error = Some(self.locale.message(PromptMessage::InvalidPassword).to_string());
                Ok(Submission::Rejected { lock_until: None })
            }
            Err(e) => {
                warn!(error = %e, "Password verification failed");
                self.error = Some(self.locale.message(PromptMessage::ConnectionFailed).to_string());
                Ok(Submission::Unreachable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::api::TokenGrant;
    use crate::auth::LOCK_KEY;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::{KeyValueStore, MemoryStore};

    const GOOD_PASSWORD: &str = "correct horse";
    /// Makes the stub answer like a server sending 401 with no JSON body.
    const BARE_401_PASSWORD: &str = "plain-401";

    /// Accepts only `GOOD_PASSWORD`, decrypting with the shared secret.
    struct StubVerifier {
        cipher: FieldCipher,
        calls: AtomicUsize,
        offline: bool,
    }

    impl StubVerifier {
        fn new(offline: bool) -> Self {
            Self {
                cipher: FieldCipher::from_secret("partner-secret").unwrap(),
                calls: AtomicUsize::new(0),
                offline,
            }
        }
    }

    impl Authenticator for StubVerifier {
        async fn verify(&self, request: &VerifyRequest) -> Result<TokenGrant, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                return Err(ApiError::ServerError("unavailable".to_string()));
            }
            let password = self
                .cipher
                .decrypt(&request.password)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
            if password == BARE_401_PASSWORD {
                return Err(ApiError::Unauthorized);
            }
            if password == GOOD_PASSWORD {
                Ok(TokenGrant {
                    access_token: "fresh-access".to_string(),
                    refresh_token: "fresh-refresh".to_string(),
                    expires_in: 900,
                })
            } else {
                Err(ApiError::Rejected {
                    message: "invalid password".to_string(),
                    lock_until: None,
                })
            }
        }

        async fn reissue(&self, _refresh_token: &str) -> Result<TokenGrant, ApiError> {
            Err(ApiError::Unauthorized)
        }
    }

    struct Fixture {
        backing: Arc<MemoryStore>,
        clock: ManualClock,
        cipher: FieldCipher,
        lock: SessionLock<StubVerifier, &'static str>,
        prompt: ReauthPrompt,
    }

    fn fixture(offline: bool) -> Fixture {
        let backing = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let lock = SessionLock::new(
            backing.clone(),
            StubVerifier::new(offline),
            Arc::new(clock.clone()),
        );
        Fixture {
            backing,
            clock,
            cipher: FieldCipher::from_secret("partner-secret").unwrap(),
            lock,
            prompt: ReauthPrompt::new(Locale::En),
        }
    }

    #[test]
    fn test_can_add_password_char() {
        assert!(can_add_password_char(0, 'a'));
        assert!(can_add_password_char(127, '!'));
        assert!(!can_add_password_char(128, 'a'));
        assert!(!can_add_password_char(0, '\x00'));
        assert!(!can_add_password_char(0, '\r'));
    }

    #[test]
    fn test_set_password_truncates_at_limit() {
        let mut prompt = ReauthPrompt::default();
        prompt.set_password(&"p".repeat(200));
        assert_eq!(prompt.password_len(), MAX_PASSWORD_LENGTH);
        prompt.pop_char();
        assert_eq!(prompt.password_len(), MAX_PASSWORD_LENGTH - 1);
    }

    #[test]
    fn test_locales_differ() {
        assert_ne!(
            Locale::Id.message(PromptMessage::InvalidPassword),
            Locale::En.message(PromptMessage::InvalidPassword)
        );
        assert_eq!(Locale::default(), Locale::Id);
    }

    #[tokio::test]
    async fn test_correct_password_unlocks_and_runs_deferred_once() {
        let mut f = fixture(false);
        assert!(matches!(f.lock.request("show-balance"), crate::lock::Access::Challenge));
        f.prompt.open();
        f.prompt.set_password(GOOD_PASSWORD);

        let outcome = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();
        assert_eq!(outcome, Submission::Unlocked(Some("show-balance")));
        assert_eq!(f.lock.state(), LockState::Unlocked);
        assert_eq!(f.lock.authenticator().calls.load(Ordering::SeqCst), 1);

        let envelope = f.lock.credentials().read().unwrap().unwrap();
        assert_eq!(envelope.access_token, "fresh-access");
        assert_eq!(envelope.expires_at(), f.clock.now() + Duration::seconds(900));

        assert!(!f.prompt.is_open());
        assert_eq!(f.prompt.password_len(), 0);
        assert!(f.prompt.error().is_none());

        // Later requests go straight through; nothing is replayed
        assert_eq!(f.lock.request("other"), crate::lock::Access::Granted("other"));
        assert!(!f.lock.has_deferred());
    }

    #[tokio::test]
    async fn test_wrong_password_keeps_pending_with_single_error() {
        let mut f = fixture(false);
        f.lock.request("show-balance");
        f.prompt.open();

        for attempt in 1..=2 {
            f.prompt.set_password("nope");
            let outcome = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();
            assert_eq!(outcome, Submission::Rejected { lock_until: None });
            assert_eq!(f.lock.authenticator().calls.load(Ordering::SeqCst), attempt);
        }

        assert_eq!(f.lock.state(), LockState::PendingEntry);
        assert!(f.lock.has_deferred());
        assert!(f.prompt.is_open());
        assert_eq!(
            f.prompt.error(),
            Some(Locale::En.message(PromptMessage::InvalidPassword))
        );
        assert!(f.backing.get(LOCK_KEY).unwrap().is_none());
        assert!(f.lock.credentials().read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bare_401_reads_as_wrong_password() {
        let mut f = fixture(false);
        f.lock.request("show-balance");
        f.prompt.open();
        f.prompt.set_password(BARE_401_PASSWORD);

        let outcome = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();
        assert_eq!(outcome, Submission::Rejected { lock_until: None });
        assert_eq!(f.lock.state(), LockState::PendingEntry);
        assert_eq!(
            f.prompt.error(),
            Some(Locale::En.message(PromptMessage::InvalidPassword))
        );
    }

    #[test]
    fn test_close_wipes_password_and_error() {
        let mut prompt = ReauthPrompt::new(Locale::En);
        prompt.open();
        prompt.set_password("secret");
        prompt.error = Some("x".to_string());

        prompt.close();
        assert!(prompt.password.is_empty());
        assert!(prompt.error().is_none());
        assert!(!prompt.is_open());

        // The field stays usable after a wipe
        assert!(prompt.push_char('a'));
        assert_eq!(prompt.password_len(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_rejection_succeeds() {
        let mut f = fixture(false);
        f.lock.request("show-balance");

        f.prompt.set_password("nope");
        f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();
        f.prompt.set_password(GOOD_PASSWORD);
        let outcome = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();

        assert_eq!(outcome, Submission::Unlocked(Some("show-balance")));
        assert!(f.prompt.error().is_none());
    }

    #[tokio::test]
    async fn test_empty_password_not_sent() {
        let mut f = fixture(false);
        f.lock.request("show-balance");

        let outcome = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();
        assert_eq!(outcome, Submission::Incomplete);
        assert_eq!(f.lock.authenticator().calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.prompt.error(),
            Some(Locale::En.message(PromptMessage::PasswordRequired))
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_shows_generic_error() {
        let mut f = fixture(true);
        f.lock.request("show-balance");
        f.prompt.set_password(GOOD_PASSWORD);

        let outcome = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap();
        assert_eq!(outcome, Submission::Unreachable);
        assert_eq!(f.lock.state(), LockState::PendingEntry);
        assert_eq!(
            f.prompt.error(),
            Some(Locale::En.message(PromptMessage::ConnectionFailed))
        );
    }

    #[tokio::test]
    async fn test_submit_requires_pending_entry() {
        let mut f = fixture(false);
        f.prompt.set_password(GOOD_PASSWORD);
        let err = f.prompt.submit(&mut f.lock, &f.cipher, "USR-0042").await.unwrap_err();
        assert!(matches!(err, SessionError::NotPending));
    }
}
