//! End-to-end flow over a file-backed store: password gate, idle lock,
//! reload while locked, and automatic unlock at the deadline.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;

use cring_session_core::{
    Access, ActivityEvent, ApiError, Authenticator, FieldCipher, FileStore, IdleConfig,
    IdleDetector, Locale, LockState, ManualClock, ReauthPrompt, SessionLock, SharedStore,
    Submission, TokenGrant, VerifyRequest,
};

const SECRET: &str = "integration-secret";

struct FakeServer {
    cipher: FieldCipher,
}

impl Authenticator for FakeServer {
    async fn verify(&self, request: &VerifyRequest) -> Result<TokenGrant, ApiError> {
        let user = self.cipher.decrypt(&request.user_id).unwrap_or_default();
        let password = self.cipher.decrypt(&request.password).unwrap_or_default();
        if user == "USR-0042" && password == "s3cret" {
            Ok(TokenGrant {
                access_token: "login-access".to_string(),
                refresh_token: "login-refresh".to_string(),
                expires_in: 3600,
            })
        } else {
            Err(ApiError::Rejected {
                message: "invalid".to_string(),
                lock_until: None,
            })
        }
    }

    async fn reissue(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        Ok(TokenGrant {
            access_token: format!("after-{}", refresh_token),
            refresh_token: "next-refresh".to_string(),
            expires_in: 3600,
        })
    }
}

fn server() -> FakeServer {
    FakeServer {
        cipher: FieldCipher::from_secret(SECRET).unwrap(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_idle_lock_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store: SharedStore = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());
    let clock = ManualClock::new(Utc::now());
    let cipher = FieldCipher::from_secret(SECRET).unwrap();

    let mut lock: SessionLock<FakeServer, &'static str> =
        SessionLock::new(store.clone(), server(), Arc::new(clock.clone()))
            .with_idle_lock_duration(Duration::milliseconds(5000));
    assert_eq!(lock.check().await.unwrap(), LockState::Unlocked);

    // First protected access goes through the password gate
    assert_eq!(lock.request("open-payouts"), Access::Challenge);
    let mut prompt = ReauthPrompt::new(Locale::En);
    prompt.open();
    prompt.set_password("s3cret");
    let outcome = prompt.submit(&mut lock, &cipher, "USR-0042").await.unwrap();
    assert_eq!(outcome, Submission::Unlocked(Some("open-payouts")));

    // Idle detector signals inactivity; the owner locks in response
    let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
    let handle = IdleDetector::spawn(
        IdleConfig::with_threshold(StdDuration::from_secs(60)),
        move || {
            let _ = idle_tx.send(());
        },
    );
    tokio::time::sleep(StdDuration::from_secs(30)).await;
    assert!(handle.record(ActivityEvent::Scroll));
    assert!(idle_rx.try_recv().is_err());

    idle_rx.recv().await.unwrap();
    let locked = lock.lock_for_idle().unwrap();
    drop(handle);

    // A reload mounts a new coordinator over the same files
    let mut reloaded: SessionLock<FakeServer, ()> =
        SessionLock::new(store.clone(), server(), Arc::new(clock.clone()));
    assert_eq!(reloaded.check().await.unwrap(), locked);
    assert!(matches!(reloaded.request(()), Access::Masked { .. }));

    clock.advance(Duration::milliseconds(5001));
    assert_eq!(reloaded.tick().await.unwrap(), LockState::Unlocked);
    assert_eq!(
        reloaded.credentials().access_token().unwrap().as_deref(),
        Some("after-login-refresh")
    );

    // The original instance sees the record gone on its next check
    assert_eq!(lock.check().await.unwrap(), LockState::Unlocked);
}

#[tokio::test]
async fn test_wrong_user_is_rejected() {
    let store: SharedStore = Arc::new(cring_session_core::MemoryStore::new());
    let clock = ManualClock::new(Utc::now());
    let cipher = FieldCipher::from_secret(SECRET).unwrap();
    let mut lock: SessionLock<FakeServer, ()> =
        SessionLock::new(store, server(), Arc::new(clock));

    lock.request(());
    let mut prompt = ReauthPrompt::new(Locale::Id);
    prompt.set_password("s3cret");
    let outcome = prompt.submit(&mut lock, &cipher, "USR-9999").await.unwrap();
    assert_eq!(outcome, Submission::Rejected { lock_until: None });
    assert_eq!(lock.state(), LockState::PendingEntry);
    assert_eq!(prompt.error(), Some("Password salah, silakan coba lagi"));
}
