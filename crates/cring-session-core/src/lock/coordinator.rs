use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::api::{Authenticator, TokenGrant};
use crate::auth::{CredentialStore, LockStore};
use crate::clock::SharedClock;
use crate::error::SessionError;
use crate::storage::SharedStore;

/// Lock applied when the idle detector fires (5 minutes)
const DEFAULT_IDLE_LOCK_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    PendingEntry,
    Locked { until: DateTime<Utc> },
}

/// Answer to a request for gated content.
#[derive(Debug, PartialEq, Eq)]
pub enum Access<D> {
    /// Go ahead; the action is handed straight back.
    Granted(D),
    /// The password prompt must be shown; the action is held until it succeeds.
    Challenge,
    /// Content stays masked until the lock lifts.
    Masked { until: DateTime<Utc> },
}

/// Session lock coordinator.
///
/// `D` is whatever the caller wants run once the password gate opens; it is
/// handed back exactly once from `complete_entry`.
pub struct SessionLock<A, D> {
    credentials: CredentialStore,
    locks: LockStore,
    authenticator: A,
    clock: SharedClock,
    state: LockState,
    gate_passed: bool,
    deferred: Option<D>,
    idle_lock_duration: Duration,
}

impl<A: Authenticator, D> SessionLock<A, D> {
    pub fn new(store: SharedStore, authenticator: A, clock: SharedClock) -> Self {
        Self {
            credentials: CredentialStore::new(store.clone(), clock.clone()),
            locks: LockStore::new(store, clock.clone()),
            authenticator,
            clock,
            state: LockState::Unlocked,
            gate_passed: false,
            deferred: None,
            idle_lock_duration: Duration::minutes(DEFAULT_IDLE_LOCK_MINUTES),
        }
    }

    pub fn with_idle_lock_duration(mut self, duration: Duration) -> Self {
        self.idle_lock_duration = duration;
        self
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, LockState::Locked { .. })
    }

    pub fn gate_passed(&self) -> bool {
        self.gate_passed
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    pub fn unlock_deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            LockState::Locked { until } => Some(until),
            _ => None,
        }
    }

    /// Time left before the scheduled auto-unlock, zero if already due.
    pub fn time_until_unlock(&self) -> Option<StdDuration> {
        self.unlock_deadline()
            .map(|until| (until - self.clock.now()).to_std().unwrap_or(StdDuration::ZERO))
    }

    /// Mount-time check against the persisted lock record.
    ///
    /// An unexpired record puts the coordinator in `Locked`; an expired one is
    /// cleared and treated as no lock. If this coordinator was already locked
    /// and its deadline has passed, the auto-unlock path runs first.
    pub async fn check(&mut self) -> Result<LockState, SessionError> {
        if self.deadline_passed() {
            return self.unlock().await;
        }

        match self.locks.active()? {
            Some(until) => {
                if self.state != (LockState::Locked { until }) {
                    debug!(until = %until, "Lock record active");
                }
                self.state = LockState::Locked { until };
                self.deferred = None;
            }
            None => {
                if self.is_locked() {
                    self.state = LockState::Unlocked;
                }
            }
        }
        Ok(self.state)
    }

    /// Run the auto-unlock if the lock deadline has passed. Otherwise a no-op.
    pub async fn tick(&mut self) -> Result<LockState, SessionError> {
        if self.deadline_passed() {
            self.unlock().await
        } else {
            Ok(self.state)
        }
    }

    /// Sleep until the lock deadline, then attempt the auto-unlock once.
    pub async fn run_until_unlocked(&mut self) -> Result<LockState, SessionError> {
        if let Some(wait) = self.time_until_unlock() {
            tokio::time::sleep(wait).await;
        }
        self.tick().await
    }

    fn deadline_passed(&self) -> bool {
        matches!(self.state, LockState::Locked { until } if until <= self.clock.now())
    }

    /// Ask for gated content.
    pub fn request(&mut self, action: D) -> Access<D> {
        match self.state {
            LockState::Locked { until } => Access::Masked { until },
            LockState::Unlocked if self.gate_passed => Access::Granted(action),
            LockState::Unlocked | LockState::PendingEntry => {
                if self.deferred.replace(action).is_some() {
                    debug!("Replacing previously deferred action");
                }
                self.state = LockState::PendingEntry;
                Access::Challenge
            }
        }
    }

    /// Dismiss the password prompt without unlocking.
    pub fn cancel(&mut self) {
        if self.state == LockState::PendingEntry {
            self.state = LockState::Unlocked;
            self.deferred = None;
        }
    }

    /// Finish a successful password entry.
    ///
    /// Stores the new credentials, clears any lock record and returns the
    /// deferred action, which is never returned again.
    pub fn complete_entry(&mut self, grant: TokenGrant) -> Result<Option<D>, SessionError> {
        if self.state != LockState::PendingEntry {
            return Err(SessionError::NotPending);
        }

        self.credentials.write(&grant.into_envelope(self.clock.now())?)?;
        self.locks.clear()?;
        self.gate_passed = true;
        self.state = LockState::Unlocked;
        info!("Password gate passed");
        Ok(self.deferred.take())
    }

    /// Lock for `duration` from now. Any deferred action is dropped.
    ///
    /// The duration must be positive and land inside the calendar.
    pub fn lock(&mut self, duration: Duration) -> Result<LockState, SessionError> {
        let until = Some(duration)
            .filter(|d| *d > Duration::zero())
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .ok_or(SessionError::InvalidLockDuration(duration))?;
        self.locks.set(until)?;
        self.state = LockState::Locked { until };
        self.deferred = None;
        info!(until = %until, "Session locked");
        Ok(self.state)
    }

    /// Lock for the configured idle duration.
    pub fn lock_for_idle(&mut self) -> Result<LockState, SessionError> {
        self.lock(self.idle_lock_duration)
    }

    /// Lift the lock by re-acquiring a token.
    ///
    /// On failure the lock record and the `Locked` state stay in place; the
    /// next `tick`, `check` or manual call tries again.
    pub async fn unlock(&mut self) -> Result<LockState, SessionError> {
        if !self.is_locked() {
            return Ok(self.state);
        }

        let envelope = self
            .credentials
            .read()?
            .ok_or(SessionError::ExpiredCredential)?;

        let grant = match self.authenticator.reissue(&envelope.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Token re-acquisition failed, staying locked");
                return Err(e.into());
            }
        };

        self.credentials.write(&grant.into_envelope(self.clock.now())?)?;
        self.locks.clear()?;
        self.state = LockState::Unlocked;
        info!("Session unlocked");
        Ok(self.state)
    }

    /// Forget everything: credentials, lock record, gate and deferred action.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.credentials.clear()?;
        self.locks.clear()?;
        self.gate_passed = false;
        self.deferred = None;
        self.state = LockState::Unlocked;
        info!("Logged out");
        Ok(())
    }
}
