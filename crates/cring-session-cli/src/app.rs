//! Application state for the cring-session command line.
//!
//! `App` owns the configuration, the storage backend, the lock coordinator
//! and the password prompt, and maps each subcommand onto them.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cring_session_core::config::{field_cipher_from, SECRET_ENV};
use cring_session_core::{
    Access, ActivityEvent, ApiClient, Config, FieldCipher, IdleDetector, LockState,
    PreferenceStore, ReauthPrompt, SessionError, SessionLock, SharedClock, SharedStore,
    Submission, SystemClock, Theme,
};

/// Characters of a token shown before masking
const TOKEN_VISIBLE_CHARS: usize = 6;

/// Something the user asked for that sits behind the password gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    ShowSession,
}

/// One line typed into `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchInput<'a> {
    Quit,
    Status,
    Unlock,
    Activity(ActivityEvent),
    Blank,
    Unknown(&'a str),
}

impl<'a> WatchInput<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "quit" | "exit" => WatchInput::Quit,
            "status" => WatchInput::Status,
            "unlock" => WatchInput::Unlock,
            "" => WatchInput::Blank,
            other => ActivityEvent::from_dom_name(other)
                .map(WatchInput::Activity)
                .unwrap_or(WatchInput::Unknown(other)),
        }
    }
}

pub struct App {
    config: Config,
    store: SharedStore,
    clock: SharedClock,
    cipher: FieldCipher,
    lock: SessionLock<ApiClient, GatedAction>,
    prompt: ReauthPrompt,
}

impl App {
    /// Build the app from `config` and the `CRING_FIELD_SECRET` environment
    /// variable. A missing secret stops start-up before any command runs.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_secret(config, std::env::var(SECRET_ENV).ok())
    }

    fn with_secret(config: Config, secret: Option<String>) -> Result<Self> {
        let cipher = field_cipher_from(secret).map_err(SessionError::from)?;
        let lock_duration = config.lock_duration().map_err(SessionError::from)?;
        let store = config.open_store()?;
        let clock: SharedClock = Arc::new(SystemClock);
        let api = ApiClient::new(config.api_base_url.clone()).context("Failed to build HTTP client")?;
        debug!(base_url = %api.base_url(), "API client configured");

        let lock = SessionLock::new(store.clone(), api, clock.clone())
            .with_idle_lock_duration(lock_duration);
        let prompt = ReauthPrompt::new(config.locale);

        Ok(Self {
            config,
            store,
            clock,
            cipher,
            lock,
            prompt,
        })
    }

    /// Check the persisted lock before anything else runs.
    pub async fn mount(&mut self) -> Result<LockState> {
        let state = self
            .lock
            .check()
            .await
            .context("Failed to check session lock")?;
        debug!(?state, "Mounted");
        Ok(state)
    }

    pub fn print_status(&self) -> Result<()> {
        let now = self.clock.now();
        match self.lock.credentials().read()? {
            Some(envelope) => println!(
                "Session: signed in, token {} (expires in {} min{})",
                mask_token(&envelope.access_token),
                envelope.minutes_until_expiry(now),
                if envelope.needs_refresh(now) { ", refresh due" } else { "" }
            ),
            None => println!("Session: not signed in"),
        }
        println!("Lock:    {}", describe_state(self.lock.state(), now));
        println!("Storage: {:?}", self.config.storage);
        Ok(())
    }

    /// Pass the password gate. Prompts until the password is accepted or an
    /// empty line is entered.
    pub async fn login(&mut self, user: Option<String>) -> Result<()> {
        let user_id = match user.or_else(|| self.config.user_id.clone()) {
            Some(user_id) => user_id,
            None => prompt_line("User id: ")?,
        };
        if user_id.is_empty() {
            bail!("User id required");
        }

        match self.lock.request(GatedAction::ShowSession) {
            Access::Granted(action) => return self.run(action),
            Access::Masked { until } => {
                bail!("Session is locked until {}", format_local(until))
            }
            Access::Challenge => {}
        }

        self.prompt.open();
        loop {
            let password = rpassword::prompt_password("Password: ")?;
            if password.is_empty() {
                self.prompt.close();
                self.lock.cancel();
                println!("Cancelled");
                return Ok(());
            }
            self.prompt.set_password(&password);

            match self.prompt.submit(&mut self.lock, &self.cipher, &user_id).await? {
                Submission::Unlocked(deferred) => {
                    info!("Login successful");
                    self.remember_user(&user_id);
                    if let Some(action) = deferred {
                        self.run(action)?;
                    }
                    return Ok(());
                }
                Submission::Rejected { lock_until } => {
                    self.print_prompt_error();
                    if let Some(until) = lock_until {
                        println!("Account locked by server until {}", format_local(until));
                    }
                }
                Submission::Incomplete | Submission::Unreachable => self.print_prompt_error(),
            }
        }
    }

    pub fn lock(&mut self, minutes: Option<i64>) -> Result<()> {
        let duration = match minutes {
            Some(minutes) => chrono::Duration::try_minutes(minutes)
                .with_context(|| format!("{} minutes is out of range", minutes))?,
            None => self.config.lock_duration()?,
        };
        if duration <= chrono::Duration::zero() {
            bail!("Lock duration must be positive");
        }
        let state = self.lock.lock(duration)?;
        println!("{}", describe_state(state, self.clock.now()));
        Ok(())
    }

    pub async fn unlock(&mut self) -> Result<()> {
        if !self.lock.is_locked() {
            println!("Not locked");
            return Ok(());
        }
        match self.lock.unlock().await {
            Ok(state) => {
                println!("{}", describe_state(state, self.clock.now()));
                Ok(())
            }
            Err(SessionError::ExpiredCredential) => {
                bail!("Session expired while locked; run `cring-session login`")
            }
            Err(e) => Err(e).context("Unlock failed, session stays locked"),
        }
    }

    pub fn logout(&mut self) -> Result<()> {
        self.lock.logout()?;
        println!("Logged out");
        Ok(())
    }

    pub fn prefs(&mut self, theme: Option<&str>, toggle_sidebar: bool) -> Result<()> {
        let mut prefs = PreferenceStore::open(self.store.clone())?;
        let mut changed = false;

        if let Some(theme) = theme {
            let theme = Theme::parse(theme)
                .with_context(|| format!("Unknown theme '{}' (system, light, dark)", theme))?;
            prefs.set_theme(theme);
            changed = true;
        }
        if toggle_sidebar {
            prefs.toggle_sidebar();
            changed = true;
        }
        if changed {
            prefs.save()?;
        }

        let current = prefs.get();
        println!("Theme:   {:?}", current.theme);
        println!(
            "Sidebar: {}",
            if current.sidebar_collapsed { "collapsed" } else { "expanded" }
        );
        Ok(())
    }

    /// Interactive loop: each stdin line is an activity event name, or one of
    /// `status`, `unlock`, `quit`. Anything else is reported and does not
    /// count as activity.
    pub async fn watch(&mut self) -> Result<()> {
        let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
        let idle = IdleDetector::spawn(self.config.idle_config(), move || {
            let _ = idle_tx.send(());
        });
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!(
            "Watching for activity (idle after {}s). Type event names, `status`, `unlock` or `quit`.",
            self.config.idle_timeout_secs
        );

        // Deadline whose auto-unlock already failed; not retried on its own
        let mut failed_deadline: Option<DateTime<Utc>> = None;

        loop {
            let wait = match self.lock.unlock_deadline() {
                Some(deadline) if Some(deadline) == failed_deadline => None,
                Some(_) => self.lock.time_until_unlock(),
                None => None,
            };

            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match WatchInput::parse(&line) {
                        WatchInput::Quit => break,
                        WatchInput::Status => self.print_status()?,
                        WatchInput::Unlock => {
                            if let Err(e) = self.unlock().await {
                                println!("{:#}", e);
                            }
                        }
                        WatchInput::Activity(event) => {
                            if !idle.record(event) {
                                debug!(event = event.dom_name(), "Activity ignored");
                            }
                        }
                        WatchInput::Unknown(other) => {
                            debug!(input = other, "Not an activity event");
                            println!("Unknown input '{}': not an activity event", other);
                        }
                        WatchInput::Blank => {}
                    }
                }
                Some(()) = idle_rx.recv() => {
                    if !self.lock.is_locked() {
                        let state = self.lock.lock_for_idle()?;
                        println!("Idle: {}", describe_state(state, self.clock.now()));
                    }
                }
                _ = sleep_for(wait) => {
                    let deadline = self.lock.unlock_deadline();
                    match self.lock.tick().await {
                        Ok(state) => println!("{}", describe_state(state, self.clock.now())),
                        Err(e) => {
                            warn!(error = %e, "Automatic unlock failed");
                            println!("Automatic unlock failed: {}. Type `unlock` to retry.", e);
                            failed_deadline = deadline;
                        }
                    }
                }
            }
        }

        idle.shutdown();
        Ok(())
    }

    fn run(&self, action: GatedAction) -> Result<()> {
        match action {
            GatedAction::ShowSession => self.print_status(),
        }
    }

    fn remember_user(&mut self, user_id: &str) {
        if self.config.user_id.as_deref() == Some(user_id) {
            return;
        }
        self.config.user_id = Some(user_id.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    fn print_prompt_error(&self) {
        if let Some(message) = self.prompt.error() {
            println!("{}", message);
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn describe_state(state: LockState, now: DateTime<Utc>) -> String {
    match state {
        LockState::Unlocked => "unlocked".to_string(),
        LockState::PendingEntry => "waiting for password".to_string(),
        LockState::Locked { until } => format!(
            "locked until {} ({}s left)",
            format_local(until),
            (until - now).num_seconds().max(0)
        ),
    }
}

/// Show the first few characters of a token and mask the rest
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(TOKEN_VISIBLE_CHARS).collect();
    if visible.len() == token.len() {
        "*".repeat(token.chars().count())
    } else {
        format!("{}…", visible)
    }
}
