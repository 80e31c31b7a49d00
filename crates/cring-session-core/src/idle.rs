//! Idle detection.
//!
//! `IdleDetector::spawn` starts a countdown task. Every qualifying activity
//! event recorded through the returned `IdleHandle` restarts the countdown
//! (debounce, not throttle). When the countdown runs out the callback fires
//! once; the next qualifying event opens a new idle period.
//!
//! Dropping the handle stops the task, so the callback never runs after the
//! owner has gone away. A suspended process gets no catch-up call.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Default idle threshold (5 minutes)
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(300);

/// User activity that can keep a session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEvent {
    PointerMove,
    Click,
    Scroll,
    KeyPress,
}

impl ActivityEvent {
    pub const ALL: [ActivityEvent; 4] = [
        ActivityEvent::PointerMove,
        ActivityEvent::Click,
        ActivityEvent::Scroll,
        ActivityEvent::KeyPress,
    ];

    /// Map a DOM event name onto the activity it represents.
    pub fn from_dom_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mousemove" | "pointermove" | "touchmove" => Some(ActivityEvent::PointerMove),
            "click" | "mousedown" | "touchstart" => Some(ActivityEvent::Click),
            "scroll" | "wheel" => Some(ActivityEvent::Scroll),
            "keydown" | "keypress" | "keyup" => Some(ActivityEvent::KeyPress),
            _ => None,
        }
    }

    pub fn dom_name(&self) -> &'static str {
        match self {
            ActivityEvent::PointerMove => "mousemove",
            ActivityEvent::Click => "click",
            ActivityEvent::Scroll => "scroll",
            ActivityEvent::KeyPress => "keydown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdleConfig {
    pub threshold: Duration,
    pub events: Vec<ActivityEvent>,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_IDLE_THRESHOLD,
            events: ActivityEvent::ALL.to_vec(),
        }
    }
}

impl IdleConfig {
    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn events(mut self, events: impl IntoIterator<Item = ActivityEvent>) -> Self {
        self.events = events.into_iter().collect();
        self
    }
}

pub struct IdleDetector;

impl IdleDetector {
    /// Start watching. Must be called from within a tokio runtime.
    pub fn spawn<F>(config: IdleConfig, mut on_idle: F) -> IdleHandle
    where
        F: FnMut() + Send + 'static,
    {
        let (activity, mut rx) = mpsc::unbounded_channel::<()>();
        let threshold = config.threshold;

        let task = tokio::spawn(async move {
            loop {
                let countdown = time::sleep(threshold);
                tokio::pin!(countdown);

                let went_idle = loop {
                    tokio::select! {
                        biased;
                        msg = rx.recv() => match msg {
                            // sleep() clamps deadlines past the clock's range
                            Some(()) => countdown.set(time::sleep(threshold)),
                            None => break false,
                        },
                        _ = &mut countdown => break true,
                    }
                };
                if !went_idle {
                    return;
                }

                debug!(threshold_secs = threshold.as_secs_f64(), "Idle threshold reached");
                on_idle();

                // Stay quiet until the user comes back
                if rx.recv().await.is_none() {
                    return;
                }
            }
        });

        IdleHandle {
            activity,
            task,
            events: config.events.into_iter().collect(),
        }
    }
}

/// Live registration of an idle detector. Dropping it tears the detector down.
pub struct IdleHandle {
    activity: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
    events: HashSet<ActivityEvent>,
}

impl IdleHandle {
    /// Report user activity. Returns `false` if the event is not one this
    /// detector listens for, or the detector has stopped.
    pub fn record(&self, event: ActivityEvent) -> bool {
        if !self.events.contains(&event) {
            return false;
        }
        self.activity.send(()).is_ok()
    }

    pub fn listens_to(&self, event: ActivityEvent) -> bool {
        self.events.contains(&event)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(self) {}
}

impl Drop for IdleHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Idle detector stopped");
    }
}
