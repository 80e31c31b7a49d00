//! Display preferences (theme, sidebar).
//!
//! Loaded once when the store is opened and written back only on `save`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{Result, SharedStore, StorageError};

/// Storage key holding the serialized preferences.
pub const PREFERENCES_KEY: &str = "cring.preferences";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Theme::System),
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub theme: Theme,
    pub sidebar_collapsed: bool,
}

pub struct PreferenceStore {
    store: SharedStore,
    current: Preferences,
}

impl PreferenceStore {
    /// Read saved preferences. Missing or unreadable entries give defaults.
    pub fn open(store: SharedStore) -> Result<Self> {
        let current = match store.get(PREFERENCES_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring unreadable preferences");
                Preferences::default()
            }),
            None => Preferences::default(),
        };
        Ok(Self { store, current })
    }

    pub fn get(&self) -> &Preferences {
        &self.current
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.current.theme = theme;
    }

    pub fn toggle_sidebar(&mut self) -> bool {
        self.current.sidebar_collapsed = !self.current.sidebar_collapsed;
        self.current.sidebar_collapsed
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string(&self.current).map_err(|e| StorageError::Corrupt {
            key: PREFERENCES_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(PREFERENCES_KEY, &contents)
    }
}
