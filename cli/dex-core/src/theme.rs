//! Persisted light/dark preference.

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage::KeyValueStore;

pub const THEME_KEY: &str = "dex-theme";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    #[display("light")]
    Light,
    #[display("dark")]
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown theme '{0}', expected 'light' or 'dark'")]
pub struct ParseThemeError(String);

impl FromStr for Theme {
    type Err = ParseThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(ParseThemeError(other.to_string())),
        }
    }
}

/// The active theme, written through to storage on every change.
///
/// Storage failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct ThemePreference {
    storage: Arc<dyn KeyValueStore>,
    current: Mutex<Theme>,
}

impl ThemePreference {
    /// Use the stored theme, or `system` (light if unknown) when nothing
    /// valid is stored. A fallback is persisted immediately.
    pub fn load(storage: Arc<dyn KeyValueStore>, system: Option<Theme>) -> Self {
        let stored = match storage.get(THEME_KEY) {
            Ok(value) => value.and_then(|value| {
                serde_json::from_str::<Theme>(&value)
                    .inspect_err(|err| debug!(%err, "ignoring stored theme"))
                    .ok()
            }),
            Err(err) => {
                warn!(%err, "couldn't read theme preference");
                None
            },
        };

        let preference = Self {
            storage,
            current: Mutex::new(stored.unwrap_or_else(|| system.unwrap_or_default())),
        };
        if stored.is_none() {
            preference.persist(preference.get());
        }
        preference
    }

    pub fn get(&self) -> Theme {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, theme: Theme) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = theme;
        self.persist(theme);
    }

    /// Returns the new theme.
    pub fn toggle(&self) -> Theme {
        let theme = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            *current = current.toggled();
            *current
        };
        self.persist(theme);
        theme
    }

    fn persist(&self, theme: Theme) {
        let result = serde_json::to_string(&theme)
            .map_err(StorageError::Serialize)
            .and_then(|value| self.storage.set(THEME_KEY, &value));
        if let Err(err) = result {
            warn!(%err, %theme, "couldn't persist theme preference");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn falls_back_to_system_preference_and_persists_it() {
        let storage = Arc::new(MemoryStore::new());
        let theme = ThemePreference::load(storage.clone(), Some(Theme::Dark));
        assert_eq!(theme.get(), Theme::Dark);
        assert_eq!(storage.get(THEME_KEY).unwrap().as_deref(), Some(r#""dark""#));

        let theme = ThemePreference::load(storage.clone(), Some(Theme::Light));
        assert_eq!(theme.get(), Theme::Dark);
    }

    #[test]
    fn defaults_to_light_and_ignores_garbage() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(THEME_KEY, "sepia").unwrap();
        let theme = ThemePreference::load(storage.clone(), None);
        assert_eq!(theme.get(), Theme::Light);
        assert_eq!(storage.get(THEME_KEY).unwrap().as_deref(), Some(r#""light""#));
    }

    #[test]
    fn toggle_persists() {
        let storage = Arc::new(MemoryStore::new());
        let theme = ThemePreference::load(storage.clone(), None);
        assert_eq!(theme.toggle(), Theme::Dark);
        assert_eq!(storage.get(THEME_KEY).unwrap().as_deref(), Some(r#""dark""#));
        theme.set(Theme::Light);
        assert_eq!(storage.get(THEME_KEY).unwrap().as_deref(), Some(r#""light""#));
    }

    #[test]
    fn storage_failures_do_not_affect_the_active_theme() {
        let storage = Arc::new(MemoryStore::new());
        storage.set_unavailable(true);
        let theme = ThemePreference::load(storage.clone(), Some(Theme::Dark));
        assert_eq!(theme.toggle(), Theme::Light);
        assert_eq!(theme.get(), Theme::Light);
    }
}
