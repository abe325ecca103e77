//! Redirect intent markers
//!
//! Small records written to the long-lived store right before a redirect
//! and consumed by the page load that follows it. Every `take_*` reads and
//! deletes in one step, so a marker drives its action at most once.

use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::storage::KeyValueStore;

pub const RETURN_URL: &str = "auth-return-url";
pub const WIDGET_STATE: &str = "widget-state-before-login";
pub const LOGOUT_RETURN_URL: &str = "auth-logout-return-url";
pub const CLEAR_CHAT_ON_RETURN: &str = "auth-clear-chat-on-return";
pub const WIDGET_CONFIG: &str = "widget-config-current";

const TRUE_FLAG: &str = "true";

/// Widget state saved before a login redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetState {
    pub widget_was_loaded: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Marker access over the long-lived store.
pub struct Markers<'a> {
    store: &'a mut dyn KeyValueStore,
}

impl<'a> Markers<'a> {
    pub fn new(store: &'a mut dyn KeyValueStore) -> Self {
        Self { store }
    }

    fn take(&mut self, key: &str) -> Result<Option<String>, AuthError> {
        let value = self.store.get(key)?;
        if value.is_some() {
            self.store.remove(key)?;
        }
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), AuthError> {
        self.store.set(key, value)?;
        tracing::debug!("Saved marker {}", key);
        Ok(())
    }

    pub fn save_return_url(&mut self, url: &str) -> Result<(), AuthError> {
        self.put(RETURN_URL, url)
    }

    pub fn take_return_url(&mut self) -> Result<Option<String>, AuthError> {
        self.take(RETURN_URL)
    }

    pub fn save_widget_state(&mut self, state: &WidgetState) -> Result<(), AuthError> {
        let json = serde_json::to_string(state).map_err(|e| AuthError::MarkerParse {
            key: WIDGET_STATE,
            reason: e.to_string(),
        })?;
        self.put(WIDGET_STATE, &json)
    }

    /// Take the widget state. A malformed value is still deleted and
    /// reported as [`AuthError::MarkerParse`].
    pub fn take_widget_state(&mut self) -> Result<Option<WidgetState>, AuthError> {
        match self.take(WIDGET_STATE)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AuthError::MarkerParse {
                    key: WIDGET_STATE,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn save_logout_return_url(&mut self, url: &str) -> Result<(), AuthError> {
        self.put(LOGOUT_RETURN_URL, url)
    }

    pub fn take_logout_return_url(&mut self) -> Result<Option<String>, AuthError> {
        self.take(LOGOUT_RETURN_URL)
    }

    pub fn set_clear_chat_on_return(&mut self) -> Result<(), AuthError> {
        self.put(CLEAR_CHAT_ON_RETURN, TRUE_FLAG)
    }

    /// Take the clear-chat flag; only the literal `"true"` counts.
    pub fn take_clear_chat_on_return(&mut self) -> Result<bool, AuthError> {
        Ok(self.take(CLEAR_CHAT_ON_RETURN)?.as_deref() == Some(TRUE_FLAG))
    }

    /// Whether a saved widget configuration exists. Never consumed here.
    pub fn has_widget_config(&self) -> Result<bool, AuthError> {
        Ok(self.store.get(WIDGET_CONFIG)?.is_some())
    }
}
