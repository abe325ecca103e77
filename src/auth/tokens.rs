//! Token storage and management

use chrono::{DateTime, Duration, Utc};

use super::identity::TokenResponse;

/// The current access token and when it expires.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(access_token: String, expires_on: DateTime<Utc>) -> Self {
        Self {
            access_token,
            expires_on,
        }
    }

    /// Whether less than `grace` remains before expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires_on - now < grace
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &format_args!("<{} chars>", self.access_token.len()))
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl From<&TokenResponse> for TokenRecord {
    fn from(resp: &TokenResponse) -> Self {
        Self::new(resp.access_token.clone(), resp.expires_on)
    }
}

/// In-memory authentication state of one page.
#[derive(Debug, Default)]
pub struct AuthSession {
    token: Option<TokenRecord>,
    /// Token waiting for the widget to report a restored chat.
    pending_widget_token: Option<String>,
    /// The widget has reported its chat restored from cache.
    chat_restored: bool,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<&TokenRecord> {
        self.token.as_ref()
    }

    /// Replace the token record in one step.
    pub fn store(&mut self, record: TokenRecord) {
        self.token = Some(record);
    }

    /// True when no expiry is recorded or less than `grace` remains at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match &self.token {
            Some(record) => record.is_expired_at(now, grace),
            None => true,
        }
    }

    pub fn is_expired(&self, grace: Duration) -> bool {
        self.is_expired_at(Utc::now(), grace)
    }

    pub fn set_pending_widget_token(&mut self, token: String) {
        self.pending_widget_token = Some(token);
    }

    /// Take the pending widget token. Returns it at most once.
    pub fn take_pending_widget_token(&mut self) -> Option<String> {
        self.pending_widget_token.take()
    }

    pub fn has_pending_widget_token(&self) -> bool {
        self.pending_widget_token.is_some()
    }

    pub fn mark_chat_restored(&mut self) {
        self.chat_restored = true;
    }

    pub fn chat_restored(&self) -> bool {
        self.chat_restored
    }

    /// Drop the token, any pending delivery and the restored flag.
    pub fn clear(&mut self) {
        self.token = None;
        self.pending_widget_token = None;
        self.chat_restored = false;
    }
}
