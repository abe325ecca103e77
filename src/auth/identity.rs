//! Identity client capability set
//!
//! The identity protocol itself is delegated; this module only names the
//! calls the token lifecycle makes and the records that come back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// An account known to the identity client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub home_account_id: String,
    pub tenant_id: String,
    pub username: String,
    pub name: Option<String>,
}

impl Account {
    /// Display name, falling back to the username.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}

/// Result of a successful token acquisition.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
    pub account: Account,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &format_args!("<{} chars>", self.access_token.len()))
            .field("expires_on", &self.expires_on)
            .field("account", &self.account.username)
            .finish()
    }
}

/// A full-page navigation. Once one is returned, the current page is gone
/// and nothing after it runs.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Navigate to the given URL.
    Redirect(String),
    /// Reload the current page in place.
    Reload,
}

/// Outcome of an operation that may leave the page.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    /// Control returned with a result.
    Continue(T),
    /// Control transferred away permanently.
    NavigatedAway(Navigation),
}

impl<T> Flow<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Flow<U> {
        match self {
            Flow::Continue(value) => Flow::Continue(f(value)),
            Flow::NavigatedAway(navigation) => Flow::NavigatedAway(navigation),
        }
    }

    /// The result, if control returned.
    pub fn into_value(self) -> Option<T> {
        match self {
            Flow::Continue(value) => Some(value),
            Flow::NavigatedAway(_) => None,
        }
    }
}

/// The calls made into the external identity client.
pub trait IdentityClient {
    /// Accounts currently signed in, most recent first.
    fn accounts(&self) -> Vec<Account>;

    /// Acquire a token without user interaction.
    async fn acquire_token_silent(
        &mut self,
        scopes: &[String],
        account: &Account,
    ) -> Result<TokenResponse, AuthError>;

    /// Start an interactive token acquisition. Leaves the page.
    async fn acquire_token_redirect(
        &mut self,
        scopes: &[String],
        account: &Account,
    ) -> Result<Navigation, AuthError>;

    /// Start an interactive login. Leaves the page.
    async fn login_redirect(&mut self, scopes: &[String]) -> Result<Navigation, AuthError>;

    /// Sign the account out at the provider, coming back to `post_logout_redirect_uri`.
    async fn logout_redirect(
        &mut self,
        account: &Account,
        post_logout_redirect_uri: &str,
    ) -> Result<Navigation, AuthError>;

    /// Resolve the result of the redirect that led to this page load, if any.
    async fn handle_redirect_response(&mut self) -> Result<Option<TokenResponse>, AuthError>;

    /// Forget every cached account and token.
    fn clear_cache(&mut self);
}
