//! Page-side collaborators
//!
//! The token lifecycle never touches a DOM directly. It talks to the page
//! through [`Page`], reflects state through [`AuthView`] and drives the
//! embedded chat widget through [`WidgetHooks`].

pub mod terminal;

use anyhow::{Context, Result};
use url::Url;

use crate::auth::identity::{Account, Navigation};

/// Where the page currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    url: Url,
}

impl PageLocation {
    pub fn parse(href: &str) -> Result<Self> {
        let url = Url::parse(href).with_context(|| format!("Invalid page URL: {}", href))?;
        Ok(Self { url })
    }

    /// Full URL.
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Path plus query and fragment, as used for return URLs.
    pub fn relative(&self) -> String {
        let mut out = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = self.url.fragment() {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

/// Payload of the logout notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// The hosting page.
pub trait Page {
    fn location(&self) -> PageLocation;
    /// Navigate to `target` (absolute or page-relative).
    fn navigate(&mut self, target: &str) -> Navigation;
    fn reload(&mut self) -> Navigation;
    /// Show a user-visible alert.
    fn alert(&mut self, message: &str);
    /// Notify other page logic that the user is logging out.
    fn dispatch_logout(&mut self, event: &LogoutEvent);
}

/// What the login/logout affordance shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub display_name: String,
    pub username: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            display_name: account.display_name().to_string(),
            username: account.username.clone(),
        }
    }
}

/// Consumer of authentication state for presentation.
pub trait AuthView {
    /// `Some` when signed in, `None` when signed out.
    fn render(&mut self, account: Option<&AccountSummary>);
}

/// Hooks into the embedded chat widget.
pub trait WidgetHooks {
    /// The widget is currently loaded.
    fn is_active(&self) -> bool;
    /// (Re)load the widget.
    fn load(&mut self);
    /// Hand the widget a bearer token.
    fn deliver_token(&mut self, token: &str);
    /// The widget has restored its chat from cache.
    fn is_restored(&self) -> bool;
}
