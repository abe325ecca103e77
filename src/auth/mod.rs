//! Authentication module for the chat widget host page
//!
//! Keeps the access token the widget needs, refreshes it through the
//! identity client, and resumes login/logout flows across redirects.

mod error;
pub mod identity;
mod manager;
pub mod markers;
pub mod oauth;
mod redirect;
pub mod tokens;

#[cfg(test)]
mod testing;

use serde::{Deserialize, Serialize};

pub use error::AuthError;
pub use identity::Navigation;
pub use manager::AuthManager;
pub use oauth::OAuthIdentityClient;
pub use redirect::PageLoad;

const DEFAULT_CLIENT_ID: &str = "b0565fdb-6754-40e3-9446-72afdf056f0b";

/// Azure AD application registration used for the chat widget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// OAuth2 client ID (public client)
    pub client_id: String,
    /// Azure AD tenant
    pub tenant: String,
    /// Where the provider sends the browser back to
    pub redirect_uri: String,
    /// Scopes requested for the widget token
    pub scopes: Vec<String>,
}

impl IdentityConfig {
    pub fn authority(&self) -> String {
        format!("https://login.microsoftonline.com/{}", self.tenant)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            tenant: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
            redirect_uri: "http://localhost/index.html".to_string(),
            scopes: vec![
                format!("{}/.default", DEFAULT_CLIENT_ID),
                "offline_access".to_string(),
            ],
        }
    }
}
