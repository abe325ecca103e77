//! Configuration and credential storage

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::auth::identity::{Account, TokenResponse};
use crate::auth::IdentityConfig;

const DEFAULT_EXPIRY_GRACE_SECS: u64 = 300;

/// Application configuration (`config.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity provider registration
    pub identity: IdentityConfig,
    /// Page classification
    pub pages: PageConfig,
    /// Fixed delays used by the redirect flows
    pub timing: TimingConfig,
    /// What counts as chat-vendor state when clearing storage
    pub chat_storage: ChatStorageConfig,
    /// A token with less than this many seconds left is treated as expired
    pub expiry_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            pages: PageConfig::default(),
            timing: TimingConfig::default(),
            chat_storage: ChatStorageConfig::default(),
            expiry_grace_secs: DEFAULT_EXPIRY_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Path fragments that mark a page as hosting authenticated chat.
    pub authenticated_chat: Vec<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            authenticated_chat: vec!["support-auth.html".into(), "reconnect.html".into()],
        }
    }
}

impl PageConfig {
    pub fn is_authenticated_chat(&self, path: &str) -> bool {
        self.authenticated_chat
            .iter()
            .any(|page| path.contains(page.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before (re)loading the widget after a page load
    pub widget_load_delay_ms: u64,
    /// Delay between the logout event and the logout redirect
    pub logout_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            widget_load_delay_ms: 1000,
            logout_delay_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn widget_load_delay(&self) -> Duration {
        Duration::from_millis(self.widget_load_delay_ms)
    }

    pub fn logout_delay(&self) -> Duration {
        Duration::from_millis(self.logout_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatStorageConfig {
    /// Keys starting with this prefix belong to the chat widget
    pub key_prefix: String,
    /// Keys containing any of these belong to the chat widget
    pub key_fragments: Vec<String>,
    /// Values containing any of these are chat state
    pub value_fragments: Vec<String>,
    /// Structured databases dropped on clear
    pub databases: Vec<String>,
}

impl Default for ChatStorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "oc-lcw-".into(),
            key_fragments: vec![
                "Omnichannel".into(),
                "livechat".into(),
                "reconnectId".into(),
                "chatToken".into(),
            ],
            value_fragments: vec![
                "liveChatContext".into(),
                "domainStates".into(),
                "conversationId".into(),
                "chatId".into(),
            ],
            databases: vec![
                "msal.db".into(),
                "OmnichannelDB".into(),
                "LiveChatWidgetDB".into(),
            ],
        }
    }
}

impl ChatStorageConfig {
    pub fn key_matches(&self, key: &str) -> bool {
        (!self.key_prefix.is_empty() && key.starts_with(self.key_prefix.as_str()))
            || self
                .key_fragments
                .iter()
                .any(|fragment| key.contains(fragment.as_str()))
    }

    pub fn value_matches(&self, value: &str) -> bool {
        self.value_fragments
            .iter()
            .any(|fragment| value.contains(fragment.as_str()))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "chat-auth", "chat-auth")
        .context("Could not determine config directory")
}

/// Get config directory path
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Get data directory path (storage tiers and databases live here)
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

impl Config {
    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Grace window as a duration. Out-of-range values fall back to the default.
    pub fn expiry_grace(&self) -> chrono::Duration {
        let grace = i64::try_from(self.expiry_grace_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds);
        match grace {
            Some(grace) => grace,
            None => {
                tracing::warn!(
                    "expiry_grace_secs = {} is out of range, using {}",
                    self.expiry_grace_secs,
                    DEFAULT_EXPIRY_GRACE_SECS
                );
                chrono::Duration::seconds(DEFAULT_EXPIRY_GRACE_SECS as i64)
            }
        }
    }
}

/// Credential cache of the terminal identity client (`identity.toml`)
#[derive(Default, Serialize, Deserialize)]
pub struct IdentityCache {
    /// Refresh token used for silent acquisition
    pub refresh_token: Option<String>,
    /// Signed-in accounts, most recent first
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Interactive flow result waiting for the next page load
    pub pending_response: Option<TokenResponse>,
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field(
                "refresh_token",
                &self
                    .refresh_token
                    .as_ref()
                    .map(|t| format!("<{} chars>", t.len())),
            )
            .field("accounts", &self.accounts)
            .field("pending_response", &self.pending_response)
            .finish()
    }
}

impl IdentityCache {
    fn cache_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("identity.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::cache_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read identity cache")?;
        toml::from_str(&content).context("Failed to parse identity cache")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::cache_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize identity cache")?;
        fs::write(path, content).context("Failed to write identity cache")?;

        // Set restrictive permissions (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set identity cache permissions")?;
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.accounts.clear();
        self.refresh_token = None;
        self.pending_response = None;
    }
}
