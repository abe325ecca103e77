//! Token lifecycle and login/logout initiation

use chrono::Utc;

use super::identity::{Account, Flow, IdentityClient, Navigation, TokenResponse};
use super::markers::{Markers, WidgetState};
use super::redirect::{RedirectState, ScheduledAction};
use super::tokens::{AuthSession, TokenRecord};
use super::AuthError;
use crate::browser::{AccountSummary, AuthView, LogoutEvent, Page, WidgetHooks};
use crate::config::Config;
use crate::storage::{self, BrowserStorage, ClearReport};

/// Current user as reported to page logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub name: Option<String>,
    pub account_id: String,
    pub tenant_id: String,
}

impl From<Account> for UserInfo {
    fn from(account: Account) -> Self {
        Self {
            username: account.username,
            name: account.name,
            account_id: account.home_account_id,
            tenant_id: account.tenant_id,
        }
    }
}

/// Authentication state of one page load and the collaborators it drives.
pub struct AuthManager<C> {
    pub(super) client: C,
    pub(super) config: Config,
    pub(super) session: AuthSession,
    pub(super) storage: BrowserStorage,
    pub(super) page: Box<dyn Page>,
    pub(super) view: Box<dyn AuthView>,
    pub(super) widget: Option<Box<dyn WidgetHooks>>,
    pub(super) state: RedirectState,
}

impl<C: IdentityClient> AuthManager<C> {
    pub fn new(
        client: C,
        config: Config,
        storage: BrowserStorage,
        page: Box<dyn Page>,
        view: Box<dyn AuthView>,
        widget: Option<Box<dyn WidgetHooks>>,
    ) -> Self {
        Self {
            client,
            config,
            session: AuthSession::new(),
            storage,
            page,
            view,
            widget,
            state: RedirectState::Idle,
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// True if no token expiry is recorded or it is inside the grace window.
    pub fn is_token_expired(&self) -> bool {
        self.session.is_expired(self.config.expiry_grace())
    }

    pub(super) fn first_account(&self) -> Option<Account> {
        self.client.accounts().into_iter().next()
    }

    pub(super) fn markers(&mut self) -> Markers<'_> {
        Markers::new(self.storage.local.as_mut())
    }

    /// Silent acquisition for the first account, falling back to an
    /// interactive redirect.
    async fn acquire(&mut self) -> Result<Flow<TokenResponse>, AuthError> {
        let account = self.first_account().ok_or(AuthError::NoAccount)?;
        let scopes = self.config.identity.scopes.clone();

        match self.client.acquire_token_silent(&scopes, &account).await {
            Ok(resp) => {
                self.session.store(TokenRecord::from(&resp));
                tracing::info!(
                    "Access token acquired ({} chars, expires {})",
                    resp.access_token.len(),
                    resp.expires_on
                );
                Ok(Flow::Continue(resp))
            }
            Err(e) => {
                tracing::warn!("{}; falling back to interactive redirect", e);
                let navigation = self.client.acquire_token_redirect(&scopes, &account).await?;
                Ok(Flow::NavigatedAway(navigation))
            }
        }
    }

    /// Reacquire the token silently. On failure the page is sent through an
    /// interactive redirect and no token is returned.
    pub async fn refresh_token(&mut self) -> Result<Flow<String>, AuthError> {
        tracing::info!("Refreshing access token...");
        Ok(self.acquire().await?.map(|resp| resp.access_token))
    }

    /// Like [`Self::refresh_token`], and also reflects the account in the UI
    /// and hands the token to an active widget.
    pub async fn get_token(&mut self) -> Result<Flow<String>, AuthError> {
        let resp = match self.acquire().await? {
            Flow::Continue(resp) => resp,
            Flow::NavigatedAway(navigation) => return Ok(Flow::NavigatedAway(navigation)),
        };

        self.reflect(Some(&resp.account));

        if self.widget_active() {
            tracing::debug!("Widget loaded, holding token for it");
            self.session.set_pending_widget_token(resp.access_token.clone());
            if self.widget_restored() {
                self.deliver_pending_token();
            } else {
                tracing::debug!("Waiting for chat to restore from cache...");
            }
        }

        Ok(Flow::Continue(resp.access_token))
    }

    /// Token for the widget: the cached one while valid, a refreshed one
    /// once it is inside the grace window, nothing when signed out.
    pub async fn request_token(&mut self) -> Result<Option<String>, AuthError> {
        let cached = match self.session.token() {
            Some(record) => record.access_token.clone(),
            None => {
                tracing::info!("No access token available");
                return Ok(None);
            }
        };

        if !self.is_token_expired() {
            tracing::debug!("Returning cached access token");
            return Ok(Some(cached));
        }

        tracing::info!("Token expired or expiring soon");
        Ok(self.refresh_token().await?.into_value())
    }

    /// Widget-facing entry point. `callback` runs exactly once, with the
    /// token or `None`.
    pub async fn get_authentication_token<F>(&mut self, callback: F)
    where
        F: FnOnce(Option<String>),
    {
        let token = match self.request_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("Token request failed: {}", e);
                None
            }
        };
        callback(token);
    }

    /// The widget has restored its chat; deliver a held token.
    pub fn on_chat_restored(&mut self) {
        self.session.mark_chat_restored();
        if self.session.has_pending_widget_token() {
            self.deliver_pending_token();
        } else {
            tracing::debug!("Chat restored, no token pending");
        }
    }

    fn widget_active(&self) -> bool {
        self.widget.as_ref().is_some_and(|w| w.is_active())
    }

    fn widget_restored(&self) -> bool {
        self.session.chat_restored() || self.widget.as_ref().is_some_and(|w| w.is_restored())
    }

    fn deliver_pending_token(&mut self) {
        let Some(widget) = self.widget.as_mut() else {
            return;
        };
        if let Some(token) = self.session.take_pending_widget_token() {
            tracing::info!("Delivering token to widget");
            widget.deliver_token(&token);
        }
    }

    /// Show `account`, or nothing.
    pub(super) fn reflect(&mut self, account: Option<&Account>) {
        let summary = account.map(AccountSummary::from);
        self.view.render(summary.as_ref());
    }

    /// Show the first known account, if any.
    pub(super) fn reflect_accounts(&mut self) {
        let account = self.first_account();
        self.reflect(account.as_ref());
    }

    /// Remember where to come back to, then start an interactive login.
    ///
    /// Failures are shown to the user; saved markers stay in place.
    pub async fn login(&mut self) -> Option<Navigation> {
        tracing::info!("Initiating login redirect...");

        let return_url = self.page.location().relative();
        let widget_was_loaded = self.widget_active();
        {
            let mut markers = self.markers();
            if let Err(e) = markers.save_return_url(&return_url) {
                tracing::warn!("Could not save return URL: {}", e);
            }
            if widget_was_loaded {
                let state = WidgetState {
                    widget_was_loaded: true,
                    timestamp: Utc::now().timestamp_millis(),
                };
                if let Err(e) = markers.save_widget_state(&state) {
                    tracing::warn!("Could not save widget state: {}", e);
                }
            }
        }

        let scopes = self.config.identity.scopes.clone();
        match self.client.login_redirect(&scopes).await {
            Ok(navigation) => Some(navigation),
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                self.page.alert(&format!("Login failed: {}", e));
                None
            }
        }
    }

    /// Drop all session state, remember this page, and sign out.
    ///
    /// Always leaves the page: through the provider's logout when an
    /// account is known, otherwise by clearing the local cache and
    /// reloading.
    pub async fn logout(&mut self) -> Navigation {
        tracing::info!("Initiating logout...");
        self.session.clear();

        let location = self.page.location();
        let href = location.href().to_string();
        let clear_chat = self.config.pages.is_authenticated_chat(location.path());
        {
            let mut markers = self.markers();
            if let Err(e) = markers.save_logout_return_url(&href) {
                tracing::warn!("Could not save logout return URL: {}", e);
            }
            if clear_chat {
                match markers.set_clear_chat_on_return() {
                    Ok(()) => tracing::info!("Chat marked for clearing after logout"),
                    Err(e) => tracing::warn!("Could not mark chat for clearing: {}", e),
                }
            }
        }

        self.page.dispatch_logout(&LogoutEvent {
            timestamp: Utc::now().timestamp_millis(),
        });
        self.reflect(None);

        // Let logout observers finish before the page goes away
        tokio::time::sleep(self.config.timing.logout_delay()).await;

        match self.first_account() {
            Some(account) => match self.client.logout_redirect(&account, &href).await {
                Ok(navigation) => return navigation,
                Err(e) => tracing::warn!("Logout redirect failed: {}", e),
            },
            None => tracing::info!("No account found, clearing cache"),
        }
        self.client.clear_cache();
        self.page.reload()
    }

    pub fn current_user(&self) -> Option<UserInfo> {
        self.first_account().map(UserInfo::from)
    }

    pub fn is_authenticated(&self) -> bool {
        self.first_account().is_some() && self.session.token().is_some() && !self.is_token_expired()
    }

    pub fn clear_chat_storage(&mut self) -> ClearReport {
        storage::clear_chat_storage(&mut self.storage, &self.config.chat_storage)
    }

    /// Run delayed actions scheduled by a page load, in delay order.
    pub async fn run_scheduled(&mut self, mut actions: Vec<ScheduledAction>) {
        actions.sort_by_key(ScheduledAction::delay);
        let start = tokio::time::Instant::now();

        for action in actions {
            tokio::time::sleep_until(start + action.delay()).await;
            match action {
                ScheduledAction::LoadWidget { .. } => {
                    if let Some(widget) = self.widget.as_mut() {
                        tracing::info!("Auto-loading widget");
                        widget.load();
                    }
                }
            }
        }
    }
}
