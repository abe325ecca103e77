//! Redirect recovery on page load
//!
//! Runs once per page load and decides what the previous navigation was:
//! a completed login, a return from logout, or neither.
//!
//! ```text
//! Idle -> AwaitingRedirectResult -+-> LoginCompleted   (response from the identity client)
//!                                 +-> LogoutReturned   (logout return marker present)
//!                                 +-> NoRedirect       (otherwise)
//! ```

use std::time::Duration;

use super::identity::{Flow, IdentityClient, Navigation, TokenResponse};
use super::manager::AuthManager;
use super::tokens::TokenRecord;

/// Where the page-load state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectState {
    Idle,
    AwaitingRedirectResult,
    LoginCompleted,
    LogoutReturned,
    NoRedirect,
}

/// Work a page load asks the host to run later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledAction {
    /// (Re)load the chat widget.
    LoadWidget { delay: Duration },
}

impl ScheduledAction {
    pub fn delay(&self) -> Duration {
        match self {
            ScheduledAction::LoadWidget { delay } => *delay,
        }
    }
}

/// How a page load ended.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLoad {
    /// The page stays; run `scheduled` next.
    Settled {
        state: RedirectState,
        scheduled: Vec<ScheduledAction>,
    },
    /// The page is being left; nothing else runs.
    NavigatedAway {
        state: RedirectState,
        navigation: Navigation,
    },
}

impl PageLoad {
    pub fn state(&self) -> RedirectState {
        match self {
            PageLoad::Settled { state, .. } | PageLoad::NavigatedAway { state, .. } => *state,
        }
    }

    fn settled(state: RedirectState) -> Self {
        PageLoad::Settled {
            state,
            scheduled: Vec::new(),
        }
    }
}

impl<C: IdentityClient> AuthManager<C> {
    fn enter(&mut self, state: RedirectState) {
        tracing::debug!("Redirect recovery: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Resolve the outcome of the previous redirect.
    ///
    /// Never fails: redirect resolution errors are logged and treated as
    /// if no redirect happened. Only the first call per page load does
    /// anything.
    pub async fn handle_redirect(&mut self) -> PageLoad {
        if self.state != RedirectState::Idle {
            tracing::warn!("Redirect recovery already ran for this page load");
            return PageLoad::settled(self.state);
        }

        self.enter(RedirectState::AwaitingRedirectResult);
        let response = match self.client.handle_redirect_response().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error handling redirect: {}", e);
                None
            }
        };

        if let Some(response) = response {
            return self.complete_login(response);
        }
        if let Some(outcome) = self.resume_logout() {
            return outcome;
        }
        self.resume_session().await
    }

    fn complete_login(&mut self, response: TokenResponse) -> PageLoad {
        let state = RedirectState::LoginCompleted;
        self.enter(state);
        tracing::info!(
            "Login successful via redirect (token expires {})",
            response.expires_on
        );

        self.session.store(TokenRecord::from(&response));
        self.session.set_pending_widget_token(response.access_token.clone());
        self.reflect(Some(&response.account));

        let mut scheduled = Vec::new();
        let widget_state = self.markers().take_widget_state();
        match widget_state {
            Ok(Some(widget_state)) if widget_state.widget_was_loaded => {
                if self.widget.is_some() {
                    tracing::info!("Widget was loaded before login, will reload it");
                    scheduled.push(ScheduledAction::LoadWidget {
                        delay: self.config.timing.widget_load_delay(),
                    });
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Discarding widget state: {}", e),
        }

        let return_url = self.markers().take_return_url().unwrap_or_else(|e| {
            tracing::warn!("Could not read return URL: {}", e);
            None
        });
        if let Some(url) = return_url {
            if url != self.page.location().path() {
                tracing::info!("Redirecting to return URL {}", url);
                let navigation = self.page.navigate(&url);
                return PageLoad::NavigatedAway { state, navigation };
            }
        }

        PageLoad::Settled { state, scheduled }
    }

    /// Finish a logout that came back from the provider.
    fn resume_logout(&mut self) -> Option<PageLoad> {
        let logout_return = self.markers().take_logout_return_url().unwrap_or_else(|e| {
            tracing::warn!("Could not read logout return URL: {}", e);
            None
        });
        let return_url = logout_return?;

        let state = RedirectState::LogoutReturned;
        self.enter(state);
        tracing::info!("Returned from logout redirect to {}", return_url);

        let clear_chat = self.markers().take_clear_chat_on_return().unwrap_or_else(|e| {
            tracing::warn!("Could not read clear-chat flag: {}", e);
            false
        });
        if clear_chat {
            let report = self.clear_chat_storage();
            tracing::info!("Chat storage cleared after logout ({} items)", report.total());
        } else {
            tracing::debug!("Chat clearing not requested");
        }

        self.reflect_accounts();
        Some(PageLoad::settled(state))
    }

    /// Ordinary page load: pick up an existing session, if any.
    async fn resume_session(&mut self) -> PageLoad {
        let state = RedirectState::NoRedirect;
        self.enter(state);

        if self.first_account().is_none() {
            tracing::info!("No user logged in");
            self.reflect_accounts();
            return PageLoad::settled(state);
        }

        tracing::info!("User already logged in");
        match self.get_token().await {
            Ok(Flow::Continue(_)) => {}
            Ok(Flow::NavigatedAway(navigation)) => {
                return PageLoad::NavigatedAway { state, navigation }
            }
            Err(e) => {
                tracing::error!("Could not acquire token: {}", e);
                self.reflect_accounts();
                return PageLoad::settled(state);
            }
        }

        let has_widget_config = self.markers().has_widget_config().unwrap_or_else(|e| {
            tracing::warn!("Could not read widget config: {}", e);
            false
        });
        let widget_idle = self.widget.as_ref().is_some_and(|w| !w.is_active());

        let mut scheduled = Vec::new();
        if has_widget_config && widget_idle {
            tracing::info!("Widget config found, will auto-load widget");
            scheduled.push(ScheduledAction::LoadWidget {
                delay: self.config.timing.widget_load_delay(),
            });
        }
        PageLoad::Settled { state, scheduled }
    }
}
