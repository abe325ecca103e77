//! Fakes for driving the token lifecycle in tests

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{Duration, Utc};

use super::identity::{Account, IdentityClient, Navigation, TokenResponse};
use super::{AuthError, AuthManager};
use crate::browser::{AccountSummary, AuthView, LogoutEvent, Page, PageLocation, WidgetHooks};
use crate::config::Config;
use crate::storage::{
    BrowserStorage, DatabaseStore, KeyValueStore, MemoryDatabases, MemoryStore, StorageError,
};

pub fn account() -> Account {
    Account {
        home_account_id: "oid-1.tenant-1".into(),
        tenant_id: "tenant-1".into(),
        username: "ada@example.com".into(),
        name: Some("Ada".into()),
    }
}

pub fn token_response(token: &str, expires_in: Duration) -> TokenResponse {
    TokenResponse {
        access_token: token.to_string(),
        expires_on: Utc::now() + expires_in,
        account: account(),
    }
}

#[derive(Default)]
pub struct FakeIdentityState {
    pub accounts: Vec<Account>,
    /// Result of silent acquisition; `None` fails.
    pub silent: Option<TokenResponse>,
    /// Handed out once by `handle_redirect_response`.
    pub redirect_response: Option<Result<TokenResponse, String>>,
    pub login_fails: bool,
    /// `acquire_token_redirect` fails.
    pub redirect_fails: bool,
    pub logout_fails: bool,
    pub calls: Vec<&'static str>,
}

pub struct FakeIdentity(Rc<RefCell<FakeIdentityState>>);

impl IdentityClient for FakeIdentity {
    fn accounts(&self) -> Vec<Account> {
        self.0.borrow().accounts.clone()
    }

    async fn acquire_token_silent(
        &mut self,
        _scopes: &[String],
        _account: &Account,
    ) -> Result<TokenResponse, AuthError> {
        let mut state = self.0.borrow_mut();
        state.calls.push("acquire_token_silent");
        state
            .silent
            .clone()
            .ok_or_else(|| AuthError::SilentAcquire("interaction required".into()))
    }

    async fn acquire_token_redirect(
        &mut self,
        _scopes: &[String],
        _account: &Account,
    ) -> Result<Navigation, AuthError> {
        let mut state = self.0.borrow_mut();
        state.calls.push("acquire_token_redirect");
        if state.redirect_fails {
            return Err(AuthError::Identity("interaction_in_progress".into()));
        }
        Ok(Navigation::Redirect("https://login.example/authorize".into()))
    }

    async fn login_redirect(&mut self, _scopes: &[String]) -> Result<Navigation, AuthError> {
        let mut state = self.0.borrow_mut();
        state.calls.push("login_redirect");
        if state.login_fails {
            return Err(AuthError::Identity("popup window error".into()));
        }
        Ok(Navigation::Redirect("https://login.example/authorize".into()))
    }

    async fn logout_redirect(
        &mut self,
        _account: &Account,
        post_logout_redirect_uri: &str,
    ) -> Result<Navigation, AuthError> {
        let mut state = self.0.borrow_mut();
        state.calls.push("logout_redirect");
        if state.logout_fails {
            return Err(AuthError::Identity("logout endpoint unreachable".into()));
        }
        state.accounts.clear();
        Ok(Navigation::Redirect(format!(
            "https://login.example/logout?post={}",
            post_logout_redirect_uri
        )))
    }

    async fn handle_redirect_response(&mut self) -> Result<Option<TokenResponse>, AuthError> {
        let mut state = self.0.borrow_mut();
        state.calls.push("handle_redirect_response");
        match state.redirect_response.take() {
            Some(Ok(resp)) => Ok(Some(resp)),
            Some(Err(reason)) => Err(AuthError::RedirectResolution(reason)),
            None => Ok(None),
        }
    }

    fn clear_cache(&mut self) {
        let mut state = self.0.borrow_mut();
        state.calls.push("clear_cache");
        state.accounts.clear();
    }
}

pub struct FakePageState {
    pub location: PageLocation,
    pub navigations: Vec<Navigation>,
    pub alerts: Vec<String>,
    pub logout_events: usize,
}

struct FakePage(Rc<RefCell<FakePageState>>);

impl Page for FakePage {
    fn location(&self) -> PageLocation {
        self.0.borrow().location.clone()
    }

    fn navigate(&mut self, target: &str) -> Navigation {
        let navigation = Navigation::Redirect(target.to_string());
        self.0.borrow_mut().navigations.push(navigation.clone());
        navigation
    }

    fn reload(&mut self) -> Navigation {
        self.0.borrow_mut().navigations.push(Navigation::Reload);
        Navigation::Reload
    }

    fn alert(&mut self, message: &str) {
        self.0.borrow_mut().alerts.push(message.to_string());
    }

    fn dispatch_logout(&mut self, _event: &LogoutEvent) {
        self.0.borrow_mut().logout_events += 1;
    }
}

struct FakeView(Rc<RefCell<Vec<Option<String>>>>);

impl AuthView for FakeView {
    fn render(&mut self, account: Option<&AccountSummary>) {
        self.0
            .borrow_mut()
            .push(account.map(|a| a.display_name.clone()));
    }
}

#[derive(Default)]
pub struct FakeWidgetState {
    pub active: bool,
    pub restored: bool,
    pub loads: usize,
    pub delivered: Vec<String>,
}

struct FakeWidget(Rc<RefCell<FakeWidgetState>>);

impl WidgetHooks for FakeWidget {
    fn is_active(&self) -> bool {
        self.0.borrow().active
    }

    fn load(&mut self) {
        let mut state = self.0.borrow_mut();
        state.loads += 1;
        state.active = true;
    }

    fn deliver_token(&mut self, token: &str) {
        self.0.borrow_mut().delivered.push(token.to_string());
    }

    fn is_restored(&self) -> bool {
        self.0.borrow().restored
    }
}

struct SharedStore(Rc<RefCell<MemoryStore>>);

impl KeyValueStore for SharedStore {
    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.0.borrow().keys()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.0.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.borrow_mut().set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.0.borrow_mut().remove(key)
    }
}

struct SharedDatabases(Rc<RefCell<MemoryDatabases>>);

impl DatabaseStore for SharedDatabases {
    fn delete_database(&mut self, name: &str) -> Result<(), StorageError> {
        self.0.borrow_mut().delete_database(name)
    }
}

/// Browser state that outlives a single page load.
///
/// Every [`Harness::manager`] call is a fresh page load over the same
/// storage, identity client and page.
pub struct Harness {
    pub identity: Rc<RefCell<FakeIdentityState>>,
    pub local: Rc<RefCell<MemoryStore>>,
    pub session: Rc<RefCell<MemoryStore>>,
    pub databases: Rc<RefCell<MemoryDatabases>>,
    pub page: Rc<RefCell<FakePageState>>,
    pub view: Rc<RefCell<Vec<Option<String>>>>,
    pub widget: Rc<RefCell<FakeWidgetState>>,
}

impl Harness {
    pub fn new(url: &str) -> Self {
        let location = PageLocation::parse(url).expect("test URL");
        Self {
            identity: Rc::default(),
            local: Rc::default(),
            session: Rc::default(),
            databases: Rc::new(RefCell::new(MemoryDatabases::with(&[
                "msal.db",
                "OmnichannelDB",
                "LiveChatWidgetDB",
            ]))),
            page: Rc::new(RefCell::new(FakePageState {
                location,
                navigations: Vec::new(),
                alerts: Vec::new(),
                logout_events: 0,
            })),
            view: Rc::default(),
            widget: Rc::default(),
        }
    }

    pub fn sign_in(&self) {
        self.identity.borrow_mut().accounts = vec![account()];
    }

    pub fn rendered(&self) -> Vec<Option<String>> {
        self.view.borrow().clone()
    }

    pub fn manager(&self, with_widget: bool) -> AuthManager<FakeIdentity> {
        let widget: Option<Box<dyn WidgetHooks>> = if with_widget {
            Some(Box::new(FakeWidget(Rc::clone(&self.widget))))
        } else {
            None
        };
        AuthManager::new(
            FakeIdentity(Rc::clone(&self.identity)),
            Config::default(),
            BrowserStorage {
                local: Box::new(SharedStore(Rc::clone(&self.local))),
                session: Box::new(SharedStore(Rc::clone(&self.session))),
                databases: Box::new(SharedDatabases(Rc::clone(&self.databases))),
            },
            Box::new(FakePage(Rc::clone(&self.page))),
            Box::new(FakeView(Rc::clone(&self.view))),
            widget,
        )
    }
}
