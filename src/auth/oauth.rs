//! Identity client backed by the Azure AD v2 endpoints
//!
//! A terminal has no browser to redirect, so interactive flows run the
//! OAuth2 device code flow instead. Their result is parked in the
//! identity cache and handed out by `handle_redirect_response` on the next
//! page load, which is what a browser redirect round trip looks like from
//! the page's side.

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, ClientId, DeviceAuthorizationUrl, RedirectUrl, RefreshToken, Scope,
    StandardDeviceAuthorizationResponse, TokenResponse as _, TokenUrl,
};
use serde::Deserialize;
use url::Url;

use super::identity::{Account, IdentityClient, Navigation, TokenResponse};
use super::{AuthError, IdentityConfig};
use crate::config::IdentityCache;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Claims used to identify the signed-in account.
#[derive(Debug, Default, Deserialize)]
struct AccessTokenClaims {
    oid: Option<String>,
    tid: Option<String>,
    name: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    unique_name: Option<String>,
}

/// Expiry of a token issued at `now`. A missing or out-of-range
/// `expires_in` falls back to the default lifetime.
fn expires_on(now: DateTime<Utc>, expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    expires_in
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| {
            if expires_in.is_some() {
                tracing::warn!("Token lifetime out of range, assuming the default");
            }
            now + chrono::Duration::seconds(DEFAULT_EXPIRES_IN_SECS)
        })
}

/// Decode the account from an access token's JWT payload.
///
/// The signature is not checked; the token was just received from the
/// token endpoint over TLS.
fn account_from_token(access_token: &str) -> Result<Account> {
    let payload = access_token
        .split('.')
        .nth(1)
        .context("Access token is not a JWT")?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("Access token payload is not base64url")?;
    let claims: AccessTokenClaims =
        serde_json::from_slice(&bytes).context("Access token payload is not JSON")?;

    let oid = claims.oid.context("Access token has no 'oid' claim")?;
    let tid = claims.tid.unwrap_or_default();
    let username = claims
        .preferred_username
        .or(claims.upn)
        .or(claims.unique_name)
        .unwrap_or_else(|| oid.clone());

    Ok(Account {
        home_account_id: format!("{}.{}", oid, tid),
        tenant_id: tid,
        username,
        name: claims.name,
    })
}

/// Identity client for the terminal host.
pub struct OAuthIdentityClient {
    config: IdentityConfig,
    cache: IdentityCache,
    cache_path: Option<PathBuf>,
}

impl OAuthIdentityClient {
    /// Load the identity cache from the config directory.
    pub fn load(config: IdentityConfig) -> Result<Self> {
        Ok(Self {
            config,
            cache: IdentityCache::load()?,
            cache_path: None,
        })
    }

    fn save(&self) -> Result<()> {
        match &self.cache_path {
            Some(path) => self.cache.save_to(path),
            None => self.cache.save(),
        }
    }

    /// Build the OAuth2 client from the identity configuration
    fn build_client(&self) -> Result<BasicClient> {
        let authority = self.config.authority();
        let auth_url = AuthUrl::new(format!("{}/oauth2/v2.0/authorize", authority))?;
        let token_url = TokenUrl::new(format!("{}/oauth2/v2.0/token", authority))?;
        let device_url =
            DeviceAuthorizationUrl::new(format!("{}/oauth2/v2.0/devicecode", authority))?;

        Ok(BasicClient::new(
            ClientId::new(self.config.client_id.clone()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(RedirectUrl::new(self.config.redirect_uri.clone())?)
        .set_device_authorization_url(device_url))
    }

    /// End-session URL that sends the browser back to `post_logout_redirect_uri`.
    fn logout_url(&self, post_logout_redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/oauth2/v2.0/logout", self.config.authority()))
            .context("Invalid authority")?;
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        Ok(url.into())
    }

    /// Turn a token endpoint response into a cached session.
    fn accept(
        &mut self,
        token_response: &BasicTokenResponse,
        fallback: Option<&Account>,
    ) -> Result<TokenResponse> {
        let access_token = token_response.access_token().secret().to_string();

        let account = match account_from_token(&access_token) {
            Ok(account) => account,
            Err(e) => match fallback {
                Some(account) => account.clone(),
                None => return Err(e.context("Could not identify the signed-in account")),
            },
        };

        if let Some(refresh_token) = token_response.refresh_token() {
            self.cache.refresh_token = Some(refresh_token.secret().to_string());
        }
        self.cache
            .accounts
            .retain(|known| known.home_account_id != account.home_account_id);
        self.cache.accounts.insert(0, account.clone());

        Ok(TokenResponse {
            access_token,
            expires_on: expires_on(Utc::now(), token_response.expires_in()),
            account,
        })
    }

    /// Interactive sign-in: device code flow, result parked for the next load.
    async fn interactive(&mut self, scopes: &[String]) -> Result<Navigation> {
        let client = self.build_client()?;

        tracing::info!("Initiating device code flow...");
        let device_auth_response: StandardDeviceAuthorizationResponse = client
            .exchange_device_code()?
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .context("Failed to request device code")?;

        println!();
        println!("To sign in, visit: {}", device_auth_response.verification_uri().as_str());
        println!("Enter code:        {}", device_auth_response.user_code().secret());
        println!();

        tracing::info!("Waiting for authentication...");
        let token_response = client
            .exchange_device_access_token(&device_auth_response)
            .request_async(oauth2::reqwest::async_http_client, tokio::time::sleep, None)
            .await
            .context("Failed to exchange device code for token")?;

        let response = self.accept(&token_response, None)?;
        self.cache.pending_response = Some(response);
        self.save()?;

        Ok(Navigation::Redirect(self.config.redirect_uri.clone()))
    }
}

fn identity_error(e: anyhow::Error) -> AuthError {
    AuthError::Identity(format!("{:#}", e))
}

impl IdentityClient for OAuthIdentityClient {
    fn accounts(&self) -> Vec<Account> {
        self.cache.accounts.clone()
    }

    async fn acquire_token_silent(
        &mut self,
        scopes: &[String],
        account: &Account,
    ) -> Result<TokenResponse, AuthError> {
        let refresh_token = self
            .cache
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::SilentAcquire("no refresh token cached".into()))?;
        let client = self.build_client().map_err(identity_error)?;

        tracing::debug!("Exchanging refresh token for {}", account.username);
        let token_response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| AuthError::SilentAcquire(e.to_string()))?;

        let response = self
            .accept(&token_response, Some(account))
            .map_err(identity_error)?;
        if let Err(e) = self.save() {
            tracing::warn!("Could not persist identity cache: {:#}", e);
        }
        Ok(response)
    }

    async fn acquire_token_redirect(
        &mut self,
        scopes: &[String],
        account: &Account,
    ) -> Result<Navigation, AuthError> {
        tracing::info!("Interactive token acquisition for {}", account.username);
        self.interactive(scopes).await.map_err(identity_error)
    }

    async fn login_redirect(&mut self, scopes: &[String]) -> Result<Navigation, AuthError> {
        self.interactive(scopes).await.map_err(identity_error)
    }

    async fn logout_redirect(
        &mut self,
        account: &Account,
        post_logout_redirect_uri: &str,
    ) -> Result<Navigation, AuthError> {
        let target = self
            .logout_url(post_logout_redirect_uri)
            .map_err(identity_error)?;

        self.cache
            .accounts
            .retain(|known| known.home_account_id != account.home_account_id);
        if self.cache.accounts.is_empty() {
            self.cache.refresh_token = None;
        }
        self.cache.pending_response = None;
        self.save().map_err(identity_error)?;

        Ok(Navigation::Redirect(target))
    }

    async fn handle_redirect_response(&mut self) -> Result<Option<TokenResponse>, AuthError> {
        let Some(response) = self.cache.pending_response.take() else {
            return Ok(None);
        };
        self.save()
            .map_err(|e| AuthError::RedirectResolution(format!("{:#}", e)))?;
        Ok(Some(response))
    }

    fn clear_cache(&mut self) {
        self.cache.clear();
        if let Err(e) = self.save() {
            tracing::warn!("Could not clear identity cache: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    const CACHE_FILE: &str = "identity.toml";

    /// Client whose cache file lives in a fresh temp dir.
    fn scratch_client() -> (OAuthIdentityClient, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let client = OAuthIdentityClient {
            config: IdentityConfig::default(),
            cache: IdentityCache::default(),
            cache_path: Some(dir.path().join(CACHE_FILE)),
        };
        (client, dir)
    }

    fn account() -> Account {
        Account {
            home_account_id: "oid-1.tid-1".into(),
            tenant_id: "tid-1".into(),
            username: "ada@example.com".into(),
            name: Some("Ada".into()),
        }
    }

    #[test]
    fn test_account_from_token() {
        let token = jwt(
            r#"{"oid":"oid-1","tid":"tid-1","name":"Ada","preferred_username":"ada@example.com"}"#,
        );
        assert_eq!(account_from_token(&token).unwrap(), account());
    }

    #[test]
    fn test_account_from_token_username_fallbacks() {
        let token = jwt(r#"{"oid":"oid-1","tid":"tid-1","upn":"ada@corp.example"}"#);
        let account = account_from_token(&token).unwrap();
        assert_eq!(account.username, "ada@corp.example");
        assert_eq!(account.name, None);

        let token = jwt(r#"{"oid":"oid-1"}"#);
        assert_eq!(account_from_token(&token).unwrap().username, "oid-1");
    }

    #[test]
    fn test_account_from_opaque_token_fails() {
        assert!(account_from_token("opaque-token").is_err());
        assert!(account_from_token(&jwt(r#"{"tid":"x"}"#)).is_err());
    }

    #[test]
    fn test_expires_on_lifetimes() {
        let now = Utc::now();
        assert_eq!(
            expires_on(now, Some(std::time::Duration::from_secs(600))),
            now + chrono::Duration::minutes(10)
        );
        assert_eq!(expires_on(now, None), now + chrono::Duration::hours(1));
        // A bogus server value must not crash the process
        assert_eq!(
            expires_on(now, Some(std::time::Duration::from_secs(u64::MAX))),
            now + chrono::Duration::hours(1)
        );
        assert_eq!(
            expires_on(now, Some(std::time::Duration::from_secs(i64::MAX as u64))),
            now + chrono::Duration::hours(1)
        );
    }

    #[test]
    fn test_logout_url() {
        let (client, _) = scratch_client();
        let url = client.logout_url("https://site.example/a.html?x=1").unwrap();
        assert!(url.starts_with(
            "https://login.microsoftonline.com/72f988bf-86f1-41af-91ab-2d7cd011db47/oauth2/v2.0/logout?"
        ));
        assert!(
            url.contains("post_logout_redirect_uri=https%3A%2F%2Fsite.example%2Fa.html%3Fx%3D1")
        );
    }

    #[tokio::test]
    async fn test_pending_response_handed_out_once() {
        let (mut client, dir) = scratch_client();
        client.cache.accounts = vec![account()];
        client.cache.pending_response = Some(TokenResponse {
            access_token: "T1".into(),
            expires_on: Utc::now(),
            account: account(),
        });

        let first = client.handle_redirect_response().await.unwrap();
        assert_eq!(first.map(|r| r.access_token).as_deref(), Some("T1"));
        assert!(client.handle_redirect_response().await.unwrap().is_none());

        // Persisted without the parked response
        let saved = IdentityCache::load_from(&dir.path().join(CACHE_FILE)).unwrap();
        assert!(saved.pending_response.is_none());
        assert_eq!(saved.accounts, vec![account()]);
    }

    #[test]
    fn test_silent_without_refresh_token() {
        let (mut client, _) = scratch_client();
        let err = tokio_test::block_on(
            client.acquire_token_silent(&["scope".to_string()], &account()),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::SilentAcquire(_)));
    }

    #[tokio::test]
    async fn test_logout_forgets_account() {
        let (mut client, dir) = scratch_client();
        client.cache.accounts = vec![account()];
        client.cache.refresh_token = Some("rt".into());

        let navigation = client
            .logout_redirect(&account(), "https://site.example/index.html")
            .await
            .unwrap();
        assert!(matches!(navigation, Navigation::Redirect(url) if url.contains("/logout?")));
        assert!(client.accounts().is_empty());
        assert!(client.cache.refresh_token.is_none());
    }

    #[test]
    fn test_clear_cache() {
        let (mut client, dir) = scratch_client();
        client.cache.accounts = vec![account()];
        client.cache.refresh_token = Some("rt".into());
        client.clear_cache();
        assert!(client.accounts().is_empty());
        let saved = IdentityCache::load_from(&dir.path().join(CACHE_FILE)).unwrap();
        assert!(saved.refresh_token.is_none());
    }
}
