//! OAuth2/OIDC public-client provider
//!
//! Interactive sign-in is the authorization code flow with PKCE through the
//! system browser and a loopback callback server. Silent acquisition redeems
//! the refresh token cached for the account. Accounts are identified from the
//! ID token's claims; the token's signature is not validated here.

use crate::auth::callback_server::CallbackServer;
use crate::auth::provider::{IdentityProviderClient, ProviderFactory};
use crate::auth::store::SessionStore;
use crate::auth::types::{
    codes, Account, AuthenticationResult, Authority, ProviderConfig, ProviderConfigError,
    ProviderError, ProviderResult, Scopes,
};
use ::oauth2::{
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
    reqwest::async_http_client,
    AuthUrl, AuthorizationCode, Client, ClientId, CsrfToken, ExtraTokenFields, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, StandardRevocableToken,
    StandardTokenResponse, TokenResponse, TokenUrl,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PROVIDER_TARGET: &str = "signet_sdk::provider";

/// Scopes every request carries so the response includes an ID token and a
/// refresh token
const OIDC_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Lifetime assumed when the response carries neither `expires_in` nor a
/// decodable `exp` claim
const FALLBACK_LIFETIME_SECS: i64 = 3600;

/// Extra token response fields returned by OIDC providers
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type OidcTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type OidcClient = Client<
    BasicErrorResponse,
    OidcTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Called with the authorization URL before the browser is launched
pub type UrlNotifier = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    preferred_username: Option<String>,
    email: Option<String>,
    sub: Option<String>,
    oid: Option<String>,
    tid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Decode the payload segment of a compact JWT without verifying it
fn decode_jwt_payload<T: DeserializeOwned>(token: &str) -> Option<T> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&decoded).ok()
}

fn account_from_id_token(id_token: &str) -> Option<Account> {
    let claims: IdTokenClaims = decode_jwt_payload(id_token)?;

    let username = claims
        .preferred_username
        .or(claims.email)
        .or_else(|| claims.sub.clone())?;

    let home_account_id = match (claims.oid, claims.tid) {
        (Some(oid), Some(tid)) => format!("{}.{}", oid, tid),
        _ => claims.sub.unwrap_or_else(|| username.clone()),
    };

    Some(Account {
        username,
        home_account_id,
    })
}

/// Map an OAuth error code to the provider error kinds
fn map_oauth_error(code: &str, description: Option<String>) -> ProviderError {
    match code {
        "interaction_required" | "login_required" | "consent_required" | "invalid_grant" => {
            ProviderError::interaction_required(code)
        }
        _ => ProviderError::service(code, description.unwrap_or_default()),
    }
}

fn map_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> ProviderError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => map_oauth_error(
            &response.error().to_string(),
            response.error_description().cloned(),
        ),
        RequestTokenError::Request(e) => ProviderError::client("request_failed", e.to_string()),
        RequestTokenError::Parse(e, _) => {
            ProviderError::client("invalid_token_response", e.to_string())
        }
        RequestTokenError::Other(message) => ProviderError::client("request_failed", message),
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct CachedAccount {
    username: String,
    home_account_id: String,
    refresh_token: String,
}

impl CachedAccount {
    fn account(&self) -> Account {
        Account::new(self.username.clone(), self.home_account_id.clone())
    }
}

/// Accounts and their refresh tokens, persisted in a session store
///
/// Shared by every provider a factory builds so concurrent calls for
/// different authorities do not overwrite each other's updates.
pub struct AccountCache {
    store: Arc<dyn SessionStore>,
    key: String,
    lock: Mutex<()>,
}

impl AccountCache {
    pub fn new(store: Arc<dyn SessionStore>, client_id: &str) -> Self {
        Self {
            store,
            key: format!("oauth2_accounts_{}", client_id),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> ProviderResult<Vec<CachedAccount>> {
        let raw = self
            .store
            .get(&self.key)
            .await
            .map_err(|e| ProviderError::other("account_cache", e.to_string()))?;

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(accounts) => Ok(accounts),
                Err(e) => {
                    warn!(target: PROVIDER_TARGET, "Discarding unreadable account cache: {}", e);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, accounts: &[CachedAccount]) -> ProviderResult<()> {
        let raw = serde_json::to_string(accounts)
            .map_err(|e| ProviderError::other("account_cache", e.to_string()))?;
        self.store
            .set(&self.key, &raw)
            .await
            .map_err(|e| ProviderError::other("account_cache", e.to_string()))
    }

    pub async fn accounts(&self) -> ProviderResult<Vec<Account>> {
        Ok(self.load().await?.iter().map(CachedAccount::account).collect())
    }

    async fn refresh_token(&self, home_account_id: &str) -> ProviderResult<Option<String>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|a| a.home_account_id == home_account_id)
            .map(|a| a.refresh_token))
    }

    async fn upsert(&self, account: &Account, refresh_token: &str) -> ProviderResult<()> {
        let _guard = self.lock.lock().await;
        let mut accounts = self.load().await?;

        let entry = CachedAccount {
            username: account.username.clone(),
            home_account_id: account.home_account_id.clone(),
            refresh_token: refresh_token.to_string(),
        };
        match accounts
            .iter_mut()
            .find(|a| a.home_account_id == account.home_account_id)
        {
            Some(existing) => *existing = entry,
            None => accounts.push(entry),
        }

        self.save(&accounts).await
    }

    async fn remove(&self, home_account_id: &str) -> ProviderResult<bool> {
        let _guard = self.lock.lock().await;
        let mut accounts = self.load().await?;

        let before = accounts.len();
        accounts.retain(|a| a.home_account_id != home_account_id);
        if accounts.len() == before {
            return Ok(false);
        }

        self.save(&accounts).await?;
        Ok(true)
    }
}

/// Public client bound to one authority
pub struct OAuth2Provider {
    client: OidcClient,
    config: ProviderConfig,
    authority: Authority,
    accounts: Arc<AccountCache>,
    url_notifier: Option<UrlNotifier>,
    launch_browser: bool,
}

impl OAuth2Provider {
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn request_scopes(scopes: &Scopes) -> Vec<Scope> {
        let mut requested: Vec<Scope> = scopes.iter().map(|s| Scope::new(s.to_string())).collect();
        for extra in OIDC_SCOPES {
            if !scopes.iter().any(|s| s == *extra) {
                requested.push(Scope::new(extra.to_string()));
            }
        }
        requested
    }

    fn open_browser(&self, url: &str) {
        if let Some(notify) = &self.url_notifier {
            notify(url);
        }

        if self.launch_browser {
            if let Err(e) = webbrowser::open(url) {
                warn!(target: PROVIDER_TARGET, "Failed to open browser: {}", e);
            }
        }
    }

    /// Store the refresh material for `account`. A failed write costs the next
    /// silent attempt, not the token already issued.
    async fn remember(&self, account: &Account, refresh_token: &str) {
        if let Err(e) = self.accounts.upsert(account, refresh_token).await {
            warn!(target: PROVIDER_TARGET, "Failed to update account cache: {}", e);
        }
    }

    fn expires_on(response: &OidcTokenResponse) -> DateTime<Utc> {
        let now = Utc::now();

        if let Some(lifetime) = response
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
        {
            return now + lifetime;
        }

        decode_jwt_payload::<ExpiryClaim>(response.access_token().secret())
            .and_then(|claim| Utc.timestamp_opt(claim.exp, 0).single())
            .unwrap_or_else(|| now + Duration::seconds(FALLBACK_LIFETIME_SECS))
    }

    fn account_from_response(response: &OidcTokenResponse) -> Option<Account> {
        response
            .extra_fields()
            .id_token
            .as_deref()
            .and_then(account_from_id_token)
    }

    fn result(response: &OidcTokenResponse, account: Account) -> AuthenticationResult {
        AuthenticationResult {
            access_token: response.access_token().secret().clone(),
            expires_on: Self::expires_on(response),
            account,
        }
    }
}

#[async_trait]
impl IdentityProviderClient for OAuth2Provider {
    async fn list_accounts(&self) -> ProviderResult<Vec<Account>> {
        self.accounts.accounts().await
    }

    async fn acquire_silent(
        &self,
        scopes: &Scopes,
        account: &Account,
    ) -> ProviderResult<Option<AuthenticationResult>> {
        let Some(refresh_token) = self.accounts.refresh_token(&account.home_account_id).await?
        else {
            return Err(ProviderError::interaction_required("no_refresh_token"));
        };

        debug!(target: PROVIDER_TARGET, "Redeeming refresh token at {}", self.authority);
        let refresh_token = RefreshToken::new(refresh_token);
        let response = self
            .client
            .exchange_refresh_token(&refresh_token)
            .add_scopes(Self::request_scopes(scopes))
            .request_async(async_http_client)
            .await
            .map_err(map_token_error)?;

        let resolved = Self::account_from_response(&response).unwrap_or_else(|| account.clone());
        let rotated = response
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| refresh_token.secret().clone());
        self.remember(&resolved, &rotated).await;

        Ok(Some(Self::result(&response, resolved)))
    }

    async fn acquire_interactive(
        &self,
        scopes: &Scopes,
        hint: Option<&Account>,
        cancel: CancellationToken,
    ) -> ProviderResult<Option<AuthenticationResult>> {
        let server =
            CallbackServer::from_redirect_uri(&self.config.redirect_uri, self.config.callback_timeout())?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(Self::request_scopes(scopes))
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("prompt", "select_account");
        if let Some(hint) = hint {
            request = request.add_extra_param("login_hint", hint.username.clone());
        }
        let (auth_url, csrf_state) = request.url();

        let pending = server.start(csrf_state.secret()).await?;
        info!(target: PROVIDER_TARGET, "Waiting for browser sign-in at {}", self.authority);
        self.open_browser(auth_url.as_str());

        let callback = pending.wait(cancel).await?;
        if let Some(error) = callback.error {
            return Err(map_oauth_error(&error, callback.error_description));
        }
        let code = callback.code.ok_or_else(|| {
            ProviderError::service("missing_code", "authorization response had no code")
        })?;

        debug!(target: PROVIDER_TARGET, "Exchanging authorization code");
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(map_token_error)?;

        let account = Self::account_from_response(&response).ok_or_else(|| {
            ProviderError::other(codes::MISSING_ID_TOKEN, "token response had no usable ID token")
        })?;

        match response.refresh_token() {
            Some(refresh_token) => self.remember(&account, refresh_token.secret()).await,
            None => warn!(
                target: PROVIDER_TARGET,
                "No refresh token issued; silent acquisition will not be possible"
            ),
        }

        Ok(Some(Self::result(&response, account)))
    }

    async fn remove_account(&self, account: &Account) -> ProviderResult<()> {
        if !self.accounts.remove(&account.home_account_id).await? {
            debug!(target: PROVIDER_TARGET, "Account was not in the cache");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "OAuth2/PKCE"
    }
}

/// Builds [`OAuth2Provider`]s that share one account cache
pub struct OAuth2ProviderFactory {
    config: ProviderConfig,
    accounts: Arc<AccountCache>,
    url_notifier: Option<UrlNotifier>,
    launch_browser: bool,
}

impl OAuth2ProviderFactory {
    pub fn new(
        config: ProviderConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, ProviderConfigError> {
        config.validate()?;

        Ok(Self {
            accounts: Arc::new(AccountCache::new(store, &config.client_id)),
            config,
            url_notifier: None,
            launch_browser: true,
        })
    }

    /// Observe the authorization URL, e.g. to print it for the user
    pub fn with_url_notifier(mut self, notifier: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.url_notifier = Some(Arc::new(notifier));
        self
    }

    /// Disable launching the system browser
    pub fn with_browser(mut self, launch: bool) -> Self {
        self.launch_browser = launch;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn provider(&self, authority: &Authority) -> ProviderResult<OAuth2Provider> {
        let auth_url = AuthUrl::new(authority.authorize_endpoint())
            .map_err(|e| ProviderError::client("invalid_authority", e.to_string()))?;
        let token_url = TokenUrl::new(authority.token_endpoint())
            .map_err(|e| ProviderError::client("invalid_authority", e.to_string()))?;
        let redirect_url = RedirectUrl::new(self.config.redirect_uri.clone())
            .map_err(|e| ProviderError::client("invalid_redirect_uri", e.to_string()))?;

        let client = OidcClient::new(
            ClientId::new(self.config.client_id.clone()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(OAuth2Provider {
            client,
            config: self.config.clone(),
            authority: authority.clone(),
            accounts: self.accounts.clone(),
            url_notifier: self.url_notifier.clone(),
            launch_browser: self.launch_browser,
        })
    }
}

impl ProviderFactory for OAuth2ProviderFactory {
    fn create(&self, authority: &Authority) -> ProviderResult<Arc<dyn IdentityProviderClient>> {
        Ok(Arc::new(self.provider(authority)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemorySessionStore;
    use crate::auth::types::AccountType;

    fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_account_from_id_token_prefers_username_claim() {
        let token = jwt(serde_json::json!({
            "preferred_username": "ada@example.com",
            "email": "other@example.com",
            "sub": "subject",
            "oid": "object-id",
            "tid": "tenant-id",
        }));

        let account = account_from_id_token(&token).unwrap();
        assert_eq!(account.username, "ada@example.com");
        assert_eq!(account.home_account_id, "object-id.tenant-id");
    }

    #[test]
    fn test_account_from_id_token_falls_back_to_sub() {
        let token = jwt(serde_json::json!({ "sub": "subject" }));

        let account = account_from_id_token(&token).unwrap();
        assert_eq!(account.username, "subject");
        assert_eq!(account.home_account_id, "subject");
    }

    #[test]
    fn test_malformed_jwt_is_rejected() {
        assert!(account_from_id_token("not-a-jwt").is_none());
        assert!(account_from_id_token("a.b.c.d").is_none());
        assert!(account_from_id_token("a.!!!.c").is_none());
    }

    #[test]
    fn test_oauth_error_mapping() {
        assert_eq!(
            map_oauth_error("invalid_grant", None),
            ProviderError::interaction_required("invalid_grant")
        );
        assert_eq!(
            map_oauth_error("login_required", None),
            ProviderError::interaction_required("login_required")
        );
        assert_eq!(
            map_oauth_error("access_denied", Some("user declined".to_string())),
            ProviderError::service("access_denied", "user declined")
        );
    }

    #[test]
    fn test_request_scopes_add_oidc_scopes_once() {
        let scopes = Scopes::new(["User.Read", "openid"]).unwrap();
        let requested: Vec<String> = OAuth2Provider::request_scopes(&scopes)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            requested,
            vec!["User.Read", "openid", "profile", "offline_access"]
        );
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let store = Arc::new(MemorySessionStore::new());
        assert!(matches!(
            OAuth2ProviderFactory::new(ProviderConfig::default(), store),
            Err(ProviderConfigError::MissingClientId)
        ));
    }

    #[test]
    fn test_factory_builds_provider_per_authority() {
        let store = Arc::new(MemorySessionStore::new());
        let factory = OAuth2ProviderFactory::new(ProviderConfig::new("client"), store).unwrap();

        let authority = Authority::new("https://login.example.com/", AccountType::Personal);
        let provider = factory.provider(&authority).unwrap();
        assert_eq!(provider.authority().as_str(), "https://login.example.com/consumers");
    }

    #[tokio::test]
    async fn test_account_cache_upsert_and_remove() {
        let store = Arc::new(MemorySessionStore::new());
        let cache = AccountCache::new(store.clone(), "client");
        let ada = Account::new("ada@example.com", "uid-ada");

        cache.upsert(&ada, "rt-1").await.unwrap();
        cache.upsert(&ada, "rt-2").await.unwrap();
        assert_eq!(cache.accounts().await.unwrap(), vec![ada.clone()]);
        assert_eq!(
            cache.refresh_token("uid-ada").await.unwrap().as_deref(),
            Some("rt-2")
        );

        let reopened = AccountCache::new(store, "client");
        assert_eq!(reopened.accounts().await.unwrap().len(), 1);

        assert!(reopened.remove("uid-ada").await.unwrap());
        assert!(!reopened.remove("uid-ada").await.unwrap());
        assert!(reopened.accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_silent_without_cached_refresh_token_needs_interaction() {
        let store = Arc::new(MemorySessionStore::new());
        let factory = OAuth2ProviderFactory::new(ProviderConfig::new("client"), store).unwrap();
        let provider = factory
            .provider(&Authority::new("https://login.example.com/", AccountType::Either))
            .unwrap();

        let scopes = Scopes::new(["User.Read"]).unwrap();
        let err = provider
            .acquire_silent(&scopes, &Account::new("ada@example.com", "uid-ada"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InteractionRequired { .. }));
    }
}
