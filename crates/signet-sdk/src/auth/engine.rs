//! Token acquisition with silent-first fallback to interactive sign-in
//!
//! Each call runs the same sequence:
//! 1. Reuse the cached token if it stays valid past the refresh margin
//! 2. Resolve a candidate account for the request's authority
//! 3. Try silent acquisition when a candidate exists and the session allows it
//! 4. Fall back to interactive sign-in
//!
//! The outcome is applied to the session as a single transition at the end of
//! the call, so a cancelled call leaves no trace.

use super::classifier::classify;
use super::provider::{IdentityProviderClient, ProviderFactory};
use super::resolver::AccountResolver;
use super::session::{Session, SessionState, Transition};
use super::types::{
    Account, AccountType, AuthResult, AuthenticationResult, Authority, ClassifiedFailure, Scopes,
    Token,
};
use chrono::{Duration, Utc};
use signet_common::auth_constants::TOKEN_REFRESH_MARGIN_SECS;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One lock per account type; calls for the same population never overlap
#[derive(Default)]
struct FlightGuards {
    personal: Mutex<()>,
    organizational: Mutex<()>,
    either: Mutex<()>,
}

impl FlightGuards {
    fn for_type(&self, account_type: AccountType) -> &Mutex<()> {
        match account_type {
            AccountType::Personal => &self.personal,
            AccountType::Organizational => &self.organizational,
            AccountType::Either => &self.either,
        }
    }
}

/// Orchestrates token acquisition and sign-out against a shared session
pub struct TokenAcquisitionEngine {
    factory: Arc<dyn ProviderFactory>,
    instance: String,
    session: Arc<Session>,
    flights: FlightGuards,
    refresh_margin: Duration,
}

impl TokenAcquisitionEngine {
    /// Create an engine for the given base instance URL
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        instance: impl Into<String>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            factory,
            instance: instance.into(),
            session,
            flights: FlightGuards::default(),
            refresh_margin: Duration::seconds(TOKEN_REFRESH_MARGIN_SECS),
        }
    }

    /// Override how long before expiry a cached token stops being reused
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn authority(&self, account_type: AccountType) -> Authority {
        Authority::new(&self.instance, account_type)
    }

    /// Snapshot of the current session state
    pub async fn session(&self) -> SessionState {
        self.session.snapshot().await
    }

    /// Acquire a token without an external cancellation signal
    pub async fn acquire_token(
        &self,
        scopes: &Scopes,
        account_type: AccountType,
    ) -> AuthResult<Token> {
        self.acquire_token_with_cancel(scopes, account_type, CancellationToken::new())
            .await
    }

    /// Acquire a token; firing `cancel` aborts the interactive step
    pub async fn acquire_token_with_cancel(
        &self,
        scopes: &Scopes,
        account_type: AccountType,
        cancel: CancellationToken,
    ) -> AuthResult<Token> {
        let _flight = self.flights.for_type(account_type).lock().await;

        let state = self.session.snapshot().await;
        if let Some(token) =
            state.reusable_token(scopes, account_type, Utc::now(), self.refresh_margin)
        {
            debug!("Using cached token, expires at {}", token.expires_on);
            return Ok(token);
        }

        let authority = self.authority(account_type);
        debug!("Acquiring token from {}", authority);

        let provider = match self.factory.create(&authority) {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Failed to create identity provider client: {}", e);
                return self.fail(classify(&e), false).await;
            }
        };

        let candidate =
            AccountResolver::resolve(provider.as_ref(), state.last_used_identifier.as_deref())
                .await;

        match &candidate {
            Some(account) if state.try_silent_first => {
                match self.try_silent(provider.as_ref(), scopes, account).await {
                    SilentOutcome::Acquired(result) => {
                        return self.complete(result, scopes, account_type, false).await;
                    }
                    SilentOutcome::Escalate => {}
                    SilentOutcome::Failed(failure) => return self.fail(failure, false).await,
                }
            }
            Some(_) => debug!("Silent acquisition disabled for this call"),
            None => debug!("No cached account, skipping silent acquisition"),
        }

        // From here on the next call should not try silently unless this one
        // succeeds. The flag change is only written together with the outcome.
        info!("Starting interactive sign-in with {}", provider.name());
        let interactive = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClassifiedFailure::Cancelled),
            result = provider.acquire_interactive(scopes, candidate.as_ref(), cancel.clone()) => {
                match result {
                    Ok(Some(result)) => Ok(result),
                    Ok(None) => Err(ClassifiedFailure::CannotAuthenticate),
                    Err(e) => Err(match classify(&e) {
                        // Already interactive; nothing left to escalate to
                        ClassifiedFailure::InteractionRequired => ClassifiedFailure::ProviderError {
                            code: e.code().to_string(),
                        },
                        failure => failure,
                    }),
                }
            }
        };

        match interactive {
            Ok(result) => self.complete(result, scopes, account_type, true).await,
            Err(failure) => self.fail(failure, true).await,
        }
    }

    /// Forget the current identity and remove it from the provider cache
    ///
    /// Local state is cleared before remote removal. Returns `false` when
    /// the provider could not be reached or refused the removal.
    pub async fn sign_out(&self, account_type: AccountType) -> bool {
        let _flight = self.flights.for_type(account_type).lock().await;

        let state = self.session.snapshot().await;
        // Cleared before any provider call so an abandoned sign-out still forgets locally
        self.session.apply(Transition::SignedOut).await;

        let authority = self.authority(account_type);
        let provider = self.factory.create(&authority);

        let candidate = match &provider {
            Ok(provider) => {
                AccountResolver::resolve(provider.as_ref(), state.last_used_identifier.as_deref())
                    .await
            }
            Err(_) => None,
        };

        let provider = match provider {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Signed out locally, provider unavailable: {}", e);
                return false;
            }
        };

        let Some(account) = candidate else {
            info!("Signed out, no cached account to remove");
            return true;
        };

        match provider.remove_account(&account).await {
            Ok(()) => {
                info!("Signed out and removed cached account");
                true
            }
            Err(e) => {
                warn!("Signed out locally, account removal failed: {}", e);
                false
            }
        }
    }

    async fn try_silent(
        &self,
        provider: &dyn IdentityProviderClient,
        scopes: &Scopes,
        account: &Account,
    ) -> SilentOutcome {
        debug!("Attempting silent acquisition for {}", account.username);

        match provider.acquire_silent(scopes, account).await {
            Ok(Some(result)) => SilentOutcome::Acquired(result),
            Ok(None) => {
                debug!("Silent acquisition produced no result");
                SilentOutcome::Escalate
            }
            Err(e) => match classify(&e) {
                ClassifiedFailure::InteractionRequired => {
                    debug!("Silent acquisition needs interaction ({})", e.code());
                    SilentOutcome::Escalate
                }
                failure => SilentOutcome::Failed(failure),
            },
        }
    }

    async fn complete(
        &self,
        result: AuthenticationResult,
        scopes: &Scopes,
        account_type: AccountType,
        interactive: bool,
    ) -> AuthResult<Token> {
        if result.access_token.is_empty() {
            warn!("Identity provider reported success without an access token");
            return self
                .fail(ClassifiedFailure::ProviderContractViolation, interactive)
                .await;
        }

        let username = Some(result.account.username).filter(|u| !u.is_empty());
        let token = Token {
            access_token: result.access_token,
            expires_on: result.expires_on,
            username,
        };

        self.session
            .apply(Transition::Succeeded {
                token: token.clone(),
                scopes: scopes.clone(),
                account_type,
            })
            .await;

        info!(
            "Token acquired {}, expires at {}",
            if interactive { "interactively" } else { "silently" },
            token.expires_on
        );
        Ok(token)
    }

    async fn fail(&self, failure: ClassifiedFailure, interactive: bool) -> AuthResult<Token> {
        if failure == ClassifiedFailure::Cancelled {
            info!("Token acquisition cancelled");
            return Err(failure);
        }

        if interactive || failure.demotes_silent() {
            self.session.apply(Transition::Demoted).await;
        }

        warn!("Token acquisition failed: {}", failure);
        Err(failure)
    }
}

enum SilentOutcome {
    Acquired(AuthenticationResult),
    Escalate,
    Failed(ClassifiedFailure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{ProviderError, ProviderResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        silent_calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProviderClient for StaticProvider {
        async fn list_accounts(&self) -> ProviderResult<Vec<Account>> {
            Ok(vec![Account::new("ada@example.com", "uid-ada")])
        }

        async fn acquire_silent(
            &self,
            _scopes: &Scopes,
            account: &Account,
        ) -> ProviderResult<Option<AuthenticationResult>> {
            self.silent_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(AuthenticationResult {
                access_token: "silent".to_string(),
                expires_on: Utc::now() + Duration::hours(1),
                account: account.clone(),
            }))
        }

        async fn acquire_interactive(
            &self,
            _scopes: &Scopes,
            _hint: Option<&Account>,
            _cancel: CancellationToken,
        ) -> ProviderResult<Option<AuthenticationResult>> {
            Err(ProviderError::other("unexpected", "interactive should not run"))
        }

        async fn remove_account(&self, _account: &Account) -> ProviderResult<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn engine(provider: Arc<StaticProvider>) -> TokenAcquisitionEngine {
        let factory = move |_: &Authority| -> ProviderResult<Arc<dyn IdentityProviderClient>> {
            Ok(provider.clone())
        };
        TokenAcquisitionEngine::new(
            Arc::new(factory),
            "https://login.example.com/",
            Arc::new(Session::in_memory()),
        )
    }

    #[test]
    fn test_authority_uses_instance() {
        let provider = Arc::new(StaticProvider {
            silent_calls: AtomicUsize::new(0),
        });
        let engine = engine(provider);
        assert_eq!(
            engine.authority(AccountType::Personal).as_str(),
            "https://login.example.com/consumers"
        );
    }

    #[tokio::test]
    async fn test_cached_token_skips_provider() {
        let provider = Arc::new(StaticProvider {
            silent_calls: AtomicUsize::new(0),
        });
        let engine = engine(provider.clone());
        let scopes = Scopes::new(["User.Read"]).unwrap();

        let first = engine.acquire_token(&scopes, AccountType::Either).await.unwrap();
        let second = engine.acquire_token(&scopes, AccountType::Either).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_margin_forces_refresh() {
        let provider = Arc::new(StaticProvider {
            silent_calls: AtomicUsize::new(0),
        });
        let engine = engine(provider.clone()).with_refresh_margin(Duration::hours(2));
        let scopes = Scopes::new(["User.Read"]).unwrap();

        engine.acquire_token(&scopes, AccountType::Either).await.unwrap();
        engine.acquire_token(&scopes, AccountType::Either).await.unwrap();

        // A margin longer than the token lifetime forces a refresh every call
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 2);
    }
}
