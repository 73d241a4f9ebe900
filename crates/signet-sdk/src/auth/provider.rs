//! Identity provider client trait
//!
//! The engine never talks to an identity platform directly. It drives an
//! [`IdentityProviderClient`] built per call for the request's authority by a
//! [`ProviderFactory`].

use super::types::{Account, AuthenticationResult, Authority, ProviderResult, Scopes};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capability surface of an identity provider's public client
///
/// Implementations own their token cache. Errors carry the provider's
/// machine-readable code so the engine can classify them.
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Accounts currently present in the provider's cache
    async fn list_accounts(&self) -> ProviderResult<Vec<Account>>;

    /// Obtain a token from cached credentials without user interaction
    ///
    /// Returns `Ok(None)` when the provider completed without producing a
    /// result. Expired or revoked refresh material is reported as
    /// [`ProviderError::InteractionRequired`](super::types::ProviderError::InteractionRequired).
    async fn acquire_silent(
        &self,
        scopes: &Scopes,
        account: &Account,
    ) -> ProviderResult<Option<AuthenticationResult>>;

    /// Run the user-facing sign-in flow
    ///
    /// This may wait on the user for a long time. Implementations should stop
    /// promptly once `cancel` fires.
    async fn acquire_interactive(
        &self,
        scopes: &Scopes,
        hint: Option<&Account>,
        cancel: CancellationToken,
    ) -> ProviderResult<Option<AuthenticationResult>>;

    /// Drop an account from the provider's cache
    async fn remove_account(&self, account: &Account) -> ProviderResult<()>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Builds a provider client bound to one authority
pub trait ProviderFactory: Send + Sync {
    fn create(&self, authority: &Authority) -> ProviderResult<Arc<dyn IdentityProviderClient>>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&Authority) -> ProviderResult<Arc<dyn IdentityProviderClient>> + Send + Sync,
{
    fn create(&self, authority: &Authority) -> ProviderResult<Arc<dyn IdentityProviderClient>> {
        self(authority)
    }
}
