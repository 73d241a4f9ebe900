//! Account resolution for silent acquisition
//!
//! Picks the account the engine should try silently: the one whose username
//! matches the remembered identifier, otherwise the first account the
//! provider lists. When the provider holds several accounts and none match,
//! taking the first one is an explicit tie-break, not a preference.

use super::provider::IdentityProviderClient;
use super::types::Account;
use tracing::{debug, warn};

pub struct AccountResolver;

impl AccountResolver {
    /// Resolve the candidate account; never fails
    pub async fn resolve(
        provider: &dyn IdentityProviderClient,
        last_used_identifier: Option<&str>,
    ) -> Option<Account> {
        let accounts = match provider.list_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(
                    "Account enumeration failed on {}, continuing without a candidate: {}",
                    provider.name(),
                    e
                );
                return None;
            }
        };

        Self::select(accounts, last_used_identifier)
    }

    /// Exact, case-sensitive username match first, then the first account
    pub fn select(accounts: Vec<Account>, last_used_identifier: Option<&str>) -> Option<Account> {
        if let Some(identifier) = last_used_identifier {
            if let Some(account) = accounts.iter().find(|a| a.username == identifier) {
                debug!("Resolved remembered account {}", account.username);
                return Some(account.clone());
            }
        }

        let fallback = accounts.into_iter().next();
        if let Some(account) = &fallback {
            debug!("Falling back to first cached account {}", account.username);
        }
        fallback
    }
}
