//! Session state shared by every acquisition
//!
//! The state is loaded lazily from a [`SessionStore`] on first use and written
//! back as a single JSON document after each transition. Storage failures are
//! logged and absorbed: the in-memory copy stays authoritative for the life of
//! the process.

use super::store::{MemorySessionStore, SessionStore};
use super::types::{AccountType, Scopes, Token};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Snapshot of the adaptive acquisition state
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Username of the account that last signed in successfully
    pub last_used_identifier: Option<String>,
    pub cached_token: Option<String>,
    pub token_expiration: Option<DateTime<Utc>>,
    /// Scopes the cached token was issued for
    pub token_scopes: Option<Scopes>,
    /// Authority population the cached token was issued under
    pub token_account_type: Option<AccountType>,
    /// Whether the next call should try the cached refresh material first
    pub try_silent_first: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            last_used_identifier: None,
            cached_token: None,
            token_expiration: None,
            token_scopes: None,
            token_account_type: None,
            try_silent_first: true,
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("last_used_identifier", &self.last_used_identifier)
            .field(
                "cached_token",
                &self.cached_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_expiration", &self.token_expiration)
            .field("token_scopes", &self.token_scopes)
            .field("token_account_type", &self.token_account_type)
            .field("try_silent_first", &self.try_silent_first)
            .finish()
    }
}

impl SessionState {
    /// Cached token for this request, if it stays valid past `margin`
    ///
    /// A token is never handed out past its expiration, and never for a
    /// different scope set or authority population than it was issued for.
    pub fn reusable_token(
        &self,
        scopes: &Scopes,
        account_type: AccountType,
        now: DateTime<Utc>,
        margin: Duration,
    ) -> Option<Token> {
        let access_token = self.cached_token.as_ref().filter(|t| !t.is_empty())?;
        let expires_on = self.token_expiration?;

        if self.token_scopes.as_ref() != Some(scopes)
            || self.token_account_type != Some(account_type)
        {
            return None;
        }

        if expires_on - now <= margin {
            return None;
        }

        Some(Token {
            access_token: access_token.clone(),
            expires_on,
            username: self.last_used_identifier.clone(),
        })
    }

    pub fn has_identity(&self) -> bool {
        self.last_used_identifier.is_some()
    }

    fn apply(&mut self, transition: &Transition) {
        match transition {
            Transition::Succeeded {
                token,
                scopes,
                account_type,
            } => {
                self.cached_token = Some(token.access_token.clone());
                self.token_expiration = Some(token.expires_on);
                self.token_scopes = Some(scopes.clone());
                self.token_account_type = Some(*account_type);
                self.last_used_identifier = token.username.clone();
                self.try_silent_first = true;
            }
            Transition::Demoted => {
                self.try_silent_first = false;
            }
            Transition::SignedOut => {
                self.last_used_identifier = None;
                self.cached_token = None;
                self.token_expiration = None;
                self.token_scopes = None;
                self.token_account_type = None;
            }
        }
    }
}

/// A state change produced by one engine call
#[derive(Debug, Clone)]
pub enum Transition {
    /// A usable token was obtained
    Succeeded {
        token: Token,
        scopes: Scopes,
        account_type: AccountType,
    },
    /// Bias the next call toward interactive sign-in
    Demoted,
    /// Forget the remembered identity and any cached token
    SignedOut,
}

/// Lazily loaded, store-backed session state with serialized mutation
pub struct Session {
    store: Arc<dyn SessionStore>,
    state: Mutex<Option<SessionState>>,
}

impl Session {
    /// Store key holding the serialized state
    pub const STORAGE_KEY: &'static str = "session_state";

    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            state: Mutex::new(None),
        }
    }

    /// Session that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    /// The backing store, shared with providers that persist their own cache
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Current state, loading it from the store on first access
    pub async fn snapshot(&self) -> SessionState {
        let mut guard = self.state.lock().await;
        self.loaded(&mut guard).await.clone()
    }

    /// Apply a transition and persist the result
    pub async fn apply(&self, transition: Transition) -> SessionState {
        let mut guard = self.state.lock().await;
        let state = self.loaded(&mut guard).await;
        state.apply(&transition);
        let updated = state.clone();

        self.persist(&updated).await;
        updated
    }

    async fn loaded<'a>(&self, slot: &'a mut Option<SessionState>) -> &'a mut SessionState {
        if slot.is_none() {
            *slot = Some(self.load().await);
        }
        slot.get_or_insert_with(SessionState::default)
    }

    async fn load(&self) -> SessionState {
        match self.store.get(Self::STORAGE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(state) => {
                    debug!("Loaded session state from store");
                    state
                }
                Err(e) => {
                    warn!("Ignoring unreadable session state: {}", e);
                    SessionState::default()
                }
            },
            Ok(None) => SessionState::default(),
            Err(e) => {
                warn!("Failed to read session state, starting empty: {}", e);
                SessionState::default()
            }
        }
    }

    async fn persist(&self, state: &SessionState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize session state: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(Self::STORAGE_KEY, &raw).await {
            warn!("Failed to persist session state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::StoreError;
    use async_trait::async_trait;

    fn scopes() -> Scopes {
        Scopes::new(["User.Read"]).unwrap()
    }

    fn success(token: &str, expires_in: Duration, username: &str) -> Transition {
        Transition::Succeeded {
            token: Token {
                access_token: token.to_string(),
                expires_on: Utc::now() + expires_in,
                username: Some(username.to_string()),
            },
            scopes: scopes(),
            account_type: AccountType::Either,
        }
    }

    #[test]
    fn test_default_state_tries_silent_first() {
        let state = SessionState::default();
        assert!(state.try_silent_first);
        assert!(!state.has_identity());
        assert!(state.cached_token.is_none());
    }

    #[test]
    fn test_reusable_token_respects_margin() {
        let now = Utc::now();
        let state = SessionState {
            cached_token: Some("T1".to_string()),
            token_expiration: Some(now + Duration::minutes(10)),
            token_scopes: Some(scopes()),
            token_account_type: Some(AccountType::Either),
            ..SessionState::default()
        };

        let margin = Duration::minutes(5);
        assert!(state
            .reusable_token(&scopes(), AccountType::Either, now, margin)
            .is_some());
        assert!(state
            .reusable_token(&scopes(), AccountType::Either, now + Duration::minutes(6), margin)
            .is_none());
    }

    #[test]
    fn test_token_expiring_exactly_at_margin_is_stale() {
        let now = Utc::now();
        let margin = Duration::minutes(5);
        let mut state = SessionState {
            cached_token: Some("T1".to_string()),
            token_expiration: Some(now + margin),
            token_scopes: Some(scopes()),
            token_account_type: Some(AccountType::Either),
            ..SessionState::default()
        };

        assert!(state
            .reusable_token(&scopes(), AccountType::Either, now, margin)
            .is_none());

        state.token_expiration = Some(now + margin + Duration::seconds(1));
        assert!(state
            .reusable_token(&scopes(), AccountType::Either, now, margin)
            .is_some());
    }

    #[test]
    fn test_reusable_token_requires_matching_request() {
        let now = Utc::now();
        let state = SessionState {
            cached_token: Some("T1".to_string()),
            token_expiration: Some(now + Duration::hours(1)),
            token_scopes: Some(scopes()),
            token_account_type: Some(AccountType::Personal),
            ..SessionState::default()
        };
        let margin = Duration::minutes(5);

        assert!(state
            .reusable_token(&scopes(), AccountType::Organizational, now, margin)
            .is_none());
        let other = Scopes::new(["Mail.Read"]).unwrap();
        assert!(state
            .reusable_token(&other, AccountType::Personal, now, margin)
            .is_none());
    }

    #[test]
    fn test_debug_redacts_cached_token() {
        let state = SessionState {
            cached_token: Some("very-secret".to_string()),
            ..SessionState::default()
        };
        assert!(!format!("{:?}", state).contains("very-secret"));
    }

    #[tokio::test]
    async fn test_success_then_sign_out() {
        let session = Session::in_memory();

        let state = session
            .apply(success("T1", Duration::hours(1), "ada@example.com"))
            .await;
        assert_eq!(state.last_used_identifier.as_deref(), Some("ada@example.com"));
        assert!(state.try_silent_first);

        session.apply(Transition::Demoted).await;
        let state = session.apply(Transition::SignedOut).await;
        assert_eq!(state.last_used_identifier, None);
        assert_eq!(state.cached_token, None);
        assert_eq!(state.token_expiration, None);
        assert!(!state.try_silent_first);
    }

    #[tokio::test]
    async fn test_state_survives_new_session_on_same_store() {
        let store = Arc::new(MemorySessionStore::new());

        let first = Session::new(store.clone());
        first
            .apply(success("T1", Duration::hours(1), "ada@example.com"))
            .await;

        let second = Session::new(store);
        let state = second.snapshot().await;
        assert_eq!(state.last_used_identifier.as_deref(), Some("ada@example.com"));
        assert_eq!(state.cached_token.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_corrupt_state_falls_back_to_default() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(Session::STORAGE_KEY, "{not json").await.unwrap();

        let session = Session::new(store);
        assert_eq!(session.snapshot().await, SessionState::default());
    }

    struct FailingStore;

    #[async_trait]
    impl SessionStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Storage("unavailable".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Storage("unavailable".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Storage("unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failures_keep_in_memory_state() {
        let session = Session::new(Arc::new(FailingStore));

        session
            .apply(success("T1", Duration::hours(1), "ada@example.com"))
            .await;
        let state = session.snapshot().await;
        assert_eq!(state.cached_token.as_deref(), Some("T1"));
    }
}
