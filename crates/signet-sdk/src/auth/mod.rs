//! Authentication module for Signet SDK
//!
//! This module provides token acquisition against an OAuth2/OIDC identity
//! provider:
//! - Silent acquisition from cached refresh material, with interactive fallback
//! - Remembered last-used identity across sessions
//! - Classification of provider failures
//! - Pluggable session storage (memory, file, OS keyring)
//! - Local HTTP callback server for browser sign-in

pub mod callback_server;
pub mod classifier;
pub mod engine;
pub mod provider;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types and functions
pub use classifier::classify;
pub use engine::TokenAcquisitionEngine;
pub use provider::{IdentityProviderClient, ProviderFactory};
pub use providers::{OAuth2Provider, OAuth2ProviderFactory};
pub use resolver::AccountResolver;
pub use session::{Session, SessionState, Transition};
pub use store::{
    get_sdk_data_dir, FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore,
    StoreError,
};
pub use types::{
    codes, Account, AccountType, AuthResult, AuthenticationResult, Authority, ClassifiedFailure,
    ProviderConfig, ProviderConfigError, ProviderError, ProviderResult, Scopes, ScopesError,
    Token,
};
