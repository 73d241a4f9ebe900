//! Signet SDK
//!
//! Acquire bearer tokens from an OAuth2/OIDC identity provider, trying cached
//! credentials silently before falling back to browser sign-in, and remember
//! which account signed in last.
//!
//! ```rust,no_run
//! use signet_sdk::auth::{
//!     AccountType, FileSessionStore, OAuth2ProviderFactory, ProviderConfig, Scopes, Session,
//!     TokenAcquisitionEngine,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileSessionStore::default_location()?);
//! let config = ProviderConfig::new("00000000-0000-0000-0000-000000000000");
//! let factory = OAuth2ProviderFactory::new(config.clone(), store.clone())?;
//!
//! let engine = TokenAcquisitionEngine::new(
//!     Arc::new(factory),
//!     config.instance.clone(),
//!     Arc::new(Session::new(store)),
//! );
//!
//! let scopes: Scopes = "User.Read".parse()?;
//! let token = engine.acquire_token(&scopes, AccountType::Either).await?;
//! let client = signet_sdk::client::authorized_client(&token)?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;

pub use auth::{
    AccountType, AuthResult, ClassifiedFailure, Scopes, Token, TokenAcquisitionEngine,
};
pub use client::{authorized_client, ClientError};
