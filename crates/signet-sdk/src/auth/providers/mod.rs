//! Identity provider implementations

pub mod oauth2;

pub use self::oauth2::{AccountCache, OAuth2Provider, OAuth2ProviderFactory, UrlNotifier};
