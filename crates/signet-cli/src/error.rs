use color_eyre::eyre::{eyre, Report};
use signet_common::ConfigurationError;
use signet_sdk::auth::{ClassifiedFailure, ProviderConfigError, ScopesError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error("Invalid provider configuration: {0}")]
    ProviderConfig(#[from] ProviderConfigError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] ClassifiedFailure),

    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid scopes: {0}")]
    Scopes(#[from] ScopesError),

    #[error("Sign-out could not be completed with the identity provider")]
    SignOutIncomplete,

    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] Report),
}

impl CliError {
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal(eyre!("{}", message))
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
