//! CLI configuration
//!
//! Loaded in layers: built-in defaults, then `~/.config/signet/config.toml`
//! (or the file passed with `--config`), then `SIGNET_` environment
//! variables.

use crate::error::{CliError, Result};
use etcetera::{choose_base_strategy, BaseStrategy};
use serde::{Deserialize, Serialize};
use signet_common::{auth_constants::DEFAULT_SCOPES, ConfigLoader, ConfigurationError};
use signet_sdk::auth::{
    AccountType, FileSessionStore, KeyringSessionStore, MemorySessionStore, ProviderConfig,
    Scopes, SessionStore,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Where the session state and cached accounts are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for SessionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Keyring => "keyring",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub store: SessionBackend,

    /// Directory for the file backend; the platform data dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Service name entries are filed under in the OS keyring
    pub keyring_service: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionBackend::File,
            dir: None,
            keyring_service: "signet".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Account population used when `--account-type` is not given
    pub account_type: AccountType,

    /// Scopes used when `--scope` is not given
    pub scopes: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            account_type: AccountType::Either,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl ConfigLoader for CliConfig {
    const ENV_PREFIX: &'static str = "SIGNET_";
    const DEFAULT_FILE: &'static str = "signet.toml";

    // The client ID is checked when a provider is built, so `config show`
    // and `status` keep working before one is configured.
    fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.provider.callback_timeout_secs == 0 {
            return Err(ConfigurationError::invalid(
                "provider.callback_timeout_secs",
                "must be greater than zero",
            ));
        }

        Scopes::new(self.defaults.scopes.iter().cloned())
            .map_err(|e| ConfigurationError::invalid("defaults.scopes", e.to_string()))?;

        if self.session.store == SessionBackend::Keyring
            && self.session.keyring_service.trim().is_empty()
        {
            return Err(ConfigurationError::invalid(
                "session.keyring_service",
                "must not be empty when the keyring store is selected",
            ));
        }

        Ok(())
    }
}

impl CliConfig {
    /// Platform configuration directory for Signet
    pub fn config_dir() -> Result<PathBuf> {
        let strategy = choose_base_strategy()
            .map_err(|e| CliError::internal(format!("Failed to determine home directory: {e}")))?;
        Ok(strategy.config_dir().join("signet"))
    }

    /// Default location of the configuration file
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Resolve the file to load: the explicit path, else the default path
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path),
            None => Self::default_config_path(),
        }
    }

    /// Load configuration for a CLI invocation. An explicit path must exist;
    /// the default path is optional.
    pub fn load_for_cli(explicit: Option<PathBuf>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load(Some(Self::default_config_path()?))?,
        };
        Ok(config)
    }

    /// Scopes for a request: the overrides when any were given, else the defaults
    pub fn scopes(&self, overrides: &[String]) -> Result<Scopes> {
        let scopes = if overrides.is_empty() {
            Scopes::new(self.defaults.scopes.iter().cloned())?
        } else {
            Scopes::new(overrides.iter().cloned())?
        };
        Ok(scopes)
    }

    /// Build the configured session store
    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.session.store {
            SessionBackend::File => match &self.session.dir {
                Some(dir) => Arc::new(FileSessionStore::new(dir)?),
                None => Arc::new(FileSessionStore::default_location()?),
            },
            SessionBackend::Keyring => {
                Arc::new(KeyringSessionStore::new(&self.session.keyring_service))
            }
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        };
        Ok(store)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            CliError::Config(ConfigurationError::ParseError {
                details: format!("Failed to serialize config: {e}"),
            })
        })
    }
}
