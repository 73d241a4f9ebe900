//! Layered configuration loading
//!
//! Every configuration type is assembled the same way: serialized defaults,
//! then a TOML file, then environment variables. Nested keys in the
//! environment are separated by `__`, so `SIGNET_PROVIDER__CLIENT_ID` sets
//! `provider.client_id`.

use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait ConfigLoader: Sized + Default + Serialize + DeserializeOwned {
    /// Prefix for environment overrides, including the trailing underscore
    const ENV_PREFIX: &'static str;

    /// File merged by [`ConfigLoader::load`] when no explicit path is given
    const DEFAULT_FILE: &'static str;

    /// Reject values that parse but cannot be used
    fn validate(&self) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Load from `path` (or the default file when absent) plus environment.
    /// A missing file is not an error here; defaults fill the gaps.
    fn load(path: Option<PathBuf>) -> Result<Self, ConfigurationError> {
        let file = path.unwrap_or_else(|| PathBuf::from(Self::DEFAULT_FILE));
        debug!("Loading configuration from: {}", file.display());

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a file that must exist, plus environment
    fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        Self::load(Some(path.to_path_buf()))
    }

    /// Re-apply environment overrides on top of an already built value
    fn apply_env_overrides(config: &mut Self) -> Result<(), ConfigurationError> {
        let merged: Self = Figment::from(Serialized::defaults(&*config))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })?;

        merged.validate()?;
        *config = merged;
        Ok(())
    }

    /// Render the defaults as a TOML document
    fn generate_example() -> Result<String, ConfigurationError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigurationError::ParseError {
            details: format!("Failed to serialize config: {e}"),
        })
    }
}
