//! # Signet Common
//!
//! Shared building blocks for the Signet crates: logging initialization,
//! layered configuration loading and the identity-platform constants that
//! both the SDK and the CLI default to.

pub mod auth_constants;
pub mod config;
pub mod error;
pub mod logging;

pub use config::ConfigLoader;
pub use error::ConfigurationError;
