//! # Signet CLI
//!
//! Command-line front end for the Signet SDK: sign in, print access tokens
//! for scripts, inspect the remembered session and sign out.

pub mod cli;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Args, Commands};
pub use config::CliConfig;
pub use error::{CliError, Result};
