//! Command handlers for the Signet CLI

pub mod auth;
pub mod config;
