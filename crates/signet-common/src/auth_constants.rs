//! Identity platform defaults for Signet authentication
//!
//! These constants are compiled into the binary so the CLI works without a
//! configuration file. Every value can be overridden through `signet.toml`
//! or `SIGNET_` environment variables.

/// Base instance URL of the identity platform. The account-type suffix is
/// appended to form the authority.
pub const DEFAULT_INSTANCE: &str = "https://login.microsoftonline.com/";

/// Resource the default scopes are issued for
pub const GRAPH_RESOURCE_URL: &str = "https://graph.microsoft.com/";

/// Scopes requested when the caller does not name any
pub const DEFAULT_SCOPES: &[&str] = &["User.Read"];

/// Loopback redirect URI registered for the public client
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8400/callback";

/// How long the loopback listener waits for the browser to come back
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

/// Tokens expiring sooner than this are treated as stale and re-acquired
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;
