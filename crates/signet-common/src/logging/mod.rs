//! Tracing setup for the `signet` binary
//!
//! Where the filter comes from, first match wins: `-v`/`-q` on the command
//! line, then `RUST_LOG`, then the filter the binary passes in. Output always
//! goes to stderr so tokens printed on stdout stay pipeable.
//!
//! `SIGNET_LOG_FORMAT=json` switches the compact text layer for JSON lines.

use anyhow::Result;
use clap_verbosity_flag::{Level, LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "SIGNET_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Parse a format name; anything unrecognised falls back to compact
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }

    fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// Install a global subscriber.
///
/// ```no_run
/// use clap::Parser;
/// use clap_verbosity_flag::{OffLevel, Verbosity};
///
/// #[derive(Parser)]
/// struct Args {
///     #[command(flatten)]
///     verbose: Verbosity<OffLevel>,
/// }
///
/// let args = Args::parse();
/// signet_common::logging::init_logging(&args.verbose, "signet_sdk=info").unwrap();
/// ```
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<()> {
    let filter = build_filter(verbosity.log_level(), default_filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}

/// Like [`init_logging`], but stays silent unless a flag or `RUST_LOG` asks
/// for output. Returns whether a subscriber was installed.
pub fn init_cli_logging<L: LogLevel>(
    verbosity: &Verbosity<L>,
    default_filter: &str,
) -> Result<bool> {
    if !wants_output(verbosity.log_level(), std::env::var_os("RUST_LOG").is_some()) {
        return Ok(false);
    }
    init_logging(verbosity, default_filter)?;
    Ok(true)
}

fn wants_output(flag_level: Option<Level>, rust_log_set: bool) -> bool {
    flag_level.is_some() || rust_log_set
}

fn build_filter(
    flag_level: Option<Level>,
    default_filter: &str,
) -> Result<EnvFilter> {
    match flag_level {
        Some(level) => Ok(EnvFilter::try_new(level.to_string())?),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter))),
    }
}
