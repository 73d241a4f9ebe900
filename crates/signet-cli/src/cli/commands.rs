use clap::{Args as ClapArgs, Subcommand};
use signet_sdk::auth::AccountType;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and cache a token for later use
    Login {
        #[command(flatten)]
        target: AuthTarget,

        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Fail immediately instead of offering to try again
        #[arg(long)]
        no_retry: bool,
    },

    /// Sign out and forget the remembered account
    Logout {
        /// Account population to sign out of
        #[arg(long, short = 't', value_name = "TYPE")]
        account_type: Option<AccountType>,
    },

    /// Show the remembered account and cached token
    Status,

    /// Print an access token, signing in if needed
    Token {
        #[command(flatten)]
        target: AuthTarget,

        /// Print the raw `Authorization` header value
        #[arg(long)]
        header: bool,

        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Who to sign in and what to ask for
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AuthTarget {
    /// Account population: personal, organizational or either
    #[arg(long, short = 't', value_name = "TYPE")]
    pub account_type: Option<AccountType>,

    /// Scopes to request; repeat or separate with commas
    #[arg(long = "scope", short = 's', value_delimiter = ',')]
    pub scopes: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
