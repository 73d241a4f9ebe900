use crate::cli::commands::{Commands, ConfigAction};
use crate::cli::handlers;
use crate::config::CliConfig;
use crate::error::Result;
use clap::{Parser, ValueHint};
use clap_verbosity_flag::{OffLevel, Verbosity};
use std::path::PathBuf;

/// Signet: sign in to an OAuth2/OIDC identity platform and hand out tokens
#[derive(Parser, Debug)]
#[command(
    name = "signet",
    author,
    version,
    about = "Signet - sign in once, get access tokens from the command line",
    long_about = None
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub verbose: Verbosity<OffLevel>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        // Config commands must work even when the file on disk is broken
        if let Commands::Config { action } = &self.command {
            return match action {
                ConfigAction::Path => handlers::config::handle_path(self.config.clone()),
                ConfigAction::Init { force } => {
                    handlers::config::handle_init(self.config.clone(), *force)
                }
                ConfigAction::Show => {
                    let config = CliConfig::load_for_cli(self.config.clone())?;
                    handlers::config::handle_show(&config, self.json)
                }
            };
        }

        let config = CliConfig::load_for_cli(self.config.clone())?;

        match self.command {
            Commands::Login {
                target,
                no_browser,
                no_retry,
            } => handlers::auth::handle_login(&config, target, !no_browser, !no_retry).await,
            Commands::Logout { account_type } => {
                handlers::auth::handle_logout(&config, account_type).await
            }
            Commands::Status => handlers::auth::handle_status(&config, self.json).await,
            Commands::Token {
                target,
                header,
                no_browser,
            } => handlers::auth::handle_token(&config, target, header, !no_browser, self.json).await,
            // handled before the config is loaded
            Commands::Config { .. } => Ok(()),
        }
    }
}
