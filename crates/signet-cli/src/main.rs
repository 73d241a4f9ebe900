use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use signet_cli::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::config::HookBuilder::default()
        .display_location_section(false)
        .display_env_section(false)
        .install()?;

    signet_common::logging::init_cli_logging(
        &args.verbose,
        "signet=warn,signet_cli=warn,signet_sdk=warn",
    )
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    Ok(args.run().await?)
}
