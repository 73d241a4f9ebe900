//! `signet config` subcommands

use crate::config::CliConfig;
use crate::error::Result;
use crate::output::{compress_path, json_output, print_info, print_success};
use signet_common::ConfigLoader;
use std::path::PathBuf;

pub fn handle_show(config: &CliConfig, json: bool) -> Result<()> {
    if json {
        return json_output(config);
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

pub fn handle_path(explicit: Option<PathBuf>) -> Result<()> {
    let path = CliConfig::resolve_path(explicit)?;
    println!("{}", path.display());
    Ok(())
}

pub fn handle_init(explicit: Option<PathBuf>, force: bool) -> Result<()> {
    let path = CliConfig::resolve_path(explicit)?;

    if path.exists() && !force {
        print_info(&format!(
            "Configuration already exists at {} (use --force to overwrite)",
            compress_path(&path)
        ));
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, CliConfig::generate_example()?)?;

    print_success(&format!("Wrote configuration to {}", compress_path(&path)));
    print_info("Set provider.client_id to your application's client ID before signing in.");
    Ok(())
}
