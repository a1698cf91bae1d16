//! Config command for managing CLI configuration

use std::path::Path;

use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a config value
    Get {
        /// Config key name
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key name
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, path: &Path) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommands::Get { key } => run_get(key, path),
        ConfigCommands::Set { key, value } => run_set(key, value, path),
        ConfigCommands::List => run_list(path),
        ConfigCommands::Path => run_path(path),
        ConfigCommands::Init { force } => run_init(*force, path),
    }
}

fn run_get(key: &str, path: &Path) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    match config.get(key) {
        Some(value) => println!("{}", value),
        None => anyhow::bail!(
            "Unknown config key: {}. Available keys: {}",
            key,
            Config::keys().join(", ")
        ),
    }
    Ok(())
}

fn run_set(key: &str, value: &str, path: &Path) -> anyhow::Result<()> {
    let mut config = Config::load(path)?;
    config.set(key, value)?;
    config.save(path)?;
    tracing::info!("Updated {} in {}", key, path.display());
    println!("Set {} = {}", key, value);
    Ok(())
}

fn run_list(path: &Path) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    println!("Config file: {}", path.display());
    println!();
    for key in Config::keys() {
        let value = config.get(key).unwrap_or_else(|| "(not set)".to_string());
        println!("{} = {}", key, value);
    }
    Ok(())
}

fn run_path(path: &Path) -> anyhow::Result<()> {
    println!("{}", path.display());
    Ok(())
}

fn run_init(force: bool, path: &Path) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let config = Config::default();
    config.save(path)?;
    println!("Created config file at {}", path.display());
    Ok(())
}
