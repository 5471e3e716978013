use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use poolward_core::AppConfig;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a commented template config file
    Init(InitArgs),
    /// Print the effective config (file + environment), password masked
    Show,
    /// Show the config file path that would be used
    Path,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the file (default: ~/.poolward/config.toml)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Force overwrite existing config
    #[arg(long, short)]
    pub force: bool,
}

/// Get default config file path: ~/.poolward/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".poolward/config.toml")
}

/// Explicit path if given, else the default path when it exists
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = default_config_path();
            default.exists().then_some(default)
        }
    }
}

pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = resolve_config_path(explicit);
    AppConfig::from_file_or_default(path.as_deref()).context("Failed to load configuration")
}

pub fn run_config(args: ConfigArgs, explicit: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Init(args) => run_init(args),
        ConfigCommands::Show => run_show(explicit),
        ConfigCommands::Path => run_path(explicit),
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    let config_path = args.path.unwrap_or_else(default_config_path);

    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {:?}\n\nUse --force to overwrite",
            config_path
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let template_content = include_str!("../../poolward.template.toml");
    std::fs::write(&config_path, template_content)
        .context(format!("Failed to write config file: {:?}", config_path))?;

    println!("✅ Created config at: {:?}", config_path);
    println!("\nNext steps:");
    println!("  1. Edit the config: $EDITOR {:?}", config_path);
    println!("  2. Run: poolward check");

    Ok(())
}

fn run_show(explicit: Option<&Path>) -> Result<()> {
    let config = load(explicit)?;
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

fn run_path(explicit: Option<&Path>) -> Result<()> {
    match resolve_config_path(explicit) {
        Some(path) => println!("{}", path.display()),
        None => println!(
            "{} (not found, using defaults)",
            default_config_path().display()
        ),
    }
    Ok(())
}
