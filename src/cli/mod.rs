pub mod commands;
pub mod printer;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use devstrap::installer::StepId;
use devstrap::InstallerConfig;

#[derive(Parser)]
#[command(name = "devstrap")]
#[command(version)]
#[command(about = "Install Node.js, Git and Claude Code without prompts")]
#[command(long_about = "Install Node.js, Git and the Claude Code CLI without prompts.\n\nUses winget or npm when available and falls back to verified downloads from nodejs.org and GitHub.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default one
    #[arg(long, global = true, env = "DEVSTRAP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which tools are installed
    Check {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install every missing tool, in order
    Install {
        /// Install a single tool (nodejs, git, claudecode)
        #[arg(long, value_parser = parse_step)]
        only: Option<StepId>,
    },

    /// Check whether a newer Claude Code is published
    UpdateCheck,

    /// Update Claude Code to the latest version
    Update,

    /// Check whether a newer devstrap is released
    SelfUpdateCheck,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the config file location
    Path,
}

fn parse_step(value: &str) -> std::result::Result<StepId, String> {
    StepId::parse(value).ok_or_else(|| {
        format!(
            "unknown step '{}' (expected one of: {})",
            value,
            StepId::ALL.map(|s| s.as_str()).join(", ")
        )
    })
}

/// Cancellation token fired by Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling...");
            token.cancel();
        }
    });
    cancel
}

impl Cli {
    fn load_config(&self) -> Result<InstallerConfig> {
        let config = match &self.config {
            Some(path) => {
                let mut config = InstallerConfig::load_from(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                config.apply_env(|key| std::env::var(key).ok());
                config
            }
            None => InstallerConfig::load()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Config { ref command } => match command {
                ConfigCommands::Show => commands::config::show(&self.load_config()?, self.config.as_deref()),
                ConfigCommands::Path => commands::config::path(self.config.as_deref()),
            },
            Commands::Check { json } => {
                let config = self.load_config()?;
                commands::check::execute(&config, json, cancel_on_ctrl_c()).await
            }
            Commands::Install { only } => {
                let config = self.load_config()?;
                commands::install::execute(&config, only, cancel_on_ctrl_c()).await
            }
            Commands::UpdateCheck => {
                let config = self.load_config()?;
                commands::update::check(&config, cancel_on_ctrl_c()).await
            }
            Commands::Update => {
                let config = self.load_config()?;
                commands::update::execute(&config, cancel_on_ctrl_c()).await
            }
            Commands::SelfUpdateCheck => {
                let config = self.load_config()?;
                commands::self_update::check(&config, cancel_on_ctrl_c()).await
            }
        }
    }
}
