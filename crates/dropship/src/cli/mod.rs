//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dropship_core::config::{load_config, load_config_from_dir};
use dropship_core::Config;
use tracing::info;

use commands::{CompletionsCommand, DeployCommand, DistributeCommand, InitCommand};

/// Dropship - distribute app builds to testers and stores
#[derive(Debug, Parser)]
#[command(name = "dropship")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (searched for upwards when omitted)
    #[arg(long, global = true, env = "DROPSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a named distribution from the configuration file
    Distribute(DistributeCommand),

    /// Upload to a backend configured entirely from flags
    Deploy(DeployCommand),

    /// Initialize a new Dropship configuration
    Init(InitCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Distribute(ref cmd) => cmd.execute(&self),
            Commands::Deploy(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }

    /// Load the configuration named by `--config`, or search for one
    pub fn load_config(&self) -> anyhow::Result<(Config, PathBuf)> {
        let (config, path) = match &self.config {
            Some(path) => (load_config(path)?, path.clone()),
            None => load_config_from_dir(&std::env::current_dir()?)?,
        };
        info!(path = %path.display(), distributions = config.distributions.len(), "loaded configuration");
        Ok((config, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dropship",
            "distribute",
            "--name",
            "qa",
            "--source-path",
            "app.apk",
            "--format",
            "json",
            "-C",
            "/tmp",
            "--config",
            "ci/dropship.yaml",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp")));
        assert_eq!(cli.config, Some(PathBuf::from("ci/dropship.yaml")));
        assert!(matches!(cli.command, Commands::Distribute(_)));
    }

    #[test]
    fn test_unknown_subcommand() {
        assert!(Cli::try_parse_from(["dropship", "release"]).is_err());
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("targets.yaml");
        std::fs::write(
            &path,
            "distributions:\n  disk:\n    service: local\n    destination-path: /tmp/out.apk\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "dropship",
            "--config",
            path.to_str().unwrap(),
            "init",
        ])
        .unwrap();
        let (config, found) = cli.load_config().unwrap();
        assert_eq!(found, path);
        assert!(config.distributions.contains_key("disk"));
    }
}
