//! Init command

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use console::{style, Term};
use dialoguer::Confirm;
use tracing::info;

use dropship_core::config::defaults::{
    DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TEMPLATE_TOML, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML,
};

use crate::cli::{output, Cli};

/// Configuration file syntax
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Toml,
}

impl ConfigFormat {
    fn file_name(self) -> &'static str {
        match self {
            Self::Yaml => DEFAULT_CONFIG_YAML,
            Self::Toml => DEFAULT_CONFIG_TOML,
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::Yaml => DEFAULT_CONFIG_TEMPLATE,
            Self::Toml => DEFAULT_CONFIG_TEMPLATE_TOML,
        }
    }
}

/// Initialize a new Dropship configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Configuration file syntax
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, format = ?self.config_format, "executing init command");
        let config_path = match &self.output {
            Some(path) => path.clone(),
            None => std::env::current_dir()?.join(self.config_format.file_name()),
        };

        if config_path.exists()
            && !self.force
            && !confirm_overwrite(&config_path, Term::stdout().is_term())?
        {
            output::warning("Aborted.");
            return Ok(());
        }

        write_template(&config_path, self.config_format)?;

        if !cli.quiet {
            output::success(&format!(
                "Created configuration at {}",
                style(config_path.display()).cyan()
            ));
            println!();
            println!("{}", output::header("Next steps:"));
            println!(
                "  1. Edit {} and fill in your credentials",
                config_path.display()
            );
            println!(
                "  2. Run {} to ship a build",
                style("dropship distribute --name qa --source-path <artifact>").cyan()
            );
        }

        Ok(())
    }
}

/// Ask before replacing an existing file; refuse outright when not interactive
fn confirm_overwrite(path: &Path, interactive: bool) -> anyhow::Result<bool> {
    if !interactive {
        anyhow::bail!(
            "Configuration file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let overwrite = Confirm::new()
        .with_prompt(format!(
            "Configuration file already exists at {}. Overwrite?",
            path.display()
        ))
        .default(false)
        .interact()?;
    Ok(overwrite)
}

fn write_template(path: &Path, format: ConfigFormat) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format.template())?;
    info!(path = %path.display(), "wrote configuration template");
    Ok(())
}
