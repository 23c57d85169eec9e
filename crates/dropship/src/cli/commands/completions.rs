//! Shell completion scripts

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::{output, Cli};

/// Print or install a completion script for dropship
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Target shell; detected from $SHELL when omitted
    #[arg(value_enum)]
    pub shell: Option<Shell>,

    /// Write the script here (parent directories are created)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let shell = self
            .shell
            .or_else(Shell::from_env)
            .context("Could not detect the shell from $SHELL; pass one explicitly")?;
        info!(%shell, "generating completions");

        let script = render(shell);
        let Some(path) = &self.output else {
            print!("{}", String::from_utf8_lossy(&script));
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &script)
            .with_context(|| format!("Failed to write completions to {}", path.display()))?;

        if !cli.quiet {
            output::success(&format!(
                "{} completions written to {}",
                shell,
                output::path_style().apply_to(path.display())
            ));
        }
        Ok(())
    }
}

fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut script = Vec::new();
    generate(shell, &mut cmd, name, &mut script);
    script
}
