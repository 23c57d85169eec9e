//! Distribute command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use dropship_core::{build_http_client, Dispatcher, Overrides};

use crate::cli::{output, Cli, OutputFormat};

/// Run a named distribution from the configuration file
#[derive(Debug, Args)]
pub struct DistributeCommand {
    /// Distribution name as listed under `distributions`
    #[arg(short, long)]
    pub name: String,

    /// Artifact to distribute (apk, aab, ipa, pkg, ...)
    #[arg(short, long)]
    pub source_path: PathBuf,

    /// Short message attached to the upload
    #[arg(short, long)]
    pub message: Option<String>,

    /// Release notes shown to testers
    #[arg(long)]
    pub release_note: Option<String>,

    /// Distribution page to update (DeployGate)
    #[arg(long)]
    pub distribution_key: Option<String>,

    /// Distribution page title (DeployGate)
    #[arg(long)]
    pub distribution_name: Option<String>,

    /// Don't notify testers (DeployGate)
    #[arg(long)]
    pub disable_notify: bool,

    /// Tester emails, comma separated (Firebase)
    #[arg(long, value_delimiter = ',')]
    pub testers: Vec<String>,

    /// Tester group aliases, comma separated (Firebase)
    #[arg(long, value_delimiter = ',')]
    pub groups: Vec<String>,
}

impl DistributeCommand {
    /// Execute the distribute command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(name = %self.name, source = %self.source_path.display(), "executing distribute command");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, config_path) = cli.load_config()?;
        let client = build_http_client(&config.http)?;
        let dispatcher = Dispatcher::new(client, config).with_base_dir(std::env::current_dir()?);

        if cli.format == OutputFormat::Text && !cli.quiet {
            output::info(&format!(
                "Distributing {} to '{}' ({})",
                style(self.source_path.display()).cyan(),
                self.name,
                style(config_path.display()).dim()
            ));
        }

        let result = dispatcher
            .distribute(&self.name, &self.source_path, &self.overrides())
            .await?;

        output::print_result(&result, cli.format, cli.quiet)
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            message: self.message.clone(),
            release_note: self.release_note.clone(),
            distribution_key: self.distribution_key.clone(),
            distribution_name: self.distribution_name.clone(),
            disable_notify: self.disable_notify.then_some(true),
            testers: self.testers.clone(),
            groups: self.groups.clone(),
            ..Default::default()
        }
    }
}
