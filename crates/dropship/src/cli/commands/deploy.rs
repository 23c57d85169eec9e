//! Ad-hoc deploy commands
//!
//! Each subcommand builds a backend configuration from flags (secrets may
//! come from the environment) and uploads a single artifact without a
//! lifecycle.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use tracing::info;

use dropship_core::{build_http_client, Config, Dispatcher, Overrides, ServiceConfig};
use dropship_stores::{
    AuthPlacement, CustomAuth, CustomConfig, DeployGateConfig, FirebaseConfig, LocalConfig,
    TestFlightConfig,
};

use crate::cli::{output, Cli, OutputFormat};

/// Upload to a backend configured entirely from flags
#[derive(Debug, Args)]
pub struct DeployCommand {
    #[command(subcommand)]
    pub command: DeploySubcommand,
}

/// Deploy subcommands
#[derive(Debug, Subcommand)]
pub enum DeploySubcommand {
    /// Upload to DeployGate
    #[command(name = "deploygate")]
    DeployGate(DeployGateCommand),

    /// Upload to Firebase App Distribution
    Firebase(FirebaseCommand),

    /// Upload to TestFlight through Apple's transporter
    #[command(name = "testflight")]
    TestFlight(TestFlightCommand),

    /// Upload to a custom HTTP endpoint
    Custom(CustomCommand),

    /// Copy or move the artifact on the local file system
    Local(LocalCommand),
}

/// Artifact shared by every deploy subcommand
#[derive(Debug, Args)]
pub struct ArtifactArgs {
    /// Artifact to upload
    #[arg(short, long)]
    pub source_path: PathBuf,
}

/// Where the token is sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Placement {
    /// Authorization header
    #[default]
    Header,
    /// Multipart form field
    Form,
    /// Query parameter
    Query,
}

impl From<Placement> for AuthPlacement {
    fn from(placement: Placement) -> Self {
        match placement {
            Placement::Header => AuthPlacement::Header,
            Placement::Form => AuthPlacement::Form,
            Placement::Query => AuthPlacement::Query,
        }
    }
}

/// Upload to DeployGate
#[derive(Debug, Args)]
pub struct DeployGateCommand {
    #[command(flatten)]
    pub artifact: ArtifactArgs,

    /// User or organization that owns the app
    #[arg(long, env = "DEPLOYGATE_APP_OWNER_NAME")]
    pub app_owner_name: Option<String>,

    /// API token
    #[arg(long, env = "DEPLOYGATE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Where the API token is sent
    #[arg(long, value_enum, default_value = "header")]
    pub auth_placement: Placement,

    /// Short message attached to the upload
    #[arg(short, long)]
    pub message: Option<String>,

    /// Release notes for the distribution page
    #[arg(long)]
    pub release_note: Option<String>,

    /// Distribution page to update
    #[arg(long)]
    pub distribution_key: Option<String>,

    /// Distribution page title
    #[arg(long)]
    pub distribution_name: Option<String>,

    /// Don't notify testers
    #[arg(long)]
    pub disable_notify: bool,
}

impl DeployGateCommand {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig::DeployGate(DeployGateConfig {
            app_owner_name: self.app_owner_name.clone().unwrap_or_default(),
            api_token: self.api_token.clone().unwrap_or_default(),
            auth_placement: self.auth_placement.into(),
            api_base: None,
        })
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            message: self.message.clone(),
            release_note: self.release_note.clone(),
            distribution_key: self.distribution_key.clone(),
            distribution_name: self.distribution_name.clone(),
            disable_notify: self.disable_notify.then_some(true),
            ..Default::default()
        }
    }
}

/// Upload to Firebase App Distribution
#[derive(Debug, Args)]
pub struct FirebaseCommand {
    #[command(flatten)]
    pub artifact: ArtifactArgs,

    /// Firebase project number
    #[arg(long, env = "FIREBASE_PROJECT_NUMBER")]
    pub project_number: Option<String>,

    /// Firebase app ID (e.g. 1:1234567890:android:abcdef)
    #[arg(long, env = "FIREBASE_APP_ID")]
    pub app_id: Option<String>,

    /// OAuth access token (`gcloud auth print-access-token`)
    #[arg(long, env = "FIREBASE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Seconds to wait for the upload to be processed
    #[arg(long)]
    pub processing_timeout_secs: Option<u64>,

    /// Release notes shown to testers
    #[arg(long)]
    pub release_notes: Option<String>,

    /// Tester emails, comma separated
    #[arg(long, value_delimiter = ',')]
    pub testers: Vec<String>,

    /// Tester group aliases, comma separated
    #[arg(long, value_delimiter = ',')]
    pub groups: Vec<String>,
}

impl FirebaseCommand {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig::Firebase(FirebaseConfig {
            project_number: self.project_number.clone().unwrap_or_default(),
            app_id: self.app_id.clone().unwrap_or_default(),
            access_token: self.access_token.clone().unwrap_or_default(),
            processing_timeout_secs: self.processing_timeout_secs,
            api_base: None,
        })
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            release_note: self.release_notes.clone(),
            testers: self.testers.clone(),
            groups: self.groups.clone(),
            ..Default::default()
        }
    }
}

/// Upload to TestFlight
#[derive(Debug, Args)]
pub struct TestFlightCommand {
    #[command(flatten)]
    pub artifact: ArtifactArgs,

    /// App Store Connect API key ID
    #[arg(long, env = "APP_STORE_CONNECT_KEY_ID")]
    pub api_key_id: Option<String>,

    /// App Store Connect API issuer ID
    #[arg(long, env = "APP_STORE_CONNECT_ISSUER_ID")]
    pub api_issuer_id: Option<String>,

    /// Apple ID, used with an app-specific password
    #[arg(long, env = "APPLE_ID")]
    pub username: Option<String>,

    /// App-specific password
    #[arg(long, env = "APPLE_APP_SPECIFIC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Platform (ios, macos, appletvos, visionos); detected from the file when omitted
    #[arg(long)]
    pub platform: Option<String>,

    /// Path to xcrun
    #[arg(long)]
    pub xcrun_path: Option<PathBuf>,
}

impl TestFlightCommand {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig::TestFlight(TestFlightConfig {
            api_key_id: self.api_key_id.clone(),
            api_issuer_id: self.api_issuer_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            platform: self.platform.clone(),
            xcrun_path: self.xcrun_path.clone(),
        })
    }
}

/// Upload to a custom HTTP endpoint
#[derive(Debug, Args)]
pub struct CustomCommand {
    #[command(flatten)]
    pub artifact: ArtifactArgs,

    /// Base URL of the endpoint
    #[arg(long, env = "DROPSHIP_CUSTOM_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Path below the endpoint
    #[arg(long, default_value = "")]
    pub path: String,

    /// Multipart field carrying the file
    #[arg(long, default_value = "file")]
    pub file_field_name: String,

    /// Access token
    #[arg(long, env = "DROPSHIP_CUSTOM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Where the token is sent
    #[arg(long, value_enum, default_value = "header")]
    pub auth_placement: Placement,

    /// Form field or query parameter name for the token
    #[arg(long, default_value = "token")]
    pub auth_key: String,

    /// Extra header (KEY=VALUE), repeatable
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub headers: Vec<(String, String)>,

    /// Extra query parameter (KEY=VALUE), repeatable
    #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub query_params: Vec<(String, String)>,

    /// Extra form field (KEY=VALUE), repeatable
    #[arg(long = "form", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub form_params: Vec<(String, String)>,
}

impl CustomCommand {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig::Custom(CustomConfig {
            endpoint: self.endpoint.clone().unwrap_or_default(),
            path: self.path.clone(),
            file_field_name: self.file_field_name.clone(),
            auth: self.token.as_ref().map(|token| CustomAuth {
                token: token.clone(),
                placement: self.auth_placement.into(),
                key: self.auth_key.clone(),
            }),
            headers: to_map(&self.headers),
            query_params: to_map(&self.query_params),
            form_params: to_map(&self.form_params),
        })
    }
}

/// Copy or move the artifact locally
#[derive(Debug, Args)]
pub struct LocalCommand {
    #[command(flatten)]
    pub artifact: ArtifactArgs,

    /// Destination file
    #[arg(short, long)]
    pub destination_path: PathBuf,

    /// Replace an existing destination file
    #[arg(long)]
    pub allow_overwrite: bool,

    /// Move instead of copy
    #[arg(long)]
    pub delete_source: bool,

    /// Permission bits for the destination, in octal (e.g. 0644)
    #[arg(long, value_parser = parse_octal)]
    pub file_mode: Option<u32>,
}

impl LocalCommand {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig::Local(LocalConfig {
            destination_path: self.destination_path.clone(),
            allow_overwrite: self.allow_overwrite,
            delete_source: self.delete_source,
            file_mode: self.file_mode,
        })
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode '{}': {}", s, e))
}

fn to_map(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    pairs.iter().cloned().collect()
}

impl DeployCommand {
    /// Execute the deploy command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (artifact, service, overrides) = self.plan();
        info!(service = %service.kind(), source = %artifact.display(), "executing deploy command");

        let config = Config::default();
        let client = build_http_client(&config.http)?;
        let dispatcher = Dispatcher::new(client, config);

        if cli.format == OutputFormat::Text && !cli.quiet {
            output::info(&format!(
                "Uploading {} to {}",
                output::path_style().apply_to(artifact.display()),
                service.kind()
            ));
        }

        let result = dispatcher.deploy(&service, artifact, &overrides).await?;
        output::print_result(&result, cli.format, cli.quiet)
    }

    fn plan(&self) -> (&PathBuf, ServiceConfig, Overrides) {
        match &self.command {
            DeploySubcommand::DeployGate(cmd) => (
                &cmd.artifact.source_path,
                cmd.service_config(),
                cmd.overrides(),
            ),
            DeploySubcommand::Firebase(cmd) => (
                &cmd.artifact.source_path,
                cmd.service_config(),
                cmd.overrides(),
            ),
            DeploySubcommand::TestFlight(cmd) => (
                &cmd.artifact.source_path,
                cmd.service_config(),
                Overrides::default(),
            ),
            DeploySubcommand::Custom(cmd) => (
                &cmd.artifact.source_path,
                cmd.service_config(),
                Overrides::default(),
            ),
            DeploySubcommand::Local(cmd) => (
                &cmd.artifact.source_path,
                cmd.service_config(),
                Overrides::default(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use clap::Parser;
    use dropship_stores::ServiceKind;
    use tempfile::TempDir;

    fn deploy(args: &[&str]) -> DeployCommand {
        let cli = Cli::try_parse_from(["dropship", "deploy"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Deploy(cmd) => cmd,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("X-Team=mobile").unwrap(),
            ("X-Team".to_string(), "mobile".to_string())
        );
        assert_eq!(
            parse_key_val("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_octal("0644").unwrap(), 0o644);
        assert_eq!(parse_octal("0o755").unwrap(), 0o755);
        assert!(parse_octal("0999").is_err());
    }

    #[test]
    fn test_deploygate_flags() {
        let cmd = deploy(&[
            "deploygate",
            "--source-path",
            "app.apk",
            "--app-owner-name",
            "team",
            "--api-token",
            "secret",
            "--auth-placement",
            "form",
            "--disable-notify",
        ]);
        let (artifact, service, overrides) = cmd.plan();

        assert_eq!(artifact, &PathBuf::from("app.apk"));
        match service {
            ServiceConfig::DeployGate(config) => {
                assert_eq!(config.app_owner_name, "team");
                assert_eq!(config.api_token, "secret");
                assert_eq!(config.auth_placement, AuthPlacement::Form);
            }
            other => panic!("unexpected service: {other:?}"),
        }
        assert_eq!(overrides.disable_notify, Some(true));
    }

    #[test]
    fn test_custom_flags() {
        let cmd = deploy(&[
            "custom",
            "--source-path",
            "app.ipa",
            "--endpoint",
            "https://builds.example.com",
            "--path",
            "/upload",
            "--token",
            "t0k",
            "--auth-placement",
            "query",
            "--header",
            "X-Team=mobile",
            "--form",
            "channel=beta",
            "--form",
            "build=42",
        ]);
        let (_, service, _) = cmd.plan();

        match service {
            ServiceConfig::Custom(config) => {
                assert_eq!(config.endpoint, "https://builds.example.com");
                assert_eq!(config.file_field_name, "file");
                let auth = config.auth.unwrap();
                assert_eq!(auth.placement, AuthPlacement::Query);
                assert_eq!(auth.key, "token");
                assert_eq!(config.headers["X-Team"], "mobile");
                assert_eq!(config.form_params.len(), 2);
            }
            other => panic!("unexpected service: {other:?}"),
        }
    }

    #[test]
    fn test_firebase_flags() {
        let cmd = deploy(&[
            "firebase",
            "--source-path",
            "app.aab",
            "--project-number",
            "1234",
            "--app-id",
            "1:1234:android:ab",
            "--access-token",
            "ya29",
            "--testers",
            "a@example.com,b@example.com",
        ]);
        let (_, service, overrides) = cmd.plan();

        assert_eq!(service.kind(), ServiceKind::Firebase);
        assert_eq!(overrides.testers.len(), 2);
    }

    #[test]
    fn test_deploy_local_end_to_end() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("app.apk");
        std::fs::write(&source, b"apk").unwrap();
        let destination = temp.path().join("dist").join("app.apk");

        let cli = Cli::try_parse_from([
            "dropship",
            "--quiet",
            "deploy",
            "local",
            "--source-path",
            source.to_str().unwrap(),
            "--destination-path",
            destination.to_str().unwrap(),
        ])
        .unwrap();
        cli.execute().unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"apk");
        assert!(source.exists());
    }
}
