//! TestFlight uploads through Apple's transporter
//!
//! There is no public HTTP upload endpoint for App Store Connect builds, so
//! this backend shells out to `xcrun altool --upload-app` and reads its JSON
//! report.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::{Result, StoreError};
use crate::traits::Provider;
use crate::types::{DeployResult, ServiceKind};

/// Environment variable carrying the app-specific password to altool
pub const PASSWORD_ENV: &str = "DROPSHIP_ALTOOL_PASSWORD";

/// TestFlight configuration
///
/// Either the API key pair or the username/password pair must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestFlightConfig {
    /// App Store Connect API key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,

    /// App Store Connect API issuer ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_issuer_id: Option<String>,

    /// Apple ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// App-specific password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// altool `--type` (ios, macos, appletvos, visionos); inferred when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Path to `xcrun`; looked up on PATH when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xcrun_path: Option<PathBuf>,
}

/// Mutable upload request
#[derive(Debug, Clone, Default)]
pub struct TestFlightRequest {
    pub file_path: PathBuf,
    pub platform: Option<String>,
}

/// Typed view of the transporter report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFlightUpload {
    pub success_message: Option<String>,
    pub delivery_uuid: Option<String>,
    pub tool_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AltoolReport {
    #[serde(default)]
    product_errors: Vec<ProductError>,
    #[serde(default)]
    success_message: Option<String>,
    #[serde(default)]
    tool_version: Option<String>,
    #[serde(default)]
    details: Option<AltoolDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AltoolDetails {
    #[serde(default)]
    delivery_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// The altool invocation for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    args: Vec<String>,
    env: Vec<(String, String)>,
}

/// TestFlight provider
pub struct TestFlight {
    config: TestFlightConfig,
}

impl TestFlight {
    pub fn new(config: TestFlightConfig) -> Self {
        Self { config }
    }

    fn freeze(&self, request: &TestFlightRequest) -> Result<Invocation> {
        let platform = request
            .platform
            .clone()
            .or_else(|| self.config.platform.clone())
            .unwrap_or_else(|| detect_platform(&request.file_path).to_string());

        let mut args = vec![
            "altool".to_string(),
            "--upload-app".to_string(),
            "--file".to_string(),
            request.file_path.display().to_string(),
            "--type".to_string(),
            platform,
        ];
        let mut env = Vec::new();

        match (
            &self.config.api_key_id,
            &self.config.api_issuer_id,
            &self.config.username,
            &self.config.password,
        ) {
            (Some(key), Some(issuer), _, _) => {
                args.extend(["--apiKey".to_string(), key.clone()]);
                args.extend(["--apiIssuer".to_string(), issuer.clone()]);
            }
            (_, _, Some(username), Some(password)) => {
                args.extend(["--username".to_string(), username.clone()]);
                args.extend(["--password".to_string(), format!("@env:{}", PASSWORD_ENV)]);
                env.push((PASSWORD_ENV.to_string(), password.clone()));
            }
            _ => {
                return Err(StoreError::ConfigurationError(
                    "TestFlight needs api-key-id/api-issuer-id or username/password".to_string(),
                ))
            }
        }

        args.extend(["--output-format".to_string(), "json".to_string()]);
        Ok(Invocation { args, env })
    }

    fn xcrun(&self) -> Result<PathBuf> {
        match &self.config.xcrun_path {
            Some(path) => Ok(path.clone()),
            None => which::which("xcrun").map_err(|_| {
                StoreError::ToolNotFound("xcrun (install the Xcode command line tools)".to_string())
            }),
        }
    }
}

/// Guess the altool `--type` from the artifact extension
fn detect_platform(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match ext.as_str() {
        "pkg" => "macos",
        _ => "ios",
    }
}

/// Interpret altool's output
fn interpret(success: bool, stdout: &str, stderr: &str) -> Result<DeployResult<TestFlightUpload>> {
    let raw = serde_json::from_str::<Value>(stdout.trim())
        .or_else(|_| serde_json::from_str::<Value>(stderr.trim()))
        .ok();

    let report = raw
        .as_ref()
        .and_then(|v| serde_json::from_value::<AltoolReport>(v.clone()).ok());

    if let Some(report) = &report {
        if !report.product_errors.is_empty() {
            let messages: Vec<String> = report
                .product_errors
                .iter()
                .map(|e| match e.code {
                    Some(code) => format!("{} ({})", e.message, code),
                    None => e.message.clone(),
                })
                .collect();
            return Err(StoreError::CommandFailed(format!(
                "altool rejected the upload: {}",
                messages.join("; ")
            )));
        }
    }

    if !success {
        let detail = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(StoreError::CommandFailed(format!(
            "altool exited with failure: {}",
            detail.trim()
        )));
    }

    let upload = report
        .map(|r| TestFlightUpload {
            success_message: r.success_message,
            delivery_uuid: r.details.and_then(|d| d.delivery_uuid),
            tool_version: r.tool_version,
        })
        .unwrap_or_default();
    let raw = raw.unwrap_or_else(|| Value::String(stdout.trim().to_string()));
    Ok(DeployResult::new(raw, upload))
}

#[async_trait::async_trait]
impl Provider for TestFlight {
    type Request = TestFlightRequest;
    type Output = TestFlightUpload;

    fn service(&self) -> ServiceKind {
        ServiceKind::TestFlight
    }

    fn request(&self, path: &Path) -> TestFlightRequest {
        TestFlightRequest {
            file_path: path.to_path_buf(),
            platform: None,
        }
    }

    #[instrument(skip_all, fields(service = "testflight"))]
    async fn submit(&self, request: TestFlightRequest) -> Result<DeployResult<TestFlightUpload>> {
        info!("Uploading {} via altool", request.file_path.display());

        let invocation = self.freeze(&request)?;
        let xcrun = self.xcrun()?;

        let output = Command::new(&xcrun)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|e| StoreError::CommandFailed(format!("failed to run {}: {}", xcrun.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("altool stdout: {}", stdout);
        if !stderr.is_empty() {
            debug!("altool stderr: {}", stderr);
        }

        let result = interpret(output.status.success(), &stdout, &stderr)?;
        info!(
            delivery = result.typed().delivery_uuid.as_deref().unwrap_or("-"),
            "TestFlight upload complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_key_config() -> TestFlightConfig {
        TestFlightConfig {
            api_key_id: Some("KEY123".into()),
            api_issuer_id: Some("issuer-uuid".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_api_key_invocation() {
        let provider = TestFlight::new(api_key_config());
        let invocation = provider
            .freeze(&provider.request(Path::new("/build/App.ipa")))
            .unwrap();
        assert_eq!(
            invocation.args,
            [
                "altool",
                "--upload-app",
                "--file",
                "/build/App.ipa",
                "--type",
                "ios",
                "--apiKey",
                "KEY123",
                "--apiIssuer",
                "issuer-uuid",
                "--output-format",
                "json"
            ]
        );
        assert!(invocation.env.is_empty());
    }

    #[test]
    fn test_password_is_passed_through_env() {
        let provider = TestFlight::new(TestFlightConfig {
            username: Some("dev@example.com".into()),
            password: Some("abcd-efgh".into()),
            ..Default::default()
        });
        let mut request = provider.request(Path::new("/build/App.pkg"));
        request.platform = None;
        let invocation = provider.freeze(&request).unwrap();

        assert!(!invocation.args.iter().any(|a| a == "abcd-efgh"));
        assert!(invocation.args.contains(&"@env:DROPSHIP_ALTOOL_PASSWORD".to_string()));
        assert!(invocation.args.contains(&"macos".to_string()));
        assert_eq!(
            invocation.env,
            [(PASSWORD_ENV.to_string(), "abcd-efgh".to_string())]
        );
    }

    #[test]
    fn test_missing_credentials() {
        let provider = TestFlight::new(TestFlightConfig {
            api_key_id: Some("KEY".into()),
            ..Default::default()
        });
        let err = provider
            .freeze(&provider.request(Path::new("App.ipa")))
            .unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationError(_)));
    }

    #[test]
    fn test_platform_override() {
        let provider = TestFlight::new(TestFlightConfig {
            platform: Some("visionos".into()),
            ..api_key_config()
        });
        let mut request = provider.request(Path::new("App.ipa"));
        let invocation = provider.freeze(&request).unwrap();
        assert!(invocation.args.contains(&"visionos".to_string()));

        request.platform = Some("appletvos".into());
        let invocation = provider.freeze(&request).unwrap();
        assert!(invocation.args.contains(&"appletvos".to_string()));
    }

    #[test]
    fn test_interpret_success_report() {
        let stdout = r#"{"tool-version":"8.0.1","success-message":"No errors uploading 'App.ipa'","details":{"delivery-uuid":"d3c0"}}"#;
        let result = interpret(true, stdout, "").unwrap();
        assert_eq!(result.typed().delivery_uuid.as_deref(), Some("d3c0"));
        assert_eq!(result.typed().tool_version.as_deref(), Some("8.0.1"));
        assert_eq!(result.raw_json()["details"]["delivery-uuid"], "d3c0");
    }

    #[test]
    fn test_interpret_product_errors() {
        let stdout = r#"{"product-errors":[{"message":"Redundant Binary Upload","code":-19232}]}"#;
        let err = interpret(false, stdout, "").unwrap_err();
        assert!(
            matches!(err, StoreError::CommandFailed(ref m) if m.contains("Redundant Binary Upload (-19232)"))
        );
    }

    #[test]
    fn test_interpret_plain_failure() {
        let err = interpret(false, "", "xcrun: error: unable to find utility \"altool\"").unwrap_err();
        assert!(matches!(err, StoreError::CommandFailed(ref m) if m.contains("unable to find utility")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deploy_runs_xcrun() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let args_file = temp.path().join("args.txt");
        let script = temp.path().join("xcrun");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" > '{}'\necho '{{\"success-message\":\"ok\",\"details\":{{\"delivery-uuid\":\"u1\"}}}}'\n",
                args_file.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = TestFlight::new(TestFlightConfig {
            xcrun_path: Some(script),
            ..api_key_config()
        });
        let ipa = temp.path().join("App.ipa");
        let result = provider.deploy(&ipa, |_| {}).await.unwrap();

        assert_eq!(result.typed().success_message.as_deref(), Some("ok"));
        let args = std::fs::read_to_string(&args_file).unwrap();
        assert!(args.starts_with("altool --upload-app --file"));
        assert!(args.contains("--apiKey KEY123"));
    }
}
