//! DeployGate binary hosting
//!
//! Uploads go to `POST /api/users/{owner}/apps` as a multipart form. The
//! response wraps everything in `{error, message, results}`.

use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{Result, StoreError};
use crate::form::Form;
use crate::http::{HttpClient, HttpResponse};
use crate::traits::Provider;
use crate::types::{
    string_or_number, AuthPlacement, DeployResult, ServiceKind, UploadBody, UploadRequest,
};

/// Default API endpoint
pub const DEPLOYGATE_API_BASE: &str = "https://deploygate.com";

/// DeployGate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeployGateConfig {
    /// User or organization that owns the app
    #[serde(default)]
    pub app_owner_name: String,

    /// API token
    #[serde(default)]
    pub api_token: String,

    /// How the token is sent
    #[serde(default)]
    pub auth_placement: AuthPlacement,

    /// Override the API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Mutable upload request
#[derive(Debug, Clone, Default)]
pub struct DeployGateRequest {
    pub file_path: PathBuf,
    pub message: Option<String>,
    pub distribution_key: Option<String>,
    pub distribution_name: Option<String>,
    pub release_note: Option<String>,
    pub disable_notify: Option<bool>,
}

/// Uploader of the build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployGateUser {
    pub name: String,
}

/// Distribution page the build was attached to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployGateDistribution {
    pub access_key: String,
    pub title: String,
    #[serde(default)]
    pub release_note: Option<String>,
    pub url: String,
}

/// Typed view of a DeployGate upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployGateUpload {
    pub os_name: String,
    pub name: String,
    pub package_name: String,
    pub revision: u64,
    #[serde(deserialize_with = "string_or_number")]
    pub version_code: String,
    pub version_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub sdk_version: String,
    /// Download URL
    pub file: String,
    pub user: DeployGateUser,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub distribution: Option<DeployGateDistribution>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    because: Option<String>,
    #[serde(default)]
    results: Option<serde_json::Value>,
}

/// DeployGate provider
pub struct DeployGate {
    config: DeployGateConfig,
    client: Client,
}

impl DeployGate {
    pub fn new(config: DeployGateConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn freeze(&self, request: DeployGateRequest) -> UploadRequest {
        let mut form = Form::new();
        form.add_file("file", request.file_path);
        if let Some(message) = request.message {
            form.add_text("message", message);
        }
        if let Some(key) = request.distribution_key {
            form.add_text("distribution_key", key);
        }
        if let Some(name) = request.distribution_name {
            form.add_text("distribution_name", name);
        }
        if let Some(note) = request.release_note {
            form.add_text("release_note", note);
        }
        if let Some(disable) = request.disable_notify {
            form.add_bool("disable_notify", disable);
        }

        UploadRequest::builder(UploadBody::Multipart(form))
            .segment("api/users")
            .segment(self.config.app_owner_name.clone())
            .segment("apps")
            .auth(&self.config.api_token, self.config.auth_placement, "token")
            .build()
    }
}

/// Turn a DeployGate response into a result or an error
fn interpret(response: &HttpResponse) -> Result<DeployResult<DeployGateUpload>> {
    let envelope = response.json::<Envelope>().ok();

    if !response.is_success() {
        let message = envelope
            .and_then(|e| e.message.or(e.because))
            .unwrap_or_else(|| response.text());
        return Err(StoreError::ApiError {
            status: response.status.as_u16(),
            message,
        });
    }

    let envelope = envelope.ok_or_else(|| {
        StoreError::UnexpectedResponse(format!(
            "DeployGate returned non-JSON body: {}",
            response.text()
        ))
    })?;

    if envelope.error {
        return Err(StoreError::ApiError {
            status: response.status.as_u16(),
            message: envelope
                .message
                .or(envelope.because)
                .unwrap_or_else(|| "unknown DeployGate error".to_string()),
        });
    }

    let raw = envelope.results.ok_or_else(|| {
        StoreError::UnexpectedResponse("DeployGate response has no results".to_string())
    })?;
    let upload: DeployGateUpload = serde_json::from_value(raw.clone())?;
    Ok(DeployResult::new(raw, upload))
}

#[async_trait::async_trait]
impl Provider for DeployGate {
    type Request = DeployGateRequest;
    type Output = DeployGateUpload;

    fn service(&self) -> ServiceKind {
        ServiceKind::DeployGate
    }

    fn request(&self, path: &Path) -> DeployGateRequest {
        DeployGateRequest {
            file_path: path.to_path_buf(),
            ..Default::default()
        }
    }

    #[instrument(skip_all, fields(service = "deploygate", owner = %self.config.app_owner_name))]
    async fn submit(&self, request: DeployGateRequest) -> Result<DeployResult<DeployGateUpload>> {
        info!("Uploading {} to DeployGate", request.file_path.display());

        let upload = self.freeze(request);
        let base = self.config.api_base.as_deref().unwrap_or(DEPLOYGATE_API_BASE);
        let http = HttpClient::new(self.client.clone(), base)?;

        let response = upload.send(&http).await?;
        let result = interpret(&response)?;

        info!(
            revision = result.typed().revision,
            package = %result.typed().package_name,
            "DeployGate upload complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::serve;
    use reqwest::StatusCode;
    use tempfile::TempDir;

    const UPLOAD_OK: &str = r#"{
        "error": false,
        "results": {
            "os_name": "Android",
            "name": "Sample",
            "package_name": "com.example.sample",
            "revision": 12,
            "version_code": "42",
            "version_name": "1.4.0",
            "sdk_version": 21,
            "file": "https://deploygate.com/api/files/abc",
            "user": {"name": "acme"},
            "message": "nightly",
            "distribution": {
                "access_key": "k3y",
                "title": "QA",
                "release_note": "fixes",
                "url": "https://deploygate.com/distributions/k3y"
            }
        }
    }"#;

    fn config(base: &str, placement: AuthPlacement) -> DeployGateConfig {
        DeployGateConfig {
            app_owner_name: "acme".to_string(),
            api_token: "secret".to_string(),
            auth_placement: placement,
            api_base: Some(base.to_string()),
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_interpret_success() {
        let result = interpret(&response(200, UPLOAD_OK)).unwrap();
        let upload = result.typed();
        assert_eq!(upload.package_name, "com.example.sample");
        assert_eq!(upload.version_code, "42");
        assert_eq!(upload.sdk_version, "21");
        assert_eq!(upload.user.name, "acme");
        assert_eq!(upload.distribution.as_ref().unwrap().access_key, "k3y");
        assert_eq!(result.raw_json()["revision"], 12);
    }

    #[test]
    fn test_interpret_structured_error() {
        let err = interpret(&response(
            400,
            r#"{"error": true, "message": "invalid token", "because": "auth"}"#,
        ))
        .unwrap_err();
        assert!(
            matches!(err, StoreError::ApiError { status: 400, ref message } if message == "invalid token")
        );
    }

    #[test]
    fn test_interpret_falls_back_to_raw_body() {
        let err = interpret(&response(502, "<html>Bad Gateway</html>")).unwrap_err();
        assert!(
            matches!(err, StoreError::ApiError { status: 502, ref message } if message.contains("Bad Gateway"))
        );
    }

    #[test]
    fn test_interpret_error_flag_on_success_status() {
        let err = interpret(&response(200, r#"{"error": true, "message": "app limit"}"#)).unwrap_err();
        assert!(matches!(err, StoreError::ApiError { ref message, .. } if message == "app limit"));
    }

    #[test]
    fn test_freeze_builds_expected_form() {
        let provider = DeployGate::new(config("https://x", AuthPlacement::Form), Client::new());
        let mut request = provider.request(Path::new("/tmp/app.apk"));
        request.message = Some("hello".into());
        request.disable_notify = Some(true);

        let upload = provider.freeze(request);
        assert_eq!(upload.segments(), &["api/users", "acme", "apps"]);
        match upload.body() {
            UploadBody::Multipart(form) => {
                let names: Vec<_> = form.fields().iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["file", "message", "disable_notify", "token"]);
            }
            UploadBody::File(_) => panic!("expected multipart"),
        }
    }

    #[tokio::test]
    async fn test_deploy_round_trip() {
        let temp = TempDir::new().unwrap();
        let apk = temp.path().join("app.apk");
        std::fs::write(&apk, b"apk").unwrap();

        let (base, mut rx) = serve(vec![(200, UPLOAD_OK.to_string())]).await;
        let provider = DeployGate::new(config(&base, AuthPlacement::Header), Client::new());

        let result = provider
            .deploy(&apk, |req| {
                req.distribution_key = Some("k3y".into());
                req.release_note = Some("fixes".into());
            })
            .await
            .unwrap();
        assert_eq!(result.typed().revision, 12);

        let request = rx.remove(0).await.unwrap();
        assert_eq!(request.target(), "POST /api/users/acme/apps");
        assert_eq!(request.header("authorization").as_deref(), Some("Bearer secret"));
        let body = request.body_text();
        assert!(body.contains("filename=\"app.apk\""));
        assert!(body.contains("name=\"distribution_key\"\r\n\r\nk3y\r\n"));
        assert!(body.contains("name=\"release_note\"\r\n\r\nfixes\r\n"));
        assert!(!body.contains("name=\"message\""));
    }
}
