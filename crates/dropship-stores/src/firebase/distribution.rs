//! Firebase App Distribution uploads

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::operation::{GoogleErrorBody, Operation, UploadReleaseResponse, UploadReleaseResult};
use crate::error::{Result, StoreError};
use crate::http::{HttpClient, HttpResponse};
use crate::poller::{OperationPoller, PollerOptions};
use crate::traits::Provider;
use crate::types::{file_name, DeployResult, ServiceKind, UploadBody, UploadRequest};

/// Default API endpoint, shared by the upload and REST paths
pub const FIREBASE_API_BASE: &str = "https://firebaseappdistribution.googleapis.com";

/// Firebase configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FirebaseConfig {
    /// Google Cloud project number (not the project ID)
    #[serde(default)]
    pub project_number: String,

    /// Firebase app ID (e.g., "1:123456789:android:abcdef")
    #[serde(default)]
    pub app_id: String,

    /// OAuth2 access token with the cloud-platform scope
    #[serde(default)]
    pub access_token: String,

    /// How long to wait for server-side processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_timeout_secs: Option<u64>,

    /// Override the API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Mutable upload request
#[derive(Debug, Clone, Default)]
pub struct FirebaseRequest {
    pub file_path: PathBuf,
    pub release_notes: Option<String>,
    pub tester_emails: Vec<String>,
    pub group_aliases: Vec<String>,
}

/// Typed view of an uploaded release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseRelease {
    /// What the upload did
    pub result: UploadReleaseResult,
    /// Resource name (`projects/../apps/../releases/..`)
    pub name: String,
    pub display_version: String,
    pub build_version: String,
    pub release_notes: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub firebase_console_uri: Option<String>,
    pub testing_uri: Option<String>,
    pub binary_download_uri: Option<String>,
}

/// Firebase App Distribution provider
pub struct Firebase {
    config: FirebaseConfig,
    client: Client,
    poller: OperationPoller,
}

impl Firebase {
    pub fn new(config: FirebaseConfig, client: Client) -> Self {
        let mut options = PollerOptions::default();
        if let Some(secs) = config.processing_timeout_secs {
            options = options.with_deadline(Duration::from_secs(secs));
        }
        Self {
            config,
            client,
            poller: OperationPoller::new(options),
        }
    }

    /// Replace the poller tuning
    pub fn with_poller_options(mut self, options: PollerOptions) -> Self {
        self.poller = OperationPoller::new(options);
        self
    }

    fn http(&self) -> Result<HttpClient> {
        let base = self.config.api_base.as_deref().unwrap_or(FIREBASE_API_BASE);
        HttpClient::new(self.client.clone(), base)?.with_bearer_token(&self.config.access_token)
    }

    fn freeze(&self, file_path: &Path) -> UploadRequest {
        UploadRequest::builder(UploadBody::File(file_path.to_path_buf()))
            .segment("upload/v1/projects")
            .segment(self.config.project_number.clone())
            .segment("apps")
            .segment(format!("{}/releases:upload", self.config.app_id))
            .header("X-Goog-Upload-File-Name", file_name(file_path))
            .header("X-Goog-Upload-Protocol", "raw")
            .build()
    }

    /// Poll the upload operation until the release has been processed
    async fn wait_for_release(&self, http: &HttpClient, operation: Operation) -> Result<Operation> {
        if operation.done {
            return Ok(operation);
        }

        let http = http.clone();
        let name = operation.name.clone();
        self.poller
            .wait(&operation.name, move || {
                let http = http.clone();
                let name = name.clone();
                async move {
                    let response = http.do_get(&["v1", &name], &[]).await?;
                    if !response.is_success() {
                        return Err(google_error(&response));
                    }
                    response.json::<Operation>()
                }
            })
            .await
    }

    async fn update_release_notes(
        &self,
        http: &HttpClient,
        release: &str,
        notes: &str,
    ) -> Result<()> {
        let body = json!({
            "name": release,
            "releaseNotes": { "text": notes },
        });
        let response = http
            .do_patch(&["v1", release], &[("updateMask", "release_notes.text")], &body)
            .await?;
        if !response.is_success() {
            return Err(google_error(&response));
        }
        Ok(())
    }

    async fn distribute(
        &self,
        http: &HttpClient,
        release: &str,
        testers: &[String],
        groups: &[String],
    ) -> Result<()> {
        let body = json!({
            "testerEmails": testers,
            "groupAliases": groups,
        });
        let response = http
            .do_post_json(&["v1", &format!("{}:distribute", release)], &[], &body)
            .await?;
        if !response.is_success() {
            return Err(google_error(&response));
        }
        Ok(())
    }
}

/// Build an error from a non-2xx response
fn google_error(response: &HttpResponse) -> StoreError {
    let message = match response.json::<GoogleErrorBody>() {
        Ok(body) => match body.error.status {
            Some(status) => format!("{} ({})", body.error.message, status),
            None => body.error.message,
        },
        Err(_) => response.text(),
    };
    StoreError::ApiError {
        status: response.status.as_u16(),
        message,
    }
}

fn release_from_operation(operation: Operation) -> Result<DeployResult<FirebaseRelease>> {
    if let Some(error) = operation.error {
        return Err(StoreError::OperationFailed {
            operation: operation.name,
            message: error.message,
        });
    }

    let raw = operation.response.ok_or_else(|| {
        StoreError::UnexpectedResponse(format!(
            "operation {} finished without a response",
            operation.name
        ))
    })?;
    let upload: UploadReleaseResponse = serde_json::from_value(raw.clone())?;
    let release = upload.release;

    Ok(DeployResult::new(
        raw,
        FirebaseRelease {
            result: upload.result,
            name: release.name,
            display_version: release.display_version,
            build_version: release.build_version,
            release_notes: release.release_notes.and_then(|n| n.text),
            create_time: release.create_time,
            firebase_console_uri: release.firebase_console_uri,
            testing_uri: release.testing_uri,
            binary_download_uri: release.binary_download_uri,
        },
    ))
}

#[async_trait::async_trait]
impl Provider for Firebase {
    type Request = FirebaseRequest;
    type Output = FirebaseRelease;

    fn service(&self) -> ServiceKind {
        ServiceKind::Firebase
    }

    fn request(&self, path: &Path) -> FirebaseRequest {
        FirebaseRequest {
            file_path: path.to_path_buf(),
            ..Default::default()
        }
    }

    #[instrument(skip_all, fields(service = "firebase", app = %self.config.app_id))]
    async fn submit(&self, request: FirebaseRequest) -> Result<DeployResult<FirebaseRelease>> {
        info!(
            "Uploading {} to Firebase App Distribution",
            request.file_path.display()
        );

        let http = self.http()?;
        let response = self.freeze(&request.file_path).send(&http).await?;
        if !response.is_success() {
            return Err(google_error(&response));
        }
        let operation: Operation = response.json()?;
        debug!(operation = %operation.name, done = operation.done, "upload accepted");

        let operation = self.wait_for_release(&http, operation).await?;
        let mut result = release_from_operation(operation)?;
        let release = result.typed().name.clone();
        info!(release = %release, result = %result.typed().result, "release processed");

        if let Some(notes) = request.release_notes.as_deref() {
            match self.update_release_notes(&http, &release, notes).await {
                Ok(()) => {
                    result = DeployResult::new(
                        result.raw_json().clone(),
                        FirebaseRelease {
                            release_notes: Some(notes.to_string()),
                            ..result.into_typed()
                        },
                    );
                }
                Err(e) => warn!(release = %release, error = %e, "failed to set release notes"),
            }
        }

        if !request.tester_emails.is_empty() || !request.group_aliases.is_empty() {
            if let Err(e) = self
                .distribute(&http, &release, &request.tester_emails, &request.group_aliases)
                .await
            {
                warn!(release = %release, error = %e, "failed to distribute release");
            } else {
                info!(
                    testers = request.tester_emails.len(),
                    groups = request.group_aliases.len(),
                    "release distributed"
                );
            }
        }

        Ok(result)
    }
}
