//! Generic HTTP endpoint
//!
//! Posts the artifact as a multipart form to any endpoint. Static headers,
//! query parameters and form fields come from configuration and can be
//! changed per deploy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{Result, StoreError};
use crate::form::Form;
use crate::http::{HttpClient, HttpResponse};
use crate::traits::Provider;
use crate::types::{AuthPlacement, DeployResult, ServiceKind, UploadBody, UploadRequest};

fn default_file_field() -> String {
    "file".to_string()
}

fn default_auth_key() -> String {
    "token".to_string()
}

/// Access token for a custom endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CustomAuth {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub placement: AuthPlacement,
    /// Form field or query parameter name for non-header placement
    #[serde(default = "default_auth_key")]
    pub key: String,
}

/// Custom endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CustomConfig {
    /// Base URL
    #[serde(default)]
    pub endpoint: String,

    /// Path below the endpoint
    #[serde(default)]
    pub path: String,

    /// Form field carrying the artifact
    #[serde(default = "default_file_field")]
    pub file_field_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<CustomAuth>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub form_params: BTreeMap<String, String>,
}

/// Mutable upload request, seeded from configuration
#[derive(Debug, Clone, Default)]
pub struct CustomRequest {
    pub file_path: PathBuf,
    pub file_field_name: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub form_params: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Custom endpoint provider
pub struct Custom {
    config: CustomConfig,
    client: Client,
}

impl Custom {
    pub fn new(config: CustomConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn freeze(&self, request: CustomRequest) -> UploadRequest {
        let mut form = Form::new();
        form.add_file(request.file_field_name, request.file_path);
        for (name, value) in request.form_params {
            form.add_text(name, value);
        }

        let mut builder = UploadRequest::builder(UploadBody::Multipart(form));
        if !self.config.path.is_empty() {
            builder = builder.segment(self.config.path.clone());
        }
        for (key, value) in request.query_params {
            builder = builder.query(key, value);
        }
        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }
        if let Some(auth) = &self.config.auth {
            builder = builder.auth(&auth.token, auth.placement, &auth.key);
        }
        builder.build()
    }
}

fn interpret(response: &HttpResponse) -> Result<DeployResult<Value>> {
    let parsed = response.json::<Value>().ok();

    if !response.is_success() {
        let message = parsed
            .and_then(|v| serde_json::from_value::<ErrorBody>(v).ok())
            .and_then(|b| {
                b.message.or_else(|| {
                    b.error.map(|e| match e {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                })
            })
            .unwrap_or_else(|| response.text());
        return Err(StoreError::ApiError {
            status: response.status.as_u16(),
            message,
        });
    }

    let value = parsed.unwrap_or_else(|| Value::String(response.text()));
    Ok(DeployResult::new(value.clone(), value))
}

#[async_trait::async_trait]
impl Provider for Custom {
    type Request = CustomRequest;
    type Output = Value;

    fn service(&self) -> ServiceKind {
        ServiceKind::Custom
    }

    fn request(&self, path: &Path) -> CustomRequest {
        CustomRequest {
            file_path: path.to_path_buf(),
            file_field_name: self.config.file_field_name.clone(),
            headers: self.config.headers.clone(),
            query_params: self.config.query_params.clone(),
            form_params: self.config.form_params.clone(),
        }
    }

    #[instrument(skip_all, fields(service = "custom", endpoint = %self.config.endpoint))]
    async fn submit(&self, request: CustomRequest) -> Result<DeployResult<Value>> {
        info!("Uploading {} to custom endpoint", request.file_path.display());

        let upload = self.freeze(request);
        let http = HttpClient::new(self.client.clone(), &self.config.endpoint)?;
        let response = upload.send(&http).await?;
        let result = interpret(&response)?;

        info!(status = response.status.as_u16(), "custom upload complete");
        Ok(result)
    }
}
