//! Common types shared by the delivery backends

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::form::Form;
use crate::http::{HttpClient, HttpResponse};

/// Delivery backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// DeployGate binary hosting
    #[serde(rename = "deploygate")]
    DeployGate,
    /// Firebase App Distribution
    Firebase,
    /// App Store Connect / TestFlight
    #[serde(rename = "testflight")]
    TestFlight,
    /// Generic HTTP endpoint
    Custom,
    /// Local file system
    Local,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeployGate => "deploygate",
            Self::Firebase => "firebase",
            Self::TestFlight => "testflight",
            Self::Custom => "custom",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeployGate => write!(f, "DeployGate"),
            Self::Firebase => write!(f, "Firebase App Distribution"),
            Self::TestFlight => write!(f, "TestFlight"),
            Self::Custom => write!(f, "Custom"),
            Self::Local => write!(f, "Local"),
        }
    }
}

/// Where an access token travels on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthPlacement {
    /// `Authorization: Bearer <token>`
    #[default]
    Header,
    /// A multipart form field
    Form,
    /// A query parameter
    Query,
}

/// Outcome of a deploy: the backend's JSON plus a typed view of it
#[derive(Debug, Clone, Serialize)]
pub struct DeployResult<T> {
    raw: serde_json::Value,
    value: T,
}

impl<T> DeployResult<T> {
    pub fn new(raw: serde_json::Value, value: T) -> Self {
        Self { raw, value }
    }

    /// The response exactly as the backend sent it
    pub fn raw_json(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn typed(&self) -> &T {
        &self.value
    }

    pub fn into_typed(self) -> T {
        self.value
    }
}

impl<T: Serialize> DeployResult<T> {
    /// Build a result whose raw view is the typed value itself
    pub fn from_typed(value: T) -> Result<Self> {
        Ok(Self {
            raw: serde_json::to_value(&value)?,
            value,
        })
    }
}

/// Body of a frozen upload
#[derive(Debug, Clone)]
pub enum UploadBody {
    Multipart(Form),
    /// Raw file bytes
    File(PathBuf),
}

/// A request frozen right before transmission
///
/// Providers assemble one from their mutable deploy request; once built it
/// exposes no setters.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    segments: Vec<String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: UploadBody,
}

impl UploadRequest {
    pub fn builder(body: UploadBody) -> UploadRequestBuilder {
        UploadRequestBuilder {
            request: UploadRequest {
                segments: Vec::new(),
                query: Vec::new(),
                headers: Vec::new(),
                body,
            },
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &UploadBody {
        &self.body
    }

    /// Send through `client`, overlaying this request's headers
    pub async fn send(&self, client: &HttpClient) -> Result<HttpResponse> {
        let client = if self.headers.is_empty() {
            client.clone()
        } else {
            client.with_headers(self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))?
        };
        let segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        let query: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        match &self.body {
            UploadBody::Multipart(form) => {
                client
                    .do_post_multipart_form(&segments, &query, form)
                    .await
            }
            UploadBody::File(path) => client.do_post_file_body(&segments, &query, path).await,
        }
    }
}

/// Assembles an [`UploadRequest`]
#[derive(Debug)]
pub struct UploadRequestBuilder {
    request: UploadRequest,
}

impl UploadRequestBuilder {
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.request.segments.push(segment.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((key.into(), value.into()));
        self
    }

    /// Attach `token` according to `placement`
    ///
    /// `key` names the form field or query parameter; header placement
    /// always uses a bearer `Authorization` header.
    pub fn auth(self, token: &str, placement: AuthPlacement, key: &str) -> Self {
        match placement {
            AuthPlacement::Header => self.header("Authorization", format!("Bearer {}", token)),
            AuthPlacement::Query => self.query(key, token),
            AuthPlacement::Form => {
                let mut this = self;
                if let UploadBody::Multipart(form) = &mut this.request.body {
                    form.set_text(key, token);
                }
                this
            }
        }
    }

    pub fn build(self) -> UploadRequest {
        self.request
    }
}

/// File name component of a path, for headers and log lines
pub fn file_name(path: &Path) -> String {
    crate::form::base_name(path)
}

/// Accept either a JSON string or number and keep it as a string
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Text(s) => s,
        Loose::Int(n) => n.to_string(),
        Loose::Float(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldValue;

    #[test]
    fn test_service_kind_display() {
        assert_eq!(ServiceKind::DeployGate.to_string(), "DeployGate");
        assert_eq!(ServiceKind::Firebase.as_str(), "firebase");
    }

    #[test]
    fn test_service_kind_serde_names() {
        let kind: ServiceKind = serde_json::from_str("\"testflight\"").unwrap();
        assert_eq!(kind, ServiceKind::TestFlight);
        assert_eq!(
            serde_json::to_string(&ServiceKind::DeployGate).unwrap(),
            "\"deploygate\""
        );
    }

    #[test]
    fn test_auth_placement() {
        let mut form = Form::new();
        form.add_file("file", "app.apk");

        let header = UploadRequest::builder(UploadBody::Multipart(form.clone()))
            .auth("t0k", AuthPlacement::Header, "token")
            .build();
        assert_eq!(
            header.headers(),
            &[("Authorization".to_string(), "Bearer t0k".to_string())]
        );

        let query = UploadRequest::builder(UploadBody::Multipart(form.clone()))
            .auth("t0k", AuthPlacement::Query, "token")
            .build();
        assert_eq!(query.query(), &[("token".to_string(), "t0k".to_string())]);
        assert!(query.headers().is_empty());

        let in_form = UploadRequest::builder(UploadBody::Multipart(form))
            .auth("t0k", AuthPlacement::Form, "api_token")
            .build();
        match in_form.body() {
            UploadBody::Multipart(form) => {
                assert_eq!(form.get("api_token"), Some(&FieldValue::Text("t0k".into())));
            }
            UploadBody::File(_) => panic!("expected multipart body"),
        }
    }

    #[test]
    fn test_string_or_number() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "string_or_number")]
            v: String,
        }
        let a: Probe = serde_json::from_str(r#"{"v": 42}"#).unwrap();
        let b: Probe = serde_json::from_str(r#"{"v": "42"}"#).unwrap();
        assert_eq!(a.v, "42");
        assert_eq!(b.v, "42");
    }
}
