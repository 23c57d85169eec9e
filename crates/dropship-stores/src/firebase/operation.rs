//! Long-running operation payloads returned by the App Distribution API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::poller::OperationStatus;

/// `google.longrunning.Operation`, as far as we need it
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<GoogleStatus>,
}

impl OperationStatus for Operation {
    fn is_done(&self) -> bool {
        self.done
    }
}

/// `google.rpc.Status`
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Error envelope used by Google APIs for non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct GoogleErrorBody {
    pub error: GoogleStatus,
}

/// What the upload did to the app's releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadReleaseResult {
    UploadReleaseResultUnspecified,
    ReleaseCreated,
    ReleaseUpdated,
    ReleaseUnmodified,
}

impl std::fmt::Display for UploadReleaseResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UploadReleaseResultUnspecified => write!(f, "Unspecified"),
            Self::ReleaseCreated => write!(f, "Release created"),
            Self::ReleaseUpdated => write!(f, "Release updated"),
            Self::ReleaseUnmodified => write!(f, "Release unmodified"),
        }
    }
}

/// `UploadReleaseResponse`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadReleaseResponse {
    pub result: UploadReleaseResult,
    pub release: ReleaseResource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReleaseResource {
    pub name: String,
    #[serde(default)]
    pub display_version: String,
    #[serde(default)]
    pub build_version: String,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub release_notes: Option<ReleaseNotes>,
    #[serde(default)]
    pub firebase_console_uri: Option<String>,
    #[serde(default)]
    pub testing_uri: Option<String>,
    #[serde(default)]
    pub binary_download_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReleaseNotes {
    #[serde(default)]
    pub text: Option<String>,
}
