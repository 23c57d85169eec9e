//! Delivery backends for Dropship
//!
//! This crate knows how to put a built app artifact somewhere testers can
//! reach it.
//!
//! ## Supported Backends
//!
//! - **DeployGate**: multipart upload to the binary hosting API
//! - **Firebase App Distribution**: raw upload, then operation polling
//! - **TestFlight**: upload through `xcrun altool`
//! - **Custom**: multipart upload to any HTTP endpoint
//! - **Local**: copy or move on the local file system
//!
//! ## Usage
//!
//! ```ignore
//! use dropship_stores::{deploygate::DeployGate, Provider};
//!
//! let provider = DeployGate::new(config, reqwest::Client::new());
//! let result = provider
//!     .deploy(&artifact_path, |req| req.message = Some("nightly".into()))
//!     .await?;
//! println!("{}", result.raw_json());
//! ```

pub mod error;
pub mod form;
pub mod http;
pub mod poller;
pub mod traits;
pub mod types;

pub mod custom;
pub mod deploygate;
pub mod firebase;
pub mod local;
pub mod testflight;

pub use error::{Result, StoreError};
pub use form::{FieldValue, Form, FormField};
pub use http::{HttpClient, HttpResponse};
pub use poller::{OperationPoller, OperationStatus, PollerOptions};
pub use traits::Provider;
pub use types::*;

pub use custom::{Custom, CustomAuth, CustomConfig, CustomRequest};
pub use deploygate::{DeployGate, DeployGateConfig, DeployGateRequest, DeployGateUpload};
pub use firebase::{
    Firebase, FirebaseConfig, FirebaseRelease, FirebaseRequest, UploadReleaseResult,
};
pub use local::{Local, LocalConfig, LocalDistribution, LocalRequest, LocalSideEffect};
pub use testflight::{TestFlight, TestFlightConfig, TestFlightRequest, TestFlightUpload};
