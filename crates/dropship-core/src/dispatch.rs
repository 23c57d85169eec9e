//! Dispatcher - pick a backend from configuration and run it
//!
//! The service tag is matched once; every arm builds its provider, layers
//! the caller's [`Overrides`] on through the provider's mutator and wraps
//! the typed result in a [`DistributionResult`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dropship_stores::{
    Custom, CustomRequest, DeployGate, DeployGateRequest, DeployGateUpload, DeployResult,
    Firebase, FirebaseRelease, FirebaseRequest, Local, LocalDistribution, LocalRequest, Provider,
    ServiceKind, StoreError, TestFlight, TestFlightRequest, TestFlightUpload,
};
use reqwest::Client;
use tracing::{info, instrument};

use crate::config::{validate_service, Config, HttpConfig, ServiceConfig};
use crate::error::Result;
use crate::lifecycle::{build_executor, StepContext};

/// Per-call additions layered on top of the configured request
///
/// Fields a backend has no use for are ignored by that backend.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub message: Option<String>,
    pub release_note: Option<String>,
    pub distribution_key: Option<String>,
    pub distribution_name: Option<String>,
    pub disable_notify: Option<bool>,
    pub testers: Vec<String>,
    pub groups: Vec<String>,
    pub platform: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub form_params: BTreeMap<String, String>,
    pub destination_path: Option<PathBuf>,
}

impl Overrides {
    fn apply_deploygate(&self, request: &mut DeployGateRequest) {
        set_if(&mut request.message, &self.message);
        set_if(&mut request.release_note, &self.release_note);
        set_if(&mut request.distribution_key, &self.distribution_key);
        set_if(&mut request.distribution_name, &self.distribution_name);
        if self.disable_notify.is_some() {
            request.disable_notify = self.disable_notify;
        }
    }

    fn apply_firebase(&self, request: &mut FirebaseRequest) {
        set_if(&mut request.release_notes, &self.release_note);
        request.tester_emails.extend(self.testers.iter().cloned());
        request.group_aliases.extend(self.groups.iter().cloned());
    }

    fn apply_testflight(&self, request: &mut TestFlightRequest) {
        set_if(&mut request.platform, &self.platform);
    }

    fn apply_custom(&self, request: &mut CustomRequest) {
        request.headers.extend(self.headers.clone());
        request.query_params.extend(self.query_params.clone());
        request.form_params.extend(self.form_params.clone());
    }

    fn apply_local(&self, request: &mut LocalRequest) {
        if let Some(path) = &self.destination_path {
            request.destination_path = path.clone();
        }
    }
}

fn set_if<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

/// Outcome of a distribution, one arm per backend
#[derive(Debug, Clone)]
pub enum DistributionResult {
    DeployGate(DeployResult<DeployGateUpload>),
    Firebase(DeployResult<FirebaseRelease>),
    TestFlight(DeployResult<TestFlightUpload>),
    Custom(DeployResult<serde_json::Value>),
    Local(DeployResult<LocalDistribution>),
}

impl DistributionResult {
    pub fn service(&self) -> ServiceKind {
        match self {
            Self::DeployGate(_) => ServiceKind::DeployGate,
            Self::Firebase(_) => ServiceKind::Firebase,
            Self::TestFlight(_) => ServiceKind::TestFlight,
            Self::Custom(_) => ServiceKind::Custom,
            Self::Local(_) => ServiceKind::Local,
        }
    }

    /// The backend's response exactly as received
    pub fn raw_json(&self) -> &serde_json::Value {
        match self {
            Self::DeployGate(r) => r.raw_json(),
            Self::Firebase(r) => r.raw_json(),
            Self::TestFlight(r) => r.raw_json(),
            Self::Custom(r) => r.raw_json(),
            Self::Local(r) => r.raw_json(),
        }
    }
}

/// Build the shared HTTP client from configuration
pub fn build_http_client(config: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(StoreError::Http)?;
    Ok(client)
}

/// Runs distributions
pub struct Dispatcher {
    client: Client,
    config: Config,
    base_dir: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(client: Client, config: Config) -> Self {
        Self {
            client,
            config,
            base_dir: None,
        }
    }

    /// Working directory for lifecycle steps
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the named distribution, wrapped in its lifecycle
    #[instrument(skip(self, overrides), fields(source = %source_path.display()))]
    pub async fn distribute(
        &self,
        name: &str,
        source_path: &Path,
        overrides: &Overrides,
    ) -> Result<DistributionResult> {
        let distribution = self.config.distribution(name)?;
        validate_service(&format!("distributions.{}", name), &distribution.service)?;

        let kind = distribution.service.kind();
        info!(distribution = name, service = %kind, "starting distribution");

        let context = StepContext::new()
            .with_distribution(name)
            .with_service(kind)
            .with_source_path(source_path);
        let executor = build_executor(&distribution.lifecycle, context, self.base_dir.as_deref());

        executor
            .execute(|| self.dispatch(&distribution.service, source_path, overrides))
            .await
    }

    /// Deploy with an ad-hoc backend configuration and no lifecycle
    pub async fn deploy(
        &self,
        service: &ServiceConfig,
        source_path: &Path,
        overrides: &Overrides,
    ) -> Result<DistributionResult> {
        validate_service("", service)?;
        self.dispatch(service, source_path, overrides).await
    }

    async fn dispatch(
        &self,
        service: &ServiceConfig,
        source_path: &Path,
        overrides: &Overrides,
    ) -> Result<DistributionResult> {
        let result = match service {
            ServiceConfig::DeployGate(config) => {
                let provider = DeployGate::new(config.clone(), self.client.clone());
                DistributionResult::DeployGate(
                    provider
                        .deploy(source_path, |req| overrides.apply_deploygate(req))
                        .await?,
                )
            }
            ServiceConfig::Firebase(config) => {
                let provider = Firebase::new(config.clone(), self.client.clone());
                DistributionResult::Firebase(
                    provider
                        .deploy(source_path, |req| overrides.apply_firebase(req))
                        .await?,
                )
            }
            ServiceConfig::TestFlight(config) => {
                let provider = TestFlight::new(config.clone());
                DistributionResult::TestFlight(
                    provider
                        .deploy(source_path, |req| overrides.apply_testflight(req))
                        .await?,
                )
            }
            ServiceConfig::Custom(config) => {
                let provider = Custom::new(config.clone(), self.client.clone());
                DistributionResult::Custom(
                    provider
                        .deploy(source_path, |req| overrides.apply_custom(req))
                        .await?,
                )
            }
            ServiceConfig::Local(config) => {
                let provider = Local::new(config.clone());
                DistributionResult::Local(
                    provider
                        .deploy(source_path, |req| overrides.apply_local(req))
                        .await?,
                )
            }
        };

        info!(service = %result.service(), "distribution complete");
        Ok(result)
    }
}
