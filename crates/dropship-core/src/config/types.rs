//! Configuration types

use std::collections::BTreeMap;

use dropship_stores::{
    CustomConfig, DeployGateConfig, FirebaseConfig, LocalConfig, ServiceKind, TestFlightConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::lifecycle::LifecycleConfig;

/// Main configuration for Dropship
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Shared HTTP client settings
    pub http: HttpConfig,

    /// Named distribution targets
    pub distributions: BTreeMap<String, Distribution>,
}

impl Config {
    /// Look up a distribution by name
    pub fn distribution(&self, name: &str) -> Result<&Distribution> {
        self.distributions
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDistribution(name.to_string()).into())
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    concat!("dropship/", env!("CARGO_PKG_VERSION")).to_string()
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// One named distribution target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    /// Backend and its settings
    #[serde(flatten)]
    pub service: ServiceConfig,

    /// Steps run around the deploy
    #[serde(default, skip_serializing_if = "LifecycleConfig::is_empty")]
    pub lifecycle: LifecycleConfig,
}

/// Backend selection, tagged by `service`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "kebab-case")]
pub enum ServiceConfig {
    #[serde(rename = "deploygate")]
    DeployGate(DeployGateConfig),
    Firebase(FirebaseConfig),
    #[serde(rename = "testflight")]
    TestFlight(TestFlightConfig),
    Custom(CustomConfig),
    Local(LocalConfig),
}

impl ServiceConfig {
    pub fn kind(&self) -> ServiceKind {
        match self {
            Self::DeployGate(_) => ServiceKind::DeployGate,
            Self::Firebase(_) => ServiceKind::Firebase,
            Self::TestFlight(_) => ServiceKind::TestFlight,
            Self::Custom(_) => ServiceKind::Custom,
            Self::Local(_) => ServiceKind::Local,
        }
    }
}
