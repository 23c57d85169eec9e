//! Configuration validation
//!
//! Every backend lists its required fields explicitly; a missing one is
//! reported by its full path before any network call is made.

use dropship_stores::{
    CustomConfig, DeployGateConfig, FirebaseConfig, LocalConfig, TestFlightConfig,
};
use reqwest::Url;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::lifecycle::LifecycleConfig;

use super::types::{Config, ServiceConfig};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_http(config)?;
    for (name, distribution) in &config.distributions {
        let prefix = format!("distributions.{}", name);
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "distributions".to_string(),
                message: "distribution name cannot be empty".to_string(),
            }
            .into());
        }
        validate_service(&prefix, &distribution.service)?;
        validate_lifecycle(&prefix, &distribution.lifecycle)?;
    }
    debug!(
        distributions = config.distributions.len(),
        "configuration validation passed"
    );
    Ok(())
}

/// Validate one backend configuration
///
/// `prefix` is prepended to field names in errors, e.g.
/// `distributions.qa`.
pub fn validate_service(prefix: &str, service: &ServiceConfig) -> Result<()> {
    match service {
        ServiceConfig::DeployGate(c) => validate_deploygate(prefix, c),
        ServiceConfig::Firebase(c) => validate_firebase(prefix, c),
        ServiceConfig::TestFlight(c) => validate_testflight(prefix, c),
        ServiceConfig::Custom(c) => validate_custom(prefix, c),
        ServiceConfig::Local(c) => validate_local(prefix, c),
    }
}

fn field(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn require(prefix: &str, key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field(prefix, key)).into());
    }
    Ok(())
}

fn require_some(prefix: &str, key: &str, value: Option<&String>) -> Result<()> {
    require(prefix, key, value.map(String::as_str).unwrap_or_default())
}

fn validate_http(config: &Config) -> Result<()> {
    if config.http.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "http.timeout-secs".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_url(prefix: &str, key: &str, value: &str) -> Result<()> {
    Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        field: field(prefix, key),
        message: format!("not a valid URL: {}", e),
    })?;
    Ok(())
}

fn validate_deploygate(prefix: &str, config: &DeployGateConfig) -> Result<()> {
    require(prefix, "app-owner-name", &config.app_owner_name)?;
    require(prefix, "api-token", &config.api_token)?;
    if let Some(base) = &config.api_base {
        validate_url(prefix, "api-base", base)?;
    }
    Ok(())
}

fn validate_firebase(prefix: &str, config: &FirebaseConfig) -> Result<()> {
    require(prefix, "project-number", &config.project_number)?;
    require(prefix, "app-id", &config.app_id)?;
    require(prefix, "access-token", &config.access_token)?;
    if config.processing_timeout_secs == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: field(prefix, "processing-timeout-secs"),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }
    if let Some(base) = &config.api_base {
        validate_url(prefix, "api-base", base)?;
    }
    Ok(())
}

fn validate_testflight(prefix: &str, config: &TestFlightConfig) -> Result<()> {
    let has_key = config.api_key_id.is_some() || config.api_issuer_id.is_some();
    let has_login = config.username.is_some() || config.password.is_some();

    if has_key || !has_login {
        require_some(prefix, "api-key-id", config.api_key_id.as_ref())?;
        require_some(prefix, "api-issuer-id", config.api_issuer_id.as_ref())?;
    } else {
        require_some(prefix, "username", config.username.as_ref())?;
        require_some(prefix, "password", config.password.as_ref())?;
    }

    if let Some(platform) = &config.platform {
        let valid = ["ios", "macos", "appletvos", "visionos"];
        if !valid.contains(&platform.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: field(prefix, "platform"),
                message: format!("must be one of: {}", valid.join(", ")),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_custom(prefix: &str, config: &CustomConfig) -> Result<()> {
    require(prefix, "endpoint", &config.endpoint)?;
    validate_url(prefix, "endpoint", &config.endpoint)?;
    require(prefix, "file-field-name", &config.file_field_name)?;
    if let Some(auth) = &config.auth {
        let auth_prefix = field(prefix, "auth");
        require(&auth_prefix, "token", &auth.token)?;
        require(&auth_prefix, "key", &auth.key)?;
    }
    Ok(())
}

fn validate_local(prefix: &str, config: &LocalConfig) -> Result<()> {
    require(
        prefix,
        "destination-path",
        &config.destination_path.to_string_lossy(),
    )?;
    if let Some(mode) = config.file_mode {
        if mode > 0o7777 {
            return Err(ConfigError::InvalidValue {
                field: field(prefix, "file-mode"),
                message: format!("{:o} is not a valid permission mode", mode),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_lifecycle(prefix: &str, lifecycle: &LifecycleConfig) -> Result<()> {
    let phases = [
        ("pre-steps", &lifecycle.pre_steps),
        ("post-steps", &lifecycle.post_steps),
    ];
    for (phase, steps) in phases {
        for (i, step) in steps.iter().enumerate() {
            let command = step.first().map(String::as_str).unwrap_or_default();
            if command.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.lifecycle.{}[{}]", prefix, phase, i),
                    message: "step command cannot be empty".to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}
