//! Exit codes for the CLI

use dropship_core::{ConfigError, DropshipError};
use dropship_stores::StoreError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// A pre or post step failed
pub const LIFECYCLE_ERROR: i32 = 6;

/// Pick the exit code for a failed command
pub fn for_error(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DropshipError>())
        .map_or(ERROR, for_dropship_error)
}

fn for_dropship_error(err: &DropshipError) -> i32 {
    match err {
        DropshipError::Config(ConfigError::MissingField(_) | ConfigError::InvalidValue { .. }) => {
            VALIDATION_ERROR
        }
        DropshipError::Config(_) => CONFIG_ERROR,
        DropshipError::Store(StoreError::ConfigurationError(_)) => VALIDATION_ERROR,
        DropshipError::Lifecycle(_) => LIFECYCLE_ERROR,
        DropshipError::Action { source, .. } => for_dropship_error(source),
        _ => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropship_core::{LifecycleError, StepPhase};

    #[test]
    fn test_config_errors() {
        let err = anyhow::Error::from(DropshipError::from(ConfigError::UnknownDistribution(
            "qa".into(),
        )));
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let err = anyhow::Error::from(DropshipError::from(ConfigError::MissingField(
            "distributions.qa.api-token".into(),
        )));
        assert_eq!(for_error(&err), VALIDATION_ERROR);
    }

    #[test]
    fn test_lifecycle_error() {
        let err = anyhow::Error::from(DropshipError::from(LifecycleError::StepFailed {
            phase: StepPhase::Pre,
            index: 1,
            command: "false".into(),
            exit_code: Some(1),
        }));
        assert_eq!(for_error(&err), LIFECYCLE_ERROR);
    }

    #[test]
    fn test_wrapped_action_error() {
        let err = anyhow::Error::from(DropshipError::Action {
            context: "Deploy".into(),
            source: Box::new(DropshipError::Store(StoreError::ApiError {
                status: 401,
                message: "unauthorized".into(),
            })),
        })
        .context("distribute");
        assert_eq!(for_error(&err), ERROR);

        let err = anyhow::Error::from(DropshipError::Store(StoreError::ConfigurationError(
            "endpoint is not a URL".into(),
        )));
        assert_eq!(for_error(&err), VALIDATION_ERROR);
    }

    #[test]
    fn test_foreign_error() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(for_error(&err), ERROR);
    }
}
