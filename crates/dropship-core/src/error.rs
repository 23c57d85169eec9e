//! Error types for Dropship

use std::path::PathBuf;

use dropship_stores::StoreError;
use thiserror::Error;

/// Result type alias using DropshipError
pub type Result<T> = std::result::Result<T, DropshipError>;

/// Main error type for Dropship operations
#[derive(Debug, Error)]
pub enum DropshipError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Pre/post step errors
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Delivery backend errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The deploy action inside a lifecycle failed
    #[error("{context} failed: {source}")]
    Action {
        context: String,
        #[source]
        source: Box<DropshipError>,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// No distribution with this name
    #[error("Unknown distribution '{0}'")]
    UnknownDistribution(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Which half of the lifecycle a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Pre,
    Post,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pre => write!(f, "pre-step"),
            Self::Post => write!(f, "post-step"),
        }
    }
}

/// Pre/post step errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Step could not be started
    #[error("{phase} #{index} ({command}) could not be started: {source}")]
    SpawnFailed {
        phase: StepPhase,
        index: usize,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Step exited unsuccessfully
    #[error("{phase} #{index} ({command}) failed with exit code {exit_code:?}")]
    StepFailed {
        phase: StepPhase,
        index: usize,
        command: String,
        exit_code: Option<i32>,
    },

    /// The deploy succeeded but a post-step failed
    ///
    /// The artifact has already been delivered; nothing is rolled back.
    #[error("Distribution succeeded but {0}")]
    PostStepAfterDelivery(Box<LifecycleError>),
}

impl LifecycleError {
    /// Index of the failing step, if any
    pub fn step_index(&self) -> usize {
        match self {
            Self::SpawnFailed { index, .. } | Self::StepFailed { index, .. } => *index,
            Self::PostStepAfterDelivery(inner) => inner.step_index(),
        }
    }
}

impl DropshipError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
