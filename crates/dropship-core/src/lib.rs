//! Dropship Core - configuration, lifecycle and dispatch
//!
//! This crate loads and validates the distribution configuration, runs
//! pre/post steps around a deploy and routes each distribution to the
//! matching backend from `dropship-stores`.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;

pub use config::{Config, Distribution, HttpConfig, ServiceConfig};
pub use dispatch::{build_http_client, Dispatcher, DistributionResult, Overrides};
pub use error::{ConfigError, DropshipError, LifecycleError, Result, StepPhase};
pub use lifecycle::{LifecycleConfig, LifecycleExecutor, StepContext, StepResult};
