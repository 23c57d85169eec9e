//! Lifecycle - run external commands around a deploy
//!
//! A distribution may declare pre-steps and post-steps. Each step is an
//! argv list (`[command, arg, ...]`) executed directly, without a shell.
//! Steps run strictly in order and the first failure stops everything:
//! - a failing pre-step means the deploy never runs
//! - a failing deploy means no post-step runs
//! - a failing post-step is reported even though the deploy went through
//!
//! Nothing is rolled back.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use dropship_stores::ServiceKind;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{DropshipError, LifecycleError, Result, StepPhase};

/// Pre/post steps for one distribution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LifecycleConfig {
    /// Commands run before the deploy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_steps: Vec<Vec<String>>,

    /// Commands run after a successful deploy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_steps: Vec<Vec<String>>,
}

impl LifecycleConfig {
    pub fn is_empty(&self) -> bool {
        self.pre_steps.is_empty() && self.post_steps.is_empty()
    }
}

/// Variables exported to every step
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    /// Distribution name from the config file
    pub distribution: Option<String>,
    /// Backend being deployed to
    pub service: Option<ServiceKind>,
    /// Artifact being deployed
    pub source_path: Option<PathBuf>,
    /// Additional custom variables
    pub custom: HashMap<String, String>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distribution(mut self, name: impl Into<String>) -> Self {
        self.distribution = Some(name.into());
        self
    }

    pub fn with_service(mut self, service: ServiceKind) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Convert context to environment variables
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        if let Some(ref v) = self.distribution {
            env.insert("DROPSHIP_DISTRIBUTION".to_string(), v.clone());
        }
        if let Some(v) = self.service {
            env.insert("DROPSHIP_SERVICE".to_string(), v.as_str().to_string());
        }
        if let Some(ref v) = self.source_path {
            env.insert(
                "DROPSHIP_SOURCE_PATH".to_string(),
                v.to_string_lossy().to_string(),
            );
        }

        for (k, v) in &self.custom {
            env.insert(format!("DROPSHIP_{}", k.to_uppercase()), v.clone());
        }

        env
    }

    fn label(&self) -> String {
        match &self.distribution {
            Some(name) => format!("Distribution '{}'", name),
            None => "Deploy".to_string(),
        }
    }
}

/// Result of executing a step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub phase: StepPhase,
    /// 1-based position within its phase
    pub index: usize,
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Runs a deploy action bracketed by a [`LifecycleConfig`]
#[derive(Debug, Clone)]
pub struct LifecycleExecutor<'a> {
    config: &'a LifecycleConfig,
    context: StepContext,
    base_dir: Option<PathBuf>,
}

impl<'a> LifecycleExecutor<'a> {
    pub fn new(config: &'a LifecycleConfig) -> Self {
        Self {
            config,
            context: StepContext::default(),
            base_dir: None,
        }
    }

    pub fn with_context(mut self, context: StepContext) -> Self {
        self.context = context;
        self
    }

    /// Working directory for steps
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Run pre-steps, `action`, then post-steps
    ///
    /// With an empty config this is exactly `action().await`, apart from
    /// wrapping a failure with the distribution name.
    pub async fn execute<T, E, F, Fut>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<DropshipError>,
    {
        self.run_phase(StepPhase::Pre, &self.config.pre_steps)
            .await?;

        let value = action().await.map_err(|e| DropshipError::Action {
            context: self.context.label(),
            source: Box::new(e.into()),
        })?;

        self.run_phase(StepPhase::Post, &self.config.post_steps)
            .await
            .map_err(|e| LifecycleError::PostStepAfterDelivery(Box::new(e)))?;

        Ok(value)
    }

    /// Run every step of a phase, stopping at the first failure
    async fn run_phase(
        &self,
        phase: StepPhase,
        steps: &[Vec<String>],
    ) -> std::result::Result<Vec<StepResult>, LifecycleError> {
        if steps.is_empty() {
            return Ok(Vec::new());
        }

        let env = self.context.to_env();
        let mut results = Vec::with_capacity(steps.len());
        for (i, argv) in steps.iter().enumerate() {
            let result = self.run_step(phase, i + 1, argv, &env).await?;
            if result.exit_code != Some(0) {
                return Err(LifecycleError::StepFailed {
                    phase,
                    index: result.index,
                    command: result.command,
                    exit_code: result.exit_code,
                });
            }
            results.push(result);
        }

        info!(%phase, count = results.len(), "lifecycle steps completed");
        Ok(results)
    }

    /// Execute a single step, forwarding its output to the log
    async fn run_step(
        &self,
        phase: StepPhase,
        index: usize,
        argv: &[String],
        env: &HashMap<String, String>,
    ) -> std::result::Result<StepResult, LifecycleError> {
        let start = std::time::Instant::now();
        let command = argv.join(" ");

        let Some((program, args)) = argv.split_first() else {
            return Err(LifecycleError::SpawnFailed {
                phase,
                index,
                command,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        info!(%phase, index, command = %command, "running step");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.base_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| LifecycleError::SpawnFailed {
            phase,
            index,
            command: command.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (_, _, status) = tokio::join!(
            forward(stdout, phase, index, false),
            forward(stderr, phase, index, true),
            child.wait(),
        );
        let status = status.map_err(|source| LifecycleError::SpawnFailed {
            phase,
            index,
            command: command.clone(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(%phase, index, exit_code = ?status.code(), duration_ms, "step finished");

        Ok(StepResult {
            phase,
            index,
            command,
            exit_code: status.code(),
            duration_ms,
        })
    }
}

/// Forward a child stream to tracing line by line
async fn forward<R>(stream: Option<R>, phase: StepPhase, index: usize, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return;
    };
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => warn!(%phase, index, "{}", line),
            Ok(Some(line)) => info!(%phase, index, "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(%phase, index, error = %e, "stopped reading step output");
                break;
            }
        }
    }
}

/// Build an executor for a distribution rooted at `base_dir`
pub fn build_executor<'a>(
    config: &'a LifecycleConfig,
    context: StepContext,
    base_dir: Option<&Path>,
) -> LifecycleExecutor<'a> {
    let executor = LifecycleExecutor::new(config).with_context(context);
    match base_dir {
        Some(dir) => executor.with_base_dir(dir),
        None => executor,
    }
}
