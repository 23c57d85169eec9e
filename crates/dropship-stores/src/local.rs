//! Local file system "distribution"
//!
//! Copies or moves the artifact to a destination path. Three switches
//! control the transfer: overwrite, delete-source and an explicit file mode.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StoreError};
use crate::traits::Provider;
use crate::types::{DeployResult, ServiceKind};

/// Local destination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocalConfig {
    /// Where the artifact ends up (a file path, not a directory)
    #[serde(default)]
    pub destination_path: PathBuf,

    /// Replace an existing destination file
    #[serde(default)]
    pub allow_overwrite: bool,

    /// Move instead of copy
    #[serde(default)]
    pub delete_source: bool,

    /// Permission bits for the destination as a quoted octal string, e.g. "0644"
    #[serde(
        default,
        deserialize_with = "octal_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_mode: Option<u32>,
}

/// Mutable transfer request, seeded from configuration
#[derive(Debug, Clone)]
pub struct LocalRequest {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub allow_overwrite: bool,
    pub delete_source: bool,
    pub file_mode: Option<u32>,
}

/// What the transfer did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalSideEffect {
    CopyOnly,
    MoveOnly,
    CopyAndOverwrite,
    MoveAndOverwrite,
}

impl LocalSideEffect {
    fn classify(moved: bool, overwrote: bool) -> Self {
        match (moved, overwrote) {
            (false, false) => Self::CopyOnly,
            (true, false) => Self::MoveOnly,
            (false, true) => Self::CopyAndOverwrite,
            (true, true) => Self::MoveAndOverwrite,
        }
    }
}

impl fmt::Display for LocalSideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyOnly => write!(f, "copied"),
            Self::MoveOnly => write!(f, "moved"),
            Self::CopyAndOverwrite => write!(f, "copied (overwrote existing file)"),
            Self::MoveAndOverwrite => write!(f, "moved (overwrote existing file)"),
        }
    }
}

/// Typed view of a local transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDistribution {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub side_effect: LocalSideEffect,
    /// Applied mode in octal notation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<String>,
}

/// Local file system provider
pub struct Local {
    config: LocalConfig,
}

impl Local {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }
}

/// Accept a mode as an octal string ("0644", "0o755")
///
/// Bare integers are refused: YAML reads `644` as decimal, which would
/// silently become 0o1204.
fn octal_mode<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mode {
        Text(String),
        Int(u32),
    }

    match Option::<Mode>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Mode::Int(n)) => Err(serde::de::Error::custom(format!(
            "file mode {} must be a quoted octal string such as \"0644\"",
            n
        ))),
        Some(Mode::Text(s)) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid octal file mode '{}'", s)))
        }
    }
}

/// Whether both paths name the same file once links and `..` are resolved
async fn is_same_file(source: &Path, destination: &Path) -> Result<bool> {
    let source = tokio::fs::canonicalize(source).await?;
    let destination = tokio::fs::canonicalize(destination).await?;
    Ok(source == destination)
}

async fn transfer(source: &Path, destination: &Path, delete_source: bool) -> Result<()> {
    if !delete_source {
        tokio::fs::copy(source, destination).await?;
        return Ok(());
    }

    if let Err(e) = tokio::fs::rename(source, destination).await {
        debug!(error = %e, "rename failed, falling back to copy and remove");
        tokio::fs::copy(source, destination).await?;
        tokio::fs::remove_file(source).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    warn!(
        path = %path.display(),
        mode = %format!("{:o}", mode),
        "file modes are not supported on this platform"
    );
    Ok(())
}

#[async_trait::async_trait]
impl Provider for Local {
    type Request = LocalRequest;
    type Output = LocalDistribution;

    fn service(&self) -> ServiceKind {
        ServiceKind::Local
    }

    fn request(&self, path: &Path) -> LocalRequest {
        LocalRequest {
            source_path: path.to_path_buf(),
            destination_path: self.config.destination_path.clone(),
            allow_overwrite: self.config.allow_overwrite,
            delete_source: self.config.delete_source,
            file_mode: self.config.file_mode,
        }
    }

    #[instrument(skip_all, fields(service = "local"))]
    async fn submit(&self, request: LocalRequest) -> Result<DeployResult<LocalDistribution>> {
        let source = &request.source_path;
        let destination = &request.destination_path;

        let source_meta = tokio::fs::metadata(source).await.map_err(|e| {
            StoreError::InvalidArtifact(format!("{}: {}", source.display(), e))
        })?;
        if !source_meta.is_file() {
            return Err(StoreError::InvalidArtifact(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        let overwrote = match tokio::fs::metadata(destination).await {
            Ok(meta) if meta.is_dir() => {
                return Err(StoreError::LocalDistribution(format!(
                    "destination {} is a directory",
                    destination.display()
                )));
            }
            Ok(_) if is_same_file(source, destination).await? => {
                return Err(StoreError::LocalDistribution(
                    "destination is the source file".to_string(),
                ));
            }
            Ok(_) if !request.allow_overwrite => {
                return Err(StoreError::LocalDistribution(format!(
                    "destination {} exists and overwriting is disabled",
                    destination.display()
                )));
            }
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        transfer(source, destination, request.delete_source).await?;
        if let Some(mode) = request.file_mode {
            apply_mode(destination, mode).await?;
        }

        let side_effect = LocalSideEffect::classify(request.delete_source, overwrote);
        if overwrote {
            warn!(destination = %destination.display(), "overwrote existing file");
        }
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "{}",
            side_effect
        );

        DeployResult::from_typed(LocalDistribution {
            source_path: request.source_path.clone(),
            destination_path: request.destination_path.clone(),
            side_effect,
            file_mode: request.file_mode.map(|m| format!("{:04o}", m)),
        })
    }
}
