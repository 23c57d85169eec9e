//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(
        path = %path.display(),
        distributions = config.distributions.len(),
        "config loaded and validated"
    );
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// At each directory level the search checks:
///   1. `<dir>/<name>`          (e.g. `dropship.yaml`)
///   2. `<dir>/.github/<name>`  (e.g. `.github/dropship.yaml`)
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.is_file() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }

            let github_path = current.join(".github").join(name);
            if github_path.is_file() {
                info!(path = %github_path.display(), "found config file in .github/");
                return Some(github_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DropshipError;
    use tempfile::TempDir;

    const LOCAL_YAML: &str =
        "distributions:\n  disk:\n    service: local\n    destination-path: /tmp/out.apk\n";

    const LOCAL_TOML: &str =
        "[distributions.disk]\nservice = \"local\"\ndestination-path = \"/tmp/out.apk\"\n";

    #[test]
    fn test_find_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("dropship.yaml");
        std::fs::write(&config_path, LOCAL_YAML).unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_yaml_over_toml() {
        let temp = TempDir::new().unwrap();
        let yaml_path = temp.path().join("dropship.yaml");
        std::fs::write(&yaml_path, LOCAL_YAML).unwrap();
        std::fs::write(temp.path().join("dropship.toml"), LOCAL_TOML).unwrap();

        assert_eq!(find_config(temp.path()).unwrap(), yaml_path);
    }

    #[test]
    fn test_find_config_in_github_dir() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let config_path = github_dir.join("dropship.toml");
        std::fs::write(&config_path, LOCAL_TOML).unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".dropship.yaml");
        std::fs::write(&config_path, LOCAL_YAML).unwrap();
        let nested = temp.path().join("app").join("build");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_load_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("dropship.toml");
        std::fs::write(&config_path, LOCAL_TOML).unwrap();

        let config = load_config(&config_path).unwrap();
        assert!(config.distributions.contains_key("disk"));
    }

    #[test]
    fn test_load_config_runs_validation() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("dropship.yaml");
        std::fs::write(
            &config_path,
            "distributions:\n  qa:\n    service: deploygate\n    api-token: t\n",
        )
        .unwrap();

        let err = load_config(&config_path).unwrap_err();
        assert!(matches!(
            err,
            DropshipError::Config(ConfigError::MissingField(ref f)) if f == "distributions.qa.app-owner-name"
        ));
    }

    #[test]
    fn test_load_config_from_dir_not_found() {
        let temp = TempDir::new().unwrap();
        // The search walks up to the filesystem root; only assert when nothing above us has a config.
        if find_config(temp.path()).is_none() {
            let err = load_config_from_dir(temp.path()).unwrap_err();
            assert!(matches!(err, DropshipError::Config(ConfigError::NotFound(_))));
        }
    }
}
