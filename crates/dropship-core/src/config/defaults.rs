//! Default configuration values

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "dropship.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "dropship.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".dropship.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".dropship.toml",
    ]
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Dropship Configuration
# Each entry under `distributions` is a named target for `dropship distribute --name`.

http:
  timeout-secs: 300

distributions:
  # Binary hosting on DeployGate
  qa:
    service: deploygate
    app-owner-name: your-team
    api-token: your-api-token
    lifecycle:
      pre-steps:
        - [./gradlew, assembleRelease]

  # Firebase App Distribution; access-token comes from
  # `gcloud auth print-access-token`
  beta:
    service: firebase
    project-number: "123456789012"
    app-id: "1:123456789012:android:0123456789abcdef"
    access-token: your-access-token
    processing-timeout-secs: 300

  # Copy the artifact to a shared drive
  archive:
    service: local
    destination-path: ./dist/app-latest.apk
    allow-overwrite: true
    delete-source: false
"#;

/// Default configuration template (TOML)
pub const DEFAULT_CONFIG_TEMPLATE_TOML: &str = r#"# Dropship Configuration
# Each table under `distributions` is a named target for `dropship distribute --name`.

[http]
timeout-secs = 300

# Binary hosting on DeployGate
[distributions.qa]
service = "deploygate"
app-owner-name = "your-team"
api-token = "your-api-token"

[distributions.qa.lifecycle]
pre-steps = [["./gradlew", "assembleRelease"]]

# Firebase App Distribution; access-token comes from
# `gcloud auth print-access-token`
[distributions.beta]
service = "firebase"
project-number = "123456789012"
app-id = "1:123456789012:android:0123456789abcdef"
access-token = "your-access-token"
processing-timeout-secs = 300

# Copy the artifact to a shared drive
[distributions.archive]
service = "local"
destination-path = "./dist/app-latest.apk"
allow-overwrite = true
delete-source = false
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{validate_config, Config};

    #[test]
    fn test_yaml_template_is_valid() {
        let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.distributions.len(), 3);
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_toml_template_is_valid() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE_TOML).unwrap();
        assert_eq!(config.distributions.len(), 3);
        validate_config(&config).unwrap();
    }
}
