use crate::types::EnvironmentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("environment id must not be empty")]
    EmptyEnvironmentId,
}

/// The environment list delivered by the host whenever its build descriptor
/// changes. An empty document parses to an empty list.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ParsedConfig {
    #[serde(default, rename = "environment")]
    pub environments: Vec<EnvironmentConfig>,
}

/// One configured environment: a named, independently configurable runnable
/// profile within a project.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub id: EnvironmentId,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub vm_options: Vec<String>,
    #[serde(default)]
    pub system_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub bundle_settings: BundleSettings,
}

/// Ordered sequence of bundle property maps. Each entry is a free-form
/// key/value table describing one bundle.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BundleSettings {
    pub bundles: Vec<BTreeMap<String, String>>,
}

pub fn parse_config_str(input: &str) -> Result<ParsedConfig, ConfigError> {
    let config: ParsedConfig = toml::from_str(input)?;
    if config.environments.iter().any(|e| e.id.is_empty()) {
        return Err(ConfigError::EmptyEnvironmentId);
    }
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ParsedConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let input = r#"
[[environment]]
id = "equinox-test"
framework = "equinox"
vm_options = ["-Xmx256m", "-Dosgi.console=6666"]

[environment.system_properties]
"org.osgi.service.http.port" = "8080"

[[environment.bundle_settings]]
symbolic_name = "org.example.logging"
start_level = "2"

[[environment.bundle_settings]]
symbolic_name = "org.example.web"

[[environment]]
id = "felix-test"
framework = "felix"
"#;
        let config = parse_config_str(input).expect("should parse");
        assert_eq!(config.environments.len(), 2);

        let first = &config.environments[0];
        assert_eq!(first.id, "equinox-test");
        assert_eq!(first.framework, "equinox");
        assert_eq!(first.vm_options.len(), 2);
        assert_eq!(
            first.system_properties.get("org.osgi.service.http.port"),
            Some(&"8080".to_owned())
        );
        assert_eq!(first.bundle_settings.bundles.len(), 2);
        assert_eq!(
            first.bundle_settings.bundles[0].get("start_level"),
            Some(&"2".to_owned())
        );

        let second = &config.environments[1];
        assert_eq!(second.id, "felix-test");
        assert!(second.vm_options.is_empty());
        assert!(second.bundle_settings.bundles.is_empty());
    }

    #[test]
    fn empty_document_yields_empty_list() {
        let config = parse_config_str("").expect("should parse");
        assert!(config.environments.is_empty());
    }

    #[test]
    fn empty_id_is_rejected() {
        let input = r#"
[[environment]]
id = ""
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::EmptyEnvironmentId)
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let input = r#"
[[environment]]
id = "a"
no_such_field = true
"#;
        assert!(matches!(
            parse_config_str(input),
            Err(ConfigError::ParseToml(_))
        ));
    }

    #[test]
    fn parse_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environments.toml");
        std::fs::write(
            &path,
            r#"
[[environment]]
id = "default"
framework = "equinox"
"#,
        )
        .unwrap();

        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.environments.len(), 1);
        assert_eq!(config.environments[0].id, "default");
    }

    #[test]
    fn missing_file_reports_io_error() {
        assert!(matches!(
            parse_config_file("/nonexistent/environments.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
