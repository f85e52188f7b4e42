//! The generated launch document.
//!
//! A successful generation leaves one `launch.toml` per environment under
//! the project's dist directory (`<build_dir>/dist/<environment_id>/`). The
//! document describes how to run the environment: main class, program and VM
//! arguments, and a classpath specification that is either the literal `*`
//! (all archive files directly under the dist directory) or a
//! colon-delimited list of entries.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the build output that holds generated environments.
const DIST_DIR: &str = "dist";

/// File name of the generated launch document inside an environment's
/// dist directory.
pub const LAUNCH_CONFIG_FILE: &str = "launch.toml";

/// Dist directory for one environment under a build output directory.
pub fn dist_directory(build_directory: &Path, environment_id: &str) -> PathBuf {
    build_directory.join(DIST_DIR).join(environment_id)
}

/// Full path of an environment's generated launch document.
pub fn launch_config_path(build_directory: &Path, environment_id: &str) -> PathBuf {
    dist_directory(build_directory, environment_id).join(LAUNCH_CONFIG_FILE)
}

/// Parsed launch document of one generated environment.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GeneratedConfig {
    pub main_class: String,
    #[serde(default)]
    pub program_arguments: Vec<String>,
    #[serde(default)]
    pub vm_arguments: Vec<String>,
    #[serde(default)]
    pub classpath: Option<String>,
}

impl GeneratedConfig {
    pub fn classpath_spec(&self) -> ClasspathSpec {
        match self.classpath.as_deref() {
            None | Some("") => ClasspathSpec::Explicit(Vec::new()),
            Some("*") => ClasspathSpec::Wildcard,
            Some(list) => {
                ClasspathSpec::Explicit(list.split(':').map(str::to_owned).collect())
            }
        }
    }
}

/// Classpath specification: either "all archive files directly under the
/// dist directory" or an explicit entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClasspathSpec {
    Wildcard,
    Explicit(Vec<String>),
}

pub fn parse_launch_str(input: &str) -> Result<GeneratedConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_launch_file(path: impl AsRef<Path>) -> Result<GeneratedConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_launch_str(&content)
}
