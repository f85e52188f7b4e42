//! Configuration schema for Berth environments.
//!
//! This crate defines the descriptor layer: typed identifiers (`ProjectId`,
//! `EnvironmentId`), the environment configuration model delivered by the
//! host's build descriptor (`ParsedConfig`), the generated launch document
//! found under a project's dist directory (`GeneratedConfig`), and the
//! build-tool plugin version parsing used by the compatibility gate.

pub mod config;
pub mod launch;
pub mod types;
pub mod version;

pub use config::{
    parse_config_file, parse_config_str, BundleSettings, ConfigError, EnvironmentConfig,
    ParsedConfig,
};
pub use launch::{
    dist_directory, launch_config_path, parse_launch_file, parse_launch_str, ClasspathSpec,
    GeneratedConfig, LAUNCH_CONFIG_FILE,
};
pub use types::{EnvironmentId, ProjectId};
pub use version::parse_major_version;
