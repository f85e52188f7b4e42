//! Per-project environment model.
//!
//! `ProjectState` is the mutable heart of one tracked project: its build
//! output directory, artifact set, enabled flag, compatibility gate, and
//! the id→environment mapping. All mutation happens under the engine's
//! per-project lock; `reconcile_environments` implements the diff/merge of
//! incoming configuration against runtime state.

use crate::artifacts::ArtifactSet;
use crate::gate::CompatibilityGate;
use crate::launcher::LaunchDescriptor;
use crate::supervisor::{ProcessState, ProcessSupervisor};
use berth_schema::{BundleSettings, EnvironmentConfig, EnvironmentId, ParsedConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Where an environment stands in its generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GenerationStatus {
    NotGenerated,
    Generating,
    Generated,
    Failed,
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotGenerated => "not generated",
            Self::Generating => "generating",
            Self::Generated => "generated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One configured environment and its runtime state.
///
/// Identity is the id; configuration refreshes update the mutable fields in
/// place so that generation status and any live process survive a refresh.
pub struct Environment {
    pub id: EnvironmentId,
    pub framework: String,
    pub vm_options: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
    pub bundle_settings: BundleSettings,
    pub status: GenerationStatus,
    pub generated_at: Option<DateTime<Utc>>,
    pub launch: Option<LaunchDescriptor>,
    pub supervisor: Option<ProcessSupervisor>,
}

impl Environment {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            id: config.id,
            framework: config.framework,
            vm_options: config.vm_options,
            system_properties: config.system_properties,
            bundle_settings: config.bundle_settings,
            status: GenerationStatus::NotGenerated,
            generated_at: None,
            launch: None,
            supervisor: None,
        }
    }

    /// Update the configurable fields in place, preserving identity,
    /// generation status, and any live process.
    pub fn apply_config(&mut self, config: EnvironmentConfig) {
        self.framework = config.framework;
        self.vm_options = config.vm_options;
        self.system_properties = config.system_properties;
        self.bundle_settings = config.bundle_settings;
    }

    pub fn process_state(&self) -> Option<ProcessState> {
        self.supervisor.as_ref().map(ProcessSupervisor::state)
    }

    /// Stop and discard the environment's process and launch state.
    /// Idempotent if none exists.
    pub fn discard_process(&mut self, force: bool) {
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.stop(force) {
                warn!("failed to stop process for '{}': {e}", self.id);
            }
        }
        self.launch = None;
    }
}

/// Immutable view of one environment, taken under the project lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSnapshot {
    pub id: EnvironmentId,
    pub framework: String,
    pub vm_options: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
    pub bundle_settings: BundleSettings,
    pub status: GenerationStatus,
    pub generated_at: Option<DateTime<Utc>>,
    pub launch: Option<LaunchDescriptor>,
    pub process: Option<ProcessState>,
}

/// A pending model update, delivered to `Engine::refresh` whenever the
/// host's build descriptor changes.
#[derive(Debug, Clone, Default)]
pub struct ProjectChange {
    pub build_directory: Option<PathBuf>,
    pub configuration: Option<ParsedConfig>,
    pub declared_plugin_version: Option<String>,
}

impl ProjectChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.build_directory = Some(directory.into());
        self
    }

    pub fn configuration(mut self, configuration: ParsedConfig) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn declared_plugin_version(mut self, version: impl Into<String>) -> Self {
        self.declared_plugin_version = Some(version.into());
        self
    }
}

/// Mutable state of one tracked project. Guarded by the engine's
/// per-project lock.
pub struct ProjectState {
    pub name: String,
    pub build_directory: Option<PathBuf>,
    pub environments: HashMap<EnvironmentId, Environment>,
    pub artifacts: ArtifactSet,
    pub enabled: bool,
    pub gate: CompatibilityGate,
}

impl ProjectState {
    pub fn new(name: impl Into<String>, minimum_plugin_major: u32) -> Self {
        Self {
            name: name.into(),
            build_directory: None,
            environments: HashMap::new(),
            artifacts: ArtifactSet::default(),
            enabled: true,
            gate: CompatibilityGate::new(minimum_plugin_major),
        }
    }

    /// Reconcile the parsed environment list with the current mapping.
    ///
    /// Existing environments are updated in place; unknown ids are created
    /// as `NotGenerated`; stale ids have their processes stopped and are
    /// removed before the new mapping is installed. Returns whether the
    /// mapping changed in an observer-visible way.
    pub fn reconcile_environments(&mut self, parsed: ParsedConfig) -> bool {
        let mut changed = false;
        let mut previous = std::mem::take(&mut self.environments);
        let mut next: HashMap<EnvironmentId, Environment> =
            HashMap::with_capacity(parsed.environments.len());

        for config in parsed.environments {
            let id = config.id.clone();
            let environment = match previous.remove(&id) {
                Some(mut existing) => {
                    existing.apply_config(config);
                    existing
                }
                None => {
                    changed = true;
                    Environment::new(config)
                }
            };
            if let Some(mut shadowed) = next.insert(id.clone(), environment) {
                warn!("duplicate environment id '{id}' in configuration; keeping the last entry");
                shadowed.discard_process(true);
            }
        }

        // Remove-before-replace: stale processes are stopped while the old
        // entries are still ours, then the mapping is swapped wholesale.
        if !previous.is_empty() {
            changed = true;
        }
        for (id, mut stale) in previous {
            debug!("removing stale environment '{id}'");
            stale.discard_process(true);
        }

        self.environments = next;
        changed
    }

    /// Sorted immutable snapshots for notification payloads and hosts.
    pub fn snapshots(&self) -> Vec<EnvironmentSnapshot> {
        let mut snapshots: Vec<EnvironmentSnapshot> = self
            .environments
            .values()
            .map(|environment| EnvironmentSnapshot {
                id: environment.id.clone(),
                framework: environment.framework.clone(),
                vm_options: environment.vm_options.clone(),
                system_properties: environment.system_properties.clone(),
                bundle_settings: environment.bundle_settings.clone(),
                status: environment.status,
                generated_at: environment.generated_at,
                launch: environment.launch.clone(),
                process: environment.process_state(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }
}
